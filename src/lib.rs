pub mod calibrate;
pub mod cli;
pub mod config;
pub mod ctx;
pub mod fitness;
pub mod imaging;
pub mod io;
pub mod layout;
pub mod math;
pub mod pipeline;
pub mod services;
pub mod suscept;
