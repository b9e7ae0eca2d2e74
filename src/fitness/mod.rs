//! Per-spot growth kinetics returned by the curve fitter.

use crate::layout::{PlateId, SpotKey};

pub mod badspot;
pub mod integrate;

/// rsquare below this marks a fit too poor to trust its doubling time.
pub const RSQUARE_QUALITY_THRESHOLD: f64 = 0.9;
/// Fixed penalty doubling time substituted for poor fits.
pub const PENALTY_DT_H: f64 = 25.0;

/// One raw colony-intensity measurement at one timepoint.
#[derive(Debug, Clone)]
pub struct GrowthPoint {
    pub plate: PlateId,
    pub row: u8,
    pub column: u8,
    pub barcode: String,
    pub hours: f64,
    pub intensity: f64,
}

/// Kinetic parameters for one spot, post-processed.
#[derive(Debug, Clone)]
pub struct FitnessRecord {
    pub plate: PlateId,
    pub row: u8,
    pub column: u8,
    pub k: f64,
    pub r: f64,
    pub nauc: f64,
    pub dt_h: f64,
    pub mdp: f64,
    pub mdr: f64,
    pub mdrmdp: f64,
    pub auc: f64,
    pub rsquare: f64,
    pub inv_dt_h: f64,
}

impl FitnessRecord {
    pub fn key(&self) -> SpotKey {
        SpotKey {
            plate: self.plate.clone(),
            row: self.row,
            column: self.column,
        }
    }

    /// Derived-field rules applied once, when the integrated table is
    /// produced: rsquare clamped to >= 0, the doubling time replaced by a
    /// fixed penalty when the fit quality is below threshold, and the
    /// inverse doubling time derived afterwards.
    pub fn postprocess(&mut self) {
        if self.rsquare < 0.0 {
            self.rsquare = 0.0;
        }
        if self.rsquare < RSQUARE_QUALITY_THRESHOLD {
            self.dt_h = PENALTY_DT_H;
        }
        self.inv_dt_h = if self.dt_h > 0.0 { 1.0 / self.dt_h } else { 0.0 };
    }
}

/// The kinetic parameters usable as fitness estimates downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FitnessEstimate {
    K,
    R,
    NAuc,
    DtH,
    InvDtH,
    Mdp,
    Mdr,
    MdrMdp,
    Auc,
}

impl FitnessEstimate {
    pub const ALL: [FitnessEstimate; 9] = [
        FitnessEstimate::K,
        FitnessEstimate::R,
        FitnessEstimate::NAuc,
        FitnessEstimate::DtH,
        FitnessEstimate::InvDtH,
        FitnessEstimate::Mdp,
        FitnessEstimate::Mdr,
        FitnessEstimate::MdrMdp,
        FitnessEstimate::Auc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FitnessEstimate::K => "K",
            FitnessEstimate::R => "r",
            FitnessEstimate::NAuc => "nAUC",
            FitnessEstimate::DtH => "DT_h",
            FitnessEstimate::InvDtH => "inv_DT_h",
            FitnessEstimate::Mdp => "MDP",
            FitnessEstimate::Mdr => "MDR",
            FitnessEstimate::MdrMdp => "MDRMDP",
            FitnessEstimate::Auc => "AUC",
        }
    }

    pub fn value(&self, record: &FitnessRecord) -> f64 {
        match self {
            FitnessEstimate::K => record.k,
            FitnessEstimate::R => record.r,
            FitnessEstimate::NAuc => record.nauc,
            FitnessEstimate::DtH => record.dt_h,
            FitnessEstimate::InvDtH => record.inv_dt_h,
            FitnessEstimate::Mdp => record.mdp,
            FitnessEstimate::Mdr => record.mdr,
            FitnessEstimate::MdrMdp => record.mdrmdp,
            FitnessEstimate::Auc => record.auc,
        }
    }
}
