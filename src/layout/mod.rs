//! Experiment design: the normalized spot table and its identifiers.

use std::collections::BTreeMap;
use std::fmt;

pub mod parse;
pub mod sheet;

pub use parse::parse_layout;
pub use sheet::Sheet;

pub const PLATE_ROWS: u8 = 8;
pub const PLATE_COLUMNS: u8 = 12;

/// One physical plate: a quadrant of a photographed plate batch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlateId {
    pub batch: String,
    pub plate: u8,
}

impl fmt::Display for PlateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-plate{}", self.batch, self.plate)
    }
}

/// The unit across which a dose-response curve is built.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SampleId {
    pub strain: String,
    pub replicate: String,
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.strain, self.replicate)
    }
}

/// Well position `A1`..`H12`, the replicate identifier within a strain.
pub fn replicate_id(row: u8, column: u8) -> String {
    let letter = (b'A' + row - 1) as char;
    format!("{}{}", letter, column)
}

/// Join key for per-spot lookups across tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpotKey {
    pub plate: PlateId,
    pub row: u8,
    pub column: u8,
}

/// One well on a cropped quadrant plate.
#[derive(Debug, Clone)]
pub struct Spot {
    pub plate: PlateId,
    pub row: u8,
    pub column: u8,
    pub strain: String,
    pub drug: String,
    pub concentration: f64,
    pub bad_spot: bool,
}

impl Spot {
    pub fn key(&self) -> SpotKey {
        SpotKey {
            plate: self.plate.clone(),
            row: self.row,
            column: self.column,
        }
    }

    pub fn sample(&self) -> SampleId {
        SampleId {
            strain: self.strain.clone(),
            replicate: replicate_id(self.row, self.column),
        }
    }
}

/// Drug and concentration assigned to one plate.
#[derive(Debug, Clone)]
pub struct PlateAssignment {
    pub plate: PlateId,
    pub drug: String,
    pub concentration: f64,
}

/// The validated experiment design. The spot set is fixed once parsed; only
/// `bad_spot` flags are augmented later by the bad-spot detector.
#[derive(Debug, Clone)]
pub struct PlateLayout {
    pub experiment: String,
    pub assignments: Vec<PlateAssignment>,
    /// The single zero-concentration plate, shared by every drug. `None`
    /// disables susceptibility estimation.
    pub baseline: Option<PlateId>,
    pub spots: Vec<Spot>,
    pub warnings: Vec<String>,
}

impl PlateLayout {
    /// Plate batch names in layout order, deduplicated.
    pub fn batches(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for a in &self.assignments {
            if !seen.contains(&a.plate.batch) {
                seen.push(a.plate.batch.clone());
            }
        }
        seen
    }

    pub fn plates_of_batch(&self, batch: &str) -> Vec<u8> {
        self.assignments
            .iter()
            .filter(|a| a.plate.batch == batch)
            .map(|a| a.plate.plate)
            .collect()
    }

    pub fn spot_map(&self) -> BTreeMap<SpotKey, &Spot> {
        self.spots.iter().map(|s| (s.key(), s)).collect()
    }

    /// All distinct concentrations of one drug, baseline included, ascending.
    pub fn concentration_grid(&self, drug: &str) -> Vec<f64> {
        let mut concs: Vec<f64> = self
            .assignments
            .iter()
            .filter(|a| a.drug == drug)
            .map(|a| a.concentration)
            .collect();
        if self.baseline.is_some() && !concs.contains(&0.0) {
            concs.push(0.0);
        }
        concs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        concs.dedup();
        concs
    }

    /// Drugs tested at non-zero concentrations, in layout order.
    pub fn drugs(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for a in &self.assignments {
            if a.concentration > 0.0 && !seen.contains(&a.drug) {
                seen.push(a.drug.clone());
            }
        }
        seen
    }
}
