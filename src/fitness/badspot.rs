//! Distribution-based detection of outlier spots.
//!
//! Advisory flags, surfaced for confirmation in the bad-spot report and
//! merged with the manual flags from the layout before normalization.

use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::fitness::FitnessRecord;
use crate::layout::{PlateId, Spot, SpotKey};
use crate::math::stats;

const IQR_FENCE: f64 = 2.5;
const MIN_REPLICATES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadSpotSource {
    Manual,
    Auto,
}

impl BadSpotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadSpotSource::Manual => "manual",
            BadSpotSource::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BadSpotFlag {
    pub key: SpotKey,
    pub strain: String,
    pub nauc: f64,
    pub source: BadSpotSource,
    pub reason: String,
}

/// Flags nAUC outliers per (plate_batch, plate, strain) replicate group.
///
/// Groups need at least 3 replicates. A spot outside
/// [max(0, Q1 - 2.5*IQR), Q3 + 2.5*IQR] is flagged, unless both the group
/// median and the spot itself sit below the growing threshold: low growth
/// across the board is expected there, not anomalous.
pub fn detect_outliers(
    records: &[FitnessRecord],
    spot_map: &BTreeMap<SpotKey, &Spot>,
    config: &AnalysisConfig,
) -> Vec<BadSpotFlag> {
    let mut groups: BTreeMap<(PlateId, String), Vec<&FitnessRecord>> = BTreeMap::new();
    for record in records {
        let Some(spot) = spot_map.get(&record.key()) else {
            continue;
        };
        groups
            .entry((record.plate.clone(), spot.strain.clone()))
            .or_default()
            .push(record);
    }

    let mut flags = Vec::new();
    for ((_, strain), members) in groups {
        if members.len() < MIN_REPLICATES {
            continue;
        }
        let mut naucs: Vec<f64> = members.iter().map(|m| m.nauc).collect();
        let (q1, q3) = stats::quartiles(&mut naucs);
        let iqr = q3 - q1;
        let lower = (q1 - IQR_FENCE * iqr).max(0.0);
        let upper = q3 + IQR_FENCE * iqr;
        let group_median = stats::median(&mut naucs);

        for member in members {
            let outside = member.nauc < lower || member.nauc > upper;
            if !outside {
                continue;
            }
            let low_growth_expected = group_median < config.min_nauc_growing
                && member.nauc < config.min_nauc_growing;
            if low_growth_expected {
                continue;
            }
            flags.push(BadSpotFlag {
                key: member.key(),
                strain: strain.clone(),
                nauc: member.nauc,
                source: BadSpotSource::Auto,
                reason: format!(
                    "nAUC {:.4} outside [{:.4}, {:.4}] for {} replicates",
                    member.nauc,
                    lower,
                    upper,
                    strain
                ),
            });
        }
    }
    flags
}

/// The manual flags carried by the layout, rendered as report entries.
pub fn manual_flags(
    spots: &[Spot],
    records: &[FitnessRecord],
) -> Vec<BadSpotFlag> {
    let nauc_by_key: BTreeMap<SpotKey, f64> =
        records.iter().map(|r| (r.key(), r.nauc)).collect();
    spots
        .iter()
        .filter(|s| s.bad_spot)
        .map(|s| BadSpotFlag {
            key: s.key(),
            strain: s.strain.clone(),
            nauc: nauc_by_key.get(&s.key()).copied().unwrap_or(f64::NAN),
            source: BadSpotSource::Manual,
            reason: "flagged in the plate layout".to_string(),
        })
        .collect()
}
