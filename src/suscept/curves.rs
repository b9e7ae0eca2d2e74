//! Dose-response endpoint primitives: MIC, rAUC and SMG.
//!
//! Numerical edge cases are encoded as NaN in the result, never as a crash;
//! internal-consistency violations (MIC of exactly 0, negative rAUC) are
//! defects in the algorithm and raise unconditionally.

use anyhow::{bail, Result};

use crate::math::stats;

pub const MIC_FRACTIONS: [f64; 4] = [0.25, 0.50, 0.75, 0.90];

/// Relative fitness above this at the last tested concentration marks a
/// censored, still-growing tail.
const CENSORED_TAIL_REL: f64 = 0.5;

/// One tested concentration of a sample's dose-response series.
#[derive(Debug, Clone, Copy)]
pub struct DosePoint {
    pub concentration: f64,
    pub rel: f64,
    pub raw: f64,
}

/// Smallest concentration where relative fitness drops below `1 - fraction`.
///
/// `points` is the sample's concentration-sorted series including the
/// baseline; `full_grid` is the drug's complete expected concentration grid
/// (ascending, baseline included). Right-censored series yield `2 * max`
/// when the maximum expected concentration was actually tested, NaN when it
/// was not. A qualifying concentration whose immediate predecessor in the
/// series is not the expected previous rung also yields NaN: an intermediate
/// concentration is missing and interpolation would be a guess.
pub fn mic(points: &[DosePoint], full_grid: &[f64], fraction: f64) -> Result<f64> {
    let threshold = 1.0 - fraction;
    let Some(&grid_max) = full_grid.last() else {
        bail!("internal error: empty concentration grid passed to MIC");
    };

    for (i, point) in points.iter().enumerate() {
        if point.rel >= threshold {
            continue;
        }
        if point.concentration == 0.0 {
            bail!(
                "internal error: MIC computed as 0; baseline relative fitness \
                 cannot be below threshold"
            );
        }
        let Some(pos) = full_grid
            .iter()
            .position(|&c| c == point.concentration)
        else {
            bail!(
                "internal error: tested concentration {} is not on the drug's grid",
                point.concentration
            );
        };
        // pos >= 1 here since concentration 0 sits first on the grid.
        let expected_prev = full_grid[pos - 1];
        let series_prev = i.checked_sub(1).map(|j| points[j].concentration);
        if series_prev != Some(expected_prev) {
            return Ok(f64::NAN);
        }
        return Ok(point.concentration);
    }

    let max_tested = points.last().map(|p| p.concentration).unwrap_or(0.0);
    if max_tested == grid_max {
        let censored = 2.0 * grid_max;
        if censored == 0.0 {
            bail!("internal error: right-censored MIC computed as 0");
        }
        Ok(censored)
    } else {
        Ok(f64::NAN)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RaucParams {
    pub min_points: usize,
    pub pseudocount: f64,
}

/// Trapezoidal integral of relative fitness over concentration, normalized
/// by the no-effect (constant 1) integral over the same range.
///
/// With `log2_axis` the x axis is log2(concentration + pseudocount).
pub fn rauc(
    points: &[DosePoint],
    full_grid: &[f64],
    params: &RaucParams,
    log2_axis: bool,
) -> Result<f64> {
    if points.len() < params.min_points {
        return Ok(f64::NAN);
    }
    if points.iter().all(|p| p.rel == 0.0) {
        return Ok(0.0);
    }

    let Some(&grid_max) = full_grid.last() else {
        bail!("internal error: empty concentration grid passed to rAUC");
    };
    let last = points.last().expect("points are non-empty");
    // A curve still growing at its last tested point while the expected
    // maximum was never tested cannot be integrated honestly.
    if last.concentration < grid_max && last.rel > CENSORED_TAIL_REL {
        return Ok(f64::NAN);
    }

    let mut series: Vec<(f64, f64)> = Vec::with_capacity(points.len() + 1);
    if points.first().map(|p| p.concentration > 0.0).unwrap_or(true) {
        series.push((0.0, 1.0));
    }
    series.extend(points.iter().map(|p| (p.concentration, p.rel)));
    if series.len() < 2 {
        return Ok(f64::NAN);
    }

    let x = |conc: f64| {
        if log2_axis {
            (conc + params.pseudocount).log2()
        } else {
            conc
        }
    };

    let mut area = 0.0;
    for pair in series.windows(2) {
        let (c0, y0) = pair[0];
        let (c1, y1) = pair[1];
        area += (x(c1) - x(c0)) * (y0 + y1) / 2.0;
    }
    let range = x(series[series.len() - 1].0) - x(series[0].0);
    if range <= 0.0 {
        bail!("internal error: non-positive concentration range in rAUC");
    }
    let value = area / range;
    if value < 0.0 {
        bail!("internal error: rAUC computed as {} (< 0)", value);
    }
    Ok(value)
}

/// Supra-MIC growth: mean raw fitness at concentrations strictly above the
/// MIC, divided by the raw baseline fitness. Requires a finite MIC and at
/// least two concentrations above it.
pub fn smg(points: &[DosePoint], mic_value: f64, baseline_raw: f64) -> f64 {
    if !mic_value.is_finite() {
        return f64::NAN;
    }
    let supra: Vec<f64> = points
        .iter()
        .filter(|p| p.concentration > mic_value)
        .map(|p| p.raw)
        .collect();
    if supra.len() < 2 {
        return f64::NAN;
    }
    stats::mean(&supra) / baseline_raw
}
