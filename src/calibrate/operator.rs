//! The operator port: decisions the calibration loop cannot make itself.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::layout::PlateId;

/// A point on a (possibly downscaled) plate image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
}

/// Decision source for the calibration loop. Production uses the console;
/// tests script it.
pub trait Operator {
    /// Upper-left and lower-right well centers picked on the downscaled
    /// preview. `None` delegates to automatic segmentation.
    fn pick_corners(&mut self, plate: &PlateId, preview: &Path) -> Result<Option<(Point, Point)>>;

    /// Review of the computed grid overlay for one plate.
    fn review_grid(&mut self, plate: &PlateId, overlay: &Path) -> Result<Decision>;
}

/// Interactive operator reading from stdin. The prompts name the preview and
/// overlay files so the operator can open them in any image viewer.
pub struct ConsoleOperator;

impl ConsoleOperator {
    fn read_line(prompt: &str) -> Result<String> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("failed to read operator input")?;
        Ok(line.trim().to_string())
    }
}

impl Operator for ConsoleOperator {
    fn pick_corners(&mut self, plate: &PlateId, preview: &Path) -> Result<Option<(Point, Point)>> {
        println!(
            "[{}] preview written to {}. Enter 'x1,y1,x2,y2' for the upper-left and \
             lower-right well centers, or press Enter for automatic detection.",
            plate,
            preview.display()
        );
        let line = Self::read_line("> ")?;
        if line.is_empty() {
            return Ok(None);
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            bail!("expected four comma-separated numbers, got '{}'", line);
        }
        let mut nums = [0.0f64; 4];
        for (i, field) in fields.iter().enumerate() {
            nums[i] = field
                .parse()
                .with_context(|| format!("'{}' is not a number", field))?;
        }
        Ok(Some((
            Point {
                x: nums[0],
                y: nums[1],
            },
            Point {
                x: nums[2],
                y: nums[3],
            },
        )))
    }

    fn review_grid(&mut self, plate: &PlateId, overlay: &Path) -> Result<Decision> {
        println!(
            "[{}] grid overlay written to {}. Accept? [y/n]",
            plate,
            overlay.display()
        );
        loop {
            let line = Self::read_line("> ")?.to_ascii_lowercase();
            match line.as_str() {
                "y" | "yes" => return Ok(Decision::Accept),
                "n" | "no" => return Ok(Decision::Reject),
                _ => println!("please answer 'y' or 'n'"),
            }
        }
    }
}

/// Unattended operator: always delegates corner picking to automatic
/// segmentation and accepts every grid.
#[derive(Debug, Default)]
pub struct AutoOperator;

impl Operator for AutoOperator {
    fn pick_corners(&mut self, _plate: &PlateId, _preview: &Path) -> Result<Option<(Point, Point)>> {
        Ok(None)
    }

    fn review_grid(&mut self, _plate: &PlateId, _overlay: &Path) -> Result<Decision> {
        Ok(Decision::Accept)
    }
}

/// Scripted decision source, for headless runs of the calibration loop.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    pub corners: VecDeque<Option<(Point, Point)>>,
    pub decisions: VecDeque<Decision>,
}

impl ScriptedOperator {
    pub fn new(
        corners: impl IntoIterator<Item = Option<(Point, Point)>>,
        decisions: impl IntoIterator<Item = Decision>,
    ) -> Self {
        Self {
            corners: corners.into_iter().collect(),
            decisions: decisions.into_iter().collect(),
        }
    }
}

impl Operator for ScriptedOperator {
    fn pick_corners(&mut self, plate: &PlateId, _preview: &Path) -> Result<Option<(Point, Point)>> {
        self.corners
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted operator has no corners left for {}", plate))
    }

    fn review_grid(&mut self, plate: &PlateId, _overlay: &Path) -> Result<Decision> {
        self.decisions
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted operator has no decision left for {}", plate))
    }
}
