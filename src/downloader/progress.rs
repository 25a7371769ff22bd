use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn progress_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[download\]\s+(\d{1,3}(?:\.\d+)?)%").expect("progress pattern is valid")
    })
}

/// Extract the tool's native 0–100 percentage from one output line.
pub fn parse_percent(line: &str) -> Option<f64> {
    let captures = progress_pattern().captures(line)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 100.0))
}

/// Slice of the overall 0–100 scale reserved for the tool's own progress.
/// What lies below the floor belongs to queuing, above the ceiling to
/// finalisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressBand {
    pub floor: f64,
    pub ceiling: f64,
}

impl ProgressBand {
    pub const fn new(floor: f64, ceiling: f64) -> Self {
        Self { floor, ceiling }
    }

    pub fn rescale(&self, raw: f64) -> f64 {
        let raw = raw.clamp(0.0, 100.0);
        self.floor + (raw / 100.0) * (self.ceiling - self.floor)
    }
}

impl Default for ProgressBand {
    fn default() -> Self {
        Self::new(25.0, 95.0)
    }
}
