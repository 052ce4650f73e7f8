//! Move quality categories and the delta classifier.
//! Pure functions only (no engine or store dependencies).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Fixed category reference data. Only the swing categories are assigned by
/// [`classify`]; the rest are reserved for manual tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Brilliant,
    Great,
    Best,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
    MissedWin,
    MissedDraw,
    Novelty,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Brilliant,
        Category::Great,
        Category::Best,
        Category::Good,
        Category::Inaccuracy,
        Category::Mistake,
        Category::Blunder,
        Category::MissedWin,
        Category::MissedDraw,
        Category::Novelty,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Brilliant => "brilliant",
            Category::Great => "great",
            Category::Best => "best",
            Category::Good => "good",
            Category::Inaccuracy => "inaccuracy",
            Category::Mistake => "mistake",
            Category::Blunder => "blunder",
            Category::MissedWin => "missed_win",
            Category::MissedDraw => "missed_draw",
            Category::Novelty => "novelty",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Category::Brilliant => "Brilliant",
            Category::Great => "Great",
            Category::Best => "Best",
            Category::Good => "Good",
            Category::Inaccuracy => "Inaccuracy",
            Category::Mistake => "Mistake",
            Category::Blunder => "Blunder",
            Category::MissedWin => "Missed Win",
            Category::MissedDraw => "Missed Draw",
            Category::Novelty => "Novelty",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.key() == s)
            .ok_or_else(|| format!("unknown move category: {s}"))
    }
}

/// Classification bands in centipawns, applied to the mover-relative delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub brilliant_cp: i32,
    pub great_cp: i32,
    pub inaccuracy_cp: i32,
    pub mistake_cp: i32,
    pub blunder_cp: i32,
    /// Verifier slack: a move this close to the engine's best still counts
    pub near_best_tolerance_cp: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            brilliant_cp: 900,
            great_cp: 600,
            inaccuracy_cp: -400,
            mistake_cp: -800,
            blunder_cp: -1200,
            near_best_tolerance_cp: 10,
        }
    }
}

impl Thresholds {
    /// Bands must nest: blunder <= mistake <= inaccuracy < 0 < great <= brilliant.
    pub fn validate(&self) -> Result<(), WorkerError> {
        let ordered = self.blunder_cp <= self.mistake_cp
            && self.mistake_cp <= self.inaccuracy_cp
            && self.inaccuracy_cp < 0
            && 0 < self.great_cp
            && self.great_cp <= self.brilliant_cp;
        if !ordered {
            return Err(WorkerError::Config(
                "classification thresholds must satisfy blunder <= mistake <= inaccuracy < 0 < great <= brilliant",
            ));
        }
        if self.near_best_tolerance_cp < 0 {
            return Err(WorkerError::Config(
                "near-best tolerance must not be negative",
            ));
        }
        Ok(())
    }
}

/// Classify a mover-relative evaluation swing (`after - before`).
///
/// Negative bands are checked most severe first, so on overlapping
/// configurations the harsher category wins.
pub fn classify(delta_cp: i32, thresholds: &Thresholds) -> Option<Category> {
    if delta_cp <= thresholds.blunder_cp {
        Some(Category::Blunder)
    } else if delta_cp <= thresholds.mistake_cp {
        Some(Category::Mistake)
    } else if delta_cp <= thresholds.inaccuracy_cp {
        Some(Category::Inaccuracy)
    } else if delta_cp >= thresholds.brilliant_cp {
        Some(Category::Brilliant)
    } else if delta_cp >= thresholds.great_cp {
        Some(Category::Great)
    } else {
        None
    }
}

/// Evaluation swing for the side that just moved. Both scores must already
/// be expressed from the mover's point of view.
pub fn mover_delta(before_cp: i32, after_cp: i32) -> i32 {
    after_cp - before_cp
}
