//! Learned resolution preferences
//!
//! One pattern exists per conflict type the user has resolved at least once.
//! The update rule lives in the learner; this module only holds the state so
//! it can be persisted and exported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ConflictTypeKey;
use super::resolution::Resolution;

/// The user's running preference for one conflict type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResolutionPattern {
    pub conflict_type: ConflictTypeKey,
    pub preferred_resolution: Resolution,
    /// In [0, 1]
    pub confidence: f64,
    /// Number of user choices observed for this type since it was created
    pub sample_size: u32,
    /// Trailing window of user choices since the preference last flipped,
    /// oldest first
    #[serde(default)]
    pub recent_choices: Vec<Resolution>,
    pub updated_at: DateTime<Utc>,
}

impl UserResolutionPattern {
    /// Starts a pattern from the first observed choice
    pub fn first_choice(conflict_type: ConflictTypeKey, resolution: Resolution) -> Self {
        Self {
            conflict_type,
            preferred_resolution: resolution,
            confidence: 0.0,
            sample_size: 0,
            recent_choices: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Choices in the window that agree with the current preference
    pub fn agreements(&self) -> usize {
        self.recent_choices
            .iter()
            .filter(|r| **r == self.preferred_resolution)
            .count()
    }

    /// Choices in the window that disagree with the current preference
    pub fn disagreements(&self) -> usize {
        self.recent_choices.len() - self.agreements()
    }

    pub fn suggestion(&self) -> PatternSuggestion {
        PatternSuggestion {
            resolution: self.preferred_resolution,
            confidence: self.confidence,
            sample_size: self.sample_size,
        }
    }
}

/// What the learner recommends for a conflict type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternSuggestion {
    pub resolution: Resolution,
    pub confidence: f64,
    pub sample_size: u32,
}
