//! Resolution pattern learning
//!
//! The learner keeps one [`UserResolutionPattern`] per conflict type and
//! updates it every time the user resolves a conflict of that type.
//! Automatic resolutions are not evidence of user preference and are
//! ignored.
//!
//! ## Update rule
//!
//! Each pattern tracks a bounded window of the user's choices since its
//! preferred resolution last changed. With `a / k` the share of the window
//! agreeing with the preference, `n` the total number of user choices seen
//! for the type and `w` the configured prior weight:
//!
//! ```text
//! confidence = (a / k) * (n / (n + w))
//! ```
//!
//! The second factor discounts small samples, so a run of agreeing choices
//! strictly increases confidence toward 1. When disagreements outnumber
//! agreements the window's majority becomes the new preference (ties go to
//! the most recent choice) and the window restarts from that choice.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use tallysync_core::{
    config::LearningConfig,
    domain::{
        ConflictTypeKey, PatternSuggestion, Resolution, ResolutionActor, UserResolutionPattern,
    },
};

/// In-memory pattern table with a deterministic update rule
pub struct PatternLearner {
    patterns: RwLock<HashMap<ConflictTypeKey, UserResolutionPattern>>,
    window_size: usize,
    prior_weight: f64,
    min_samples: u32,
}

impl PatternLearner {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            window_size: config.window_size.max(1),
            prior_weight: config.prior_weight.max(0.0),
            min_samples: config.min_samples,
        }
    }

    /// Replaces the table with previously persisted patterns
    pub fn load(&self, patterns: Vec<UserResolutionPattern>) {
        let mut table = self.patterns.write();
        table.clear();
        for pattern in patterns {
            table.insert(pattern.conflict_type.clone(), pattern);
        }
        debug!(patterns = table.len(), "Loaded resolution patterns");
    }

    /// Records a resolution choice
    ///
    /// Returns the updated pattern for persistence, or `None` when the
    /// choice was not made by the user.
    pub fn record_choice(
        &self,
        conflict_type: &ConflictTypeKey,
        resolution: Resolution,
        actor: ResolutionActor,
    ) -> Option<UserResolutionPattern> {
        if actor != ResolutionActor::User {
            return None;
        }

        let mut table = self.patterns.write();
        let pattern = table
            .entry(conflict_type.clone())
            .or_insert_with(|| UserResolutionPattern::first_choice(conflict_type.clone(), resolution));

        let previous = pattern.preferred_resolution;
        self.apply(pattern, resolution);

        if pattern.preferred_resolution != previous {
            info!(
                conflict_type = %conflict_type,
                from = %previous,
                to = %pattern.preferred_resolution,
                "Preferred resolution changed"
            );
        } else {
            debug!(
                conflict_type = %conflict_type,
                resolution = %resolution,
                confidence = pattern.confidence,
                sample_size = pattern.sample_size,
                "Pattern updated"
            );
        }

        Some(pattern.clone())
    }

    /// Returns the learned suggestion once enough choices were observed
    pub fn suggest(&self, conflict_type: &ConflictTypeKey) -> Option<PatternSuggestion> {
        self.patterns
            .read()
            .get(conflict_type)
            .filter(|p| p.sample_size >= self.min_samples)
            .map(UserResolutionPattern::suggestion)
    }

    pub fn get(&self, conflict_type: &ConflictTypeKey) -> Option<UserResolutionPattern> {
        self.patterns.read().get(conflict_type).cloned()
    }

    /// All patterns ordered by conflict type
    pub fn patterns(&self) -> Vec<UserResolutionPattern> {
        let mut patterns: Vec<_> = self.patterns.read().values().cloned().collect();
        patterns.sort_by(|a, b| a.conflict_type.cmp(&b.conflict_type));
        patterns
    }

    fn apply(&self, pattern: &mut UserResolutionPattern, resolution: Resolution) {
        pattern.sample_size = pattern.sample_size.saturating_add(1);
        pattern.updated_at = Utc::now();
        pattern.recent_choices.push(resolution);
        if pattern.recent_choices.len() > self.window_size {
            let excess = pattern.recent_choices.len() - self.window_size;
            pattern.recent_choices.drain(..excess);
        }

        if pattern.disagreements() > pattern.agreements() {
            let majority = majority_choice(&pattern.recent_choices);
            if majority != pattern.preferred_resolution {
                let share = pattern
                    .recent_choices
                    .iter()
                    .filter(|r| **r == majority)
                    .count() as f64
                    / pattern.recent_choices.len() as f64;
                pattern.preferred_resolution = majority;
                pattern.confidence = (share * self.evidence(pattern.sample_size)).clamp(0.0, 1.0);
                pattern.recent_choices.clear();
                pattern.recent_choices.push(majority);
                return;
            }
        }

        let agreement = pattern.agreements() as f64 / pattern.recent_choices.len() as f64;
        pattern.confidence = (agreement * self.evidence(pattern.sample_size)).clamp(0.0, 1.0);
    }

    fn evidence(&self, samples: u32) -> f64 {
        let n = f64::from(samples);
        n / (n + self.prior_weight)
    }
}

/// Most frequent choice in the window; ties go to the most recent one
fn majority_choice(choices: &[Resolution]) -> Resolution {
    let mut best: Option<(Resolution, usize, usize)> = None;

    for candidate in [Resolution::Client, Resolution::Server, Resolution::Merge] {
        let count = choices.iter().filter(|r| **r == candidate).count();
        if count == 0 {
            continue;
        }
        let last_seen = choices.iter().rposition(|r| *r == candidate).unwrap_or(0);
        let better = match best {
            None => true,
            Some((_, best_count, best_seen)) => {
                count > best_count || (count == best_count && last_seen > best_seen)
            }
        };
        if better {
            best = Some((candidate, count, last_seen));
        }
    }

    best.map(|(r, _, _)| r).unwrap_or(Resolution::Server)
}
