//! Tallysync Conflict - Conflict classification and resolution
//!
//! Provides:
//! - Rule-based classification of raw sync conflicts
//! - Learning of per-type user resolution preferences
//! - Single, bulk and automatic resolution with per-item atomicity
//! - Change notification, statistics, retention and diagnostic export
//!
//! [`ConflictService`] is the facade host applications talk to.

pub mod classifier;
pub mod engine;
pub mod error;
pub mod export;
pub mod fields;
pub mod learner;
pub mod merge;
pub mod notifier;
pub mod outstanding;
pub mod retention;
pub mod service;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::Classifier;
pub use engine::ResolutionEngine;
pub use error::ConflictError;
pub use export::DiagnosticSnapshot;
pub use learner::PatternLearner;
pub use merge::merge_by_rule;
pub use notifier::{ConflictObserver, ResolutionEvent, ResolutionObserver, SubscriptionId};
pub use service::ConflictService;
pub use stats::StatsAggregator;
