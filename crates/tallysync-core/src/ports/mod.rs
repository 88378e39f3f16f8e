//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the conflict engine
//! depends on, but whose implementations live in adapter crates or in the
//! host application.
//!
//! ## Ports Overview
//!
//! - [`IConflictStore`] - Durable conflict records, resolution history,
//!   learned patterns and the canonical entity table
//! - [`IConflictSource`] - The synchronization transport that detects
//!   divergences

pub mod conflict_source;
pub mod conflict_store;

pub use conflict_source::IConflictSource;
pub use conflict_store::IConflictStore;
