//! Tallysync Core - Domain types and ports for the conflict engine
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncConflict`, `EnhancedSyncConflict`, `ResolutionRecord`,
//!   `UserResolutionPattern`, `ConflictResolutionStats`
//! - **Port definitions** - Traits for adapters: `IConflictStore`, `IConflictSource`
//! - **Configuration** - YAML-backed settings for classification, learning and retention
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! The conflict engine itself lives in `tallysync-conflict`.

pub mod config;
pub mod domain;
pub mod ports;
