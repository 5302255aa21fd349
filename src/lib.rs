//! # workq
//!
//! SQLite-backed work-claim queue with an append-only audit trail.
//!
//! Supervisors create work items, agents claim the oldest unclaimed item
//! or are assigned specific ones, and complete them. Every transition is
//! recorded as a [`model::WorkAction`] in the same transaction as the
//! item write.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod queue;
pub mod telemetry;
