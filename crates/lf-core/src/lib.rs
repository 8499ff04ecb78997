//! Link Fault Tracker Core Library
//!
//! This library provides the escalation lifecycle for faulted fibre links:
//! - The lifecycle engine (escalations, reports, RCA, breach alerting)
//! - Persistent table stores and the change feed
//! - Media storage for stage photos
//! - Analytics roll-ups
//! - Exit codes and structured logging for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod analytics;
pub mod blob;
pub mod engine;
pub mod events;
pub mod exit_codes;
pub mod logging;
pub mod schema;
pub mod store;

pub use engine::Engine;
