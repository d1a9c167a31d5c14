//! # ttlock-core
//!
//! Core logic of the TTLock cloud bridge.
//!
//! This crate provides:
//! - A reconciliation engine that merges pushed lock events with periodic
//!   polls into one consistent view per lock
//! - Auto-relock timers gated by weekly passage-mode windows, evaluated in
//!   the lock's local timezone
//! - A gateway abstraction over the TTLock v3 REST API, with an HTTP
//!   implementation
//! - Configuration loading and validation
//!
//! ## Architecture
//!
//! - [`schedule`] - Passage-mode windows and the auto-lock delay policy
//! - [`state`] - Cached state of one lock and how it changes
//! - [`coordinator`] - Per-lock engine: polls, events, relock timer, commands,
//!   passcodes and records
//! - [`registry`] - All locks of an account, webhook ingestion, poll cycles
//! - [`gateway`] - Cloud boundary trait and the process-wide command gate
//! - [`client`] - HTTP implementation of the gateway
//! - [`models`] - TTLock wire formats
//! - [`events`] - Record type table
//! - [`features`] - Hardware capability bits
//! - [`config`] - Configuration loading
//! - [`error`] - Unified error types

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod features;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod registry;
pub mod relock;
pub mod schedule;
pub mod state;

// Re-export primary types for convenience
pub use client::HttpGateway;
pub use config::{
    default_config_path, ApiConfig, BridgeConfig, ConfigError, ConfigResult, LocksConfig,
    ServerConfig,
};
pub use coordinator::{CoordinatorSettings, EventOutcome, LockCoordinator};
pub use error::{Result, TtlockError};
pub use events::{Action, EventCode, EventDescription};
pub use features::Features;
pub use gateway::{CommandGate, Gateway};
pub use models::{LockId, LockRecord, NewPasscode, Passcode, PasscodeType, RecordQuery, WebhookEvent};
pub use notify::{StateCallback, SubscriptionId};
pub use registry::{IngestReport, LockRegistry};
pub use schedule::{auto_lock_delay, is_within_window, PassageModeWindow};
pub use state::{LockState, LockedState, SensorData};
