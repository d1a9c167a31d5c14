//! # ttlock-server
//!
//! HTTP side of the TTLock bridge: the webhook the TTLock cloud pushes lock
//! records to, REST endpoints over the cached lock state, and the background
//! poller that keeps that state fresh between pushes.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod poller;
pub mod state;
