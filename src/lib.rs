//! Deeplinker - deferred deep-link resolution and install attribution
//!
//! A click on a link is classified, resolved to a destination (app, store or
//! web) and recorded. When the app is opened for the first time after install,
//! the open report is matched against recent clicks by device fingerprint.
//!
//! # Architecture
//! - `classifier`: platform / browser / region detection with bounded geo lookup
//! - `fingerprint`: device fingerprint derivation shared by clicks and opens
//! - `resolution`: per-click resolution state machine
//! - `attribution`: engine, matcher, fraud guard, sweep and retry queue
//! - `storage`: event store and link store (memory / SeaORM)
//! - `api`: HTTP services and middleware
//! - `interfaces`: operator CLI
//! - `config`: configuration management
//! - `system`: logging, lifecycle and execution modes

pub mod api;
pub mod attribution;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod interfaces;
pub mod resolution;
pub mod storage;
pub mod system;
pub mod utils;
