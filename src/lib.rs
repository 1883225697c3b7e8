//! Bondguard - Panic alerts and an admin console for bail-bond client apps.
//!
//! # Overview
//!
//! A client signs up (or logs into the demo account), lists three emergency
//! contacts and gets a panic button. One tap reads the device position,
//! opens an SMS composer with a map link and the contact list, then dials the
//! bond agent after a short delay. Admins manage the user directory, the SMS
//! recipients and the primary agent number, and browse alert metrics.
//!
//! # Backends
//!
//! The same repository traits are served by two stores:
//!
//! - [`demo::DemoStore`]: seeded, in-memory, with a simulated metrics delay
//! - [`storage::Storage`]: SQLite, metrics computed per period
//!
//! # Modules
//!
//! - [`model`]: Users, recipients, panic logs, metrics and request bodies
//! - [`store`]: Repository traits
//! - [`demo`]: In-memory backend
//! - [`storage`]: SQLite backend
//! - [`aggregation`]: Metrics ranking and snapshot assembly
//! - [`alert`]: The panic alert flow and its device capabilities
//! - [`linker`]: `sms:`/`tel:` openers for a headless deployment
//! - [`accounts`]: Sign-up, demo login and profile edits
//! - [`config`]: Environment configuration
//! - [`api`]: HTTP API handlers
//! - [`error`]: Error taxonomy

pub mod accounts;
pub mod aggregation;
pub mod alert;
pub mod api;
pub mod config;
pub mod demo;
pub mod error;
pub mod linker;
pub mod model;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
