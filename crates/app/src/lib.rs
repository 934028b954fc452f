//! Application assembly for the storefront.
//!
//! This crate provides:
//! - [`Config`] loaded from environment variables
//! - [`telemetry::init`] installing the tracing subscriber
//! - [`Storefront`], the services wired to storage and the routing table
//! - [`BoundaryError`] and [`report`] translating domain errors for callers

pub mod config;
pub mod error;
pub mod storefront;
pub mod telemetry;

pub use config::{Config, LogFormat};
pub use error::{AppError, BoundaryError, Reported, Status, report};
pub use storefront::{Storefront, default_collaborators};
