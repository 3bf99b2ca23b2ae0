//! Routegen application orchestration and configuration.
//!
//! This crate turns route definitions into running pipelines: it parses route
//! configuration, validates and activates each route, and manages the
//! application lifecycle around them.

/// Application lifecycle and route loading.
pub mod app;
/// Configuration structures and deserialization.
pub mod config;
/// Route activation and stage wiring.
pub mod route;
