//! Stage execution context shared by every stage of a route.
//!
//! Carries route identification and the anchor used to derive fire times, so
//! stages can log consistently and the timer can produce monotonic timestamps.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Errors that can occur during TaskContext operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Required builder attribute was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
}

/// Context information shared across all stages of one route.
#[derive(Clone, Debug)]
pub struct TaskContext {
    /// Route name.
    pub route_name: String,
    /// Optional labels attached to the route for logging.
    pub route_labels: Option<Map<String, Value>>,
    /// Wall-clock instant the route was activated.
    pub activated_at: DateTime<Utc>,
    /// Monotonic instant matching `activated_at`.
    pub activated_instant: tokio::time::Instant,
}

impl TaskContext {
    /// Maps a monotonic instant onto the wall clock anchored at activation.
    ///
    /// Instants before activation map onto the activation time itself.
    pub fn wall_clock(&self, instant: tokio::time::Instant) -> DateTime<Utc> {
        let elapsed = instant.saturating_duration_since(self.activated_instant);
        let elapsed = chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::MAX);
        self.activated_at
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Builder for constructing TaskContext instances.
#[derive(Default)]
pub struct TaskContextBuilder {
    /// Route name (required for build).
    route_name: Option<String>,
    /// Optional route labels.
    route_labels: Option<Map<String, Value>>,
    /// Activation anchor, defaults to now.
    activated_at: Option<(DateTime<Utc>, tokio::time::Instant)>,
}

impl TaskContextBuilder {
    /// Creates a new TaskContextBuilder with default values.
    pub fn new() -> Self {
        Self {
            ..Default::default()
        }
    }

    /// Sets the route name.
    pub fn route_name(mut self, name: String) -> Self {
        self.route_name = Some(name);
        self
    }

    /// Sets the optional route labels.
    pub fn route_labels(mut self, labels: Option<Map<String, Value>>) -> Self {
        self.route_labels = labels;
        self
    }

    /// Overrides the activation anchor.
    ///
    /// # Arguments
    /// * `wall` - Wall-clock time corresponding to `instant`
    /// * `instant` - Monotonic instant of activation
    pub fn activated_at(mut self, wall: DateTime<Utc>, instant: tokio::time::Instant) -> Self {
        self.activated_at = Some((wall, instant));
        self
    }

    /// Builds the TaskContext instance.
    ///
    /// # Errors
    /// Returns `Error::MissingRequiredAttribute` if required fields are not set.
    pub fn build(self) -> Result<TaskContext, Error> {
        let (activated_at, activated_instant) = self
            .activated_at
            .unwrap_or_else(|| (Utc::now(), tokio::time::Instant::now()));
        Ok(TaskContext {
            route_name: self
                .route_name
                .ok_or_else(|| Error::MissingRequiredAttribute("route_name".to_string()))?,
            route_labels: self.route_labels,
            activated_at,
            activated_instant,
        })
    }
}
