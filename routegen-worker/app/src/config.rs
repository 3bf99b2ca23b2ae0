//! Configuration structures for the routegen application and its routes.
//!
//! Routes are declared as an ordered list of stages. Route files can be written
//! in YAML or JSON; the application configuration is read from a file and
//! environment variables.

use routegen_core::task::set_body;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Name of the built-in route.
pub const DEFAULT_ROUTE_NAME: &str = "simple-timer";
/// Source descriptor of the built-in route.
pub const DEFAULT_SOURCE_URI: &str = "timer:simpleTimer?period=1000";
/// Sink descriptor of the built-in route.
pub const DEFAULT_SINK_URI: &str = "stream:out";

/// Top-level configuration of a route file.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route definition containing name and stages.
    pub route: RouteDefinition,
}

/// Declaration of one linear data flow.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize)]
pub struct RouteDefinition {
    /// Unique name for this route.
    pub name: String,
    /// Optional labels for logging.
    pub labels: Option<Map<String, Value>>,
    /// Stages in execution order: one source, one or more transforms, one sink.
    pub tasks: Vec<TaskType>,
}

impl Default for RouteDefinition {
    /// Timer firing every second, formatting a greeting and printing it to stdout.
    fn default() -> Self {
        RouteDefinition {
            name: DEFAULT_ROUTE_NAME.to_string(),
            labels: None,
            tasks: vec![
                TaskType::from(Endpoint {
                    uri: DEFAULT_SOURCE_URI.to_string(),
                }),
                TaskType::set_body(set_body::config::Processor::default()),
                TaskType::to(Endpoint {
                    uri: DEFAULT_SINK_URI.to_string(),
                }),
            ],
        }
    }
}

/// Reference to a source or sink endpoint.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize, Hash)]
pub struct Endpoint {
    /// Endpoint descriptor, e.g. `timer:simpleTimer?period=1000` or `stream:out`.
    pub uri: String,
}

/// Stage kinds a route can be assembled from.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize)]
#[allow(non_camel_case_types)]
pub enum TaskType {
    /// Source endpoint producing events.
    from(Endpoint),
    /// Transform replacing the message body with a rendered template.
    set_body(set_body::config::Processor),
    /// Sink endpoint consuming messages.
    to(Endpoint),
}

impl TaskType {
    /// Returns the task type as a static string for event categorization.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaskType::from(_) => "from",
            TaskType::set_body(_) => "set_body",
            TaskType::to(_) => "to",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main application configuration.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Route discovery options.
    #[serde(default)]
    pub routes: RouteOptions,
    /// Optional worker configuration.
    pub worker: Option<WorkerConfig>,
}

/// Route loading configuration.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct RouteOptions {
    /// Glob pattern for route files (e.g. "/routes/*.yaml").
    /// The built-in route runs when unset.
    pub path: Option<PathBuf>,
}

/// Worker configuration.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Optional capacity of the channels between stages.
    pub event_buffer_size: Option<usize>,
}
