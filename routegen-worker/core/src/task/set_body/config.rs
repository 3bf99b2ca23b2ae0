//! Configuration for set_body transform stages.

use serde::{Deserialize, Serialize};

/// Template producing the route's default message body.
pub const DEFAULT_BODY_TEMPLATE: &str = "Hello from timer at {{header.firedTime}}";

/// Configuration for a stage that replaces the message body with a rendered template.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize, Hash)]
pub struct Processor {
    /// Optional label for message subject generation.
    pub label: Option<String>,
    /// Handlebars template rendered against `header` and `body`.
    pub template: String,
}

impl Default for Processor {
    fn default() -> Self {
        Self {
            label: None,
            template: DEFAULT_BODY_TEMPLATE.to_string(),
        }
    }
}
