//! Message body templating and rendering utilities.
//!
//! Provides template rendering for message bodies using Handlebars, so that a
//! transform stage can substitute header values such as the timer fire time.

use handlebars::Handlebars;
use serde::Serialize;

/// Errors that can occur during template operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Template source could not be compiled.
    #[error("Template is invalid: {source}")]
    Template {
        #[source]
        source: Box<handlebars::TemplateError>,
    },
    /// Template rendering failed due to invalid syntax or missing helpers.
    #[error("Template rendering failed: {source}")]
    Render {
        #[source]
        source: handlebars::RenderError,
    },
    /// JSON serialization error while building the render context.
    #[error("JSON serialization failed: {source}")]
    SerdeJson {
        #[source]
        source: serde_json::Error,
    },
}

/// Creates a Handlebars registry that renders plain text.
fn registry() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    // Message bodies are plain text, never HTML.
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

/// Checks that a template compiles without rendering it.
pub fn validate_template(template: &str) -> Result<(), Error> {
    registry()
        .register_template_string("validate", template)
        .map_err(|e| Error::Template {
            source: Box::new(e),
        })
}

/// Renders a string template with provided data context.
///
/// # Arguments
/// * `template` - The template string containing Handlebars syntax
/// * `data` - Template variables for substitution
///
/// # Returns
/// The rendered string with all template variables resolved
pub fn render_template<T>(template: &str, data: &T) -> Result<String, Error>
where
    T: Serialize,
{
    let data_value = serde_json::to_value(data).map_err(|e| Error::SerdeJson { source: e })?;
    registry()
        .render_template(template, &data_value)
        .map_err(|e| Error::Render { source: e })
}
