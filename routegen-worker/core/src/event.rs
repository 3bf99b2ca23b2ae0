//! Event and message types flowing through a route.
//!
//! A timer firing produces an [`Event`]; transform stages turn it into a
//! [`Message`] whose body is eventually written by the sink. Both are scoped to
//! a single firing and are never retained after the sink has written them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Header carrying the rendered timer fire time.
pub const HEADER_FIRED_TIME: &str = "firedTime";
/// Header carrying the 1-based firing number.
pub const HEADER_COUNTER: &str = "counter";
/// Header carrying the name of the timer that fired.
pub const HEADER_TIMER_NAME: &str = "timerName";

/// Errors that can occur during event processing operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Missing required builder attribute: {}", _0)]
    MissingBuilderAttribute(String),
    #[error("Error sending to channel (receiver dropped)")]
    SendMessage,
}

/// Renders a fire time as RFC 3339 in UTC with millisecond precision.
///
/// This is the textual form substituted for `{{header.firedTime}}`,
/// e.g. `2026-10-14T09:30:00.000Z`.
pub fn render_fired_time(fired_time: &DateTime<Utc>) -> String {
    fired_time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Trigger notification produced by the timer source.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Instant the timer fired.
    pub fired_time: DateTime<Utc>,
    /// Firing number, starting at 1.
    pub counter: u64,
    /// Name of the timer endpoint.
    pub timer_name: String,
    /// Subject identifier used in logs.
    pub subject: String,
    /// Task identifier of the producing stage.
    pub task_id: usize,
    /// Task type of the producing stage.
    pub task_type: &'static str,
}

impl Event {
    /// Headers exposed to templates of the first transform stage.
    pub fn headers(&self) -> Map<String, Value> {
        let mut headers = Map::new();
        headers.insert(
            HEADER_FIRED_TIME.to_string(),
            Value::String(render_fired_time(&self.fired_time)),
        );
        headers.insert(HEADER_COUNTER.to_string(), json!(self.counter));
        headers.insert(
            HEADER_TIMER_NAME.to_string(),
            Value::String(self.timer_name.clone()),
        );
        headers
    }
}

/// Unit written by the sink after transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message payload.
    pub body: String,
    /// Headers copied from the originating event.
    pub headers: Map<String, Value>,
    /// Subject identifier used in logs.
    pub subject: String,
    /// Task identifier of the producing stage.
    pub task_id: usize,
    /// Task type of the producing stage.
    pub task_type: &'static str,
}

/// Anything a transform stage can consume.
///
/// Implemented by [`Event`] for the stage right after the source and by
/// [`Message`] for further transform stages.
pub trait Exchange: Send + 'static {
    /// Headers visible to templates as `header.*`.
    fn headers(&self) -> Map<String, Value>;
    /// Current body visible to templates as `body`, if any.
    fn body(&self) -> Option<&str>;
    /// Subject used for logging.
    fn subject(&self) -> &str;

    /// Builds the render context `{ "header": ..., "body": ... }`.
    fn template_context(&self) -> Value {
        json!({
            "header": self.headers(),
            "body": self.body(),
        })
    }
}

impl Exchange for Event {
    fn headers(&self) -> Map<String, Value> {
        Event::headers(self)
    }

    fn body(&self) -> Option<&str> {
        None
    }

    fn subject(&self) -> &str {
        &self.subject
    }
}

impl Exchange for Message {
    fn headers(&self) -> Map<String, Value> {
        self.headers.clone()
    }

    fn body(&self) -> Option<&str> {
        Some(&self.body)
    }

    fn subject(&self) -> &str {
        &self.subject
    }
}

/// Extension for handing an item to the next stage with logging.
pub trait SendExt: Sized {
    /// Subject used in the log line.
    fn log_subject(&self) -> &str;

    /// Logs the item and sends it to the next stage when a sender is provided.
    fn send_with_logging(
        self,
        tx: Option<&tokio::sync::mpsc::Sender<Self>>,
    ) -> impl std::future::Future<Output = Result<(), Error>> + Send
    where
        Self: Send,
    {
        async move {
            debug!(subject = %self.log_subject(), "Dispatching to next stage");
            if let Some(tx) = tx {
                tx.send(self).await.map_err(|_| Error::SendMessage)?;
            }
            Ok(())
        }
    }
}

impl SendExt for Event {
    fn log_subject(&self) -> &str {
        &self.subject
    }
}

impl SendExt for Message {
    fn log_subject(&self) -> &str {
        &self.subject
    }
}

/// Builder for constructing Event instances with validation.
#[derive(Default, Debug)]
pub struct EventBuilder {
    fired_time: Option<DateTime<Utc>>,
    counter: Option<u64>,
    timer_name: Option<String>,
    subject: Option<String>,
    task_id: Option<usize>,
    task_type: Option<&'static str>,
}

impl EventBuilder {
    pub fn new() -> Self {
        EventBuilder {
            ..Default::default()
        }
    }

    pub fn fired_time(mut self, fired_time: DateTime<Utc>) -> Self {
        self.fired_time = Some(fired_time);
        self
    }

    pub fn counter(mut self, counter: u64) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn timer_name(mut self, timer_name: String) -> Self {
        self.timer_name = Some(timer_name);
        self
    }

    pub fn subject(mut self, subject: String) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn task_id(mut self, task_id: usize) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn task_type(mut self, task_type: &'static str) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn build(self) -> Result<Event, Error> {
        Ok(Event {
            fired_time: self
                .fired_time
                .ok_or_else(|| Error::MissingBuilderAttribute("fired_time".to_string()))?,
            counter: self
                .counter
                .ok_or_else(|| Error::MissingBuilderAttribute("counter".to_string()))?,
            timer_name: self
                .timer_name
                .ok_or_else(|| Error::MissingBuilderAttribute("timer_name".to_string()))?,
            subject: self
                .subject
                .ok_or_else(|| Error::MissingBuilderAttribute("subject".to_string()))?,
            task_id: self.task_id.unwrap_or_default(),
            task_type: self
                .task_type
                .ok_or_else(|| Error::MissingBuilderAttribute("task_type".to_string()))?,
        })
    }
}

/// Builder for constructing Message instances with validation.
#[derive(Default, Debug)]
pub struct MessageBuilder {
    body: Option<String>,
    headers: Map<String, Value>,
    subject: Option<String>,
    task_id: Option<usize>,
    task_type: Option<&'static str>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        MessageBuilder {
            ..Default::default()
        }
    }

    pub fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn headers(mut self, headers: Map<String, Value>) -> Self {
        self.headers = headers;
        self
    }

    pub fn subject(mut self, subject: String) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn task_id(mut self, task_id: usize) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn task_type(mut self, task_type: &'static str) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn build(self) -> Result<Message, Error> {
        Ok(Message {
            body: self
                .body
                .ok_or_else(|| Error::MissingBuilderAttribute("body".to_string()))?,
            headers: self.headers,
            subject: self
                .subject
                .ok_or_else(|| Error::MissingBuilderAttribute("subject".to_string()))?,
            task_id: self.task_id.unwrap_or_default(),
            task_type: self
                .task_type
                .ok_or_else(|| Error::MissingBuilderAttribute("task_type".to_string()))?,
        })
    }
}
