//! Transform stage that sets the message body from a template.
//!
//! Each incoming item is rendered against `{ "header": ..., "body": ... }` and
//! forwarded as exactly one [`Message`]. Items are handled one at a time so the
//! output order matches the input order.

use crate::config::{render_template, validate_template};
use crate::event::{Exchange, Message, MessageBuilder, SendExt, HEADER_COUNTER};
use crate::task::context::TaskContext;
use crate::task::runner::Runner;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::debug;

/// Default subject prefix for transformed messages.
const DEFAULT_MESSAGE_SUBJECT: &str = "set_body";

/// Errors that can occur during set_body processing.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Error rendering body template: {source}")]
    Render {
        #[source]
        source: crate::config::Error,
    },
    #[error(transparent)]
    Event(#[from] crate::event::Error),
    #[error("Missing required builder attribute: {}", _0)]
    MissingBuilderAttribute(String),
}

/// Renders and forwards a single message.
pub struct EventHandler {
    config: Arc<super::config::Processor>,
    tx: Option<Sender<Message>>,
    task_id: usize,
    task_type: &'static str,
}

impl EventHandler {
    async fn handle<I: Exchange>(&self, input: I) -> Result<(), Error> {
        let body = render_template(&self.config.template, &input.template_context())
            .map_err(|e| Error::Render { source: e })?;

        let headers = input.headers();
        let counter = headers
            .get(HEADER_COUNTER)
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let prefix = match &self.config.label {
            Some(label) => label.to_lowercase(),
            None => DEFAULT_MESSAGE_SUBJECT.to_string(),
        };
        debug!(from = %input.subject(), "Body set");

        let message = MessageBuilder::new()
            .body(body)
            .headers(headers)
            .subject(format!("{prefix}.{counter}"))
            .task_id(self.task_id)
            .task_type(self.task_type)
            .build()?;

        message.send_with_logging(self.tx.as_ref()).await?;
        Ok(())
    }
}

/// Transform stage consuming events or messages and emitting messages.
pub struct Processor<I> {
    config: Arc<super::config::Processor>,
    rx: Receiver<I>,
    tx: Option<Sender<Message>>,
    task_id: usize,
    task_type: &'static str,
    task_context: Arc<TaskContext>,
}

#[async_trait::async_trait]
impl<I: Exchange> Runner for Processor<I> {
    type Error = Error;
    type EventHandler = EventHandler;

    /// Checks the template compiles before any item is accepted.
    async fn init(&self) -> Result<EventHandler, Error> {
        validate_template(&self.config.template).map_err(|e| Error::Render { source: e })?;
        Ok(EventHandler {
            config: Arc::clone(&self.config),
            tx: self.tx.clone(),
            task_id: self.task_id,
            task_type: self.task_type,
        })
    }

    #[tracing::instrument(skip(self), name = "set_body", fields(route = %self.task_context.route_name, task_id = self.task_id, task_type = %self.task_type))]
    async fn run(mut self) -> Result<(), Error> {
        let handler = self.init().await?;
        while let Some(input) = self.rx.recv().await {
            match handler.handle(input).await {
                Ok(()) => {}
                Err(Error::Event(crate::event::Error::SendMessage)) => {
                    debug!("Next stage closed, stopping");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Builder for constructing Processor instances with validation.
pub struct ProcessorBuilder<I> {
    config: Option<Arc<super::config::Processor>>,
    rx: Option<Receiver<I>>,
    tx: Option<Sender<Message>>,
    task_id: usize,
    task_type: Option<&'static str>,
    task_context: Option<Arc<TaskContext>>,
}

impl<I> Default for ProcessorBuilder<I> {
    fn default() -> Self {
        ProcessorBuilder {
            config: None,
            rx: None,
            tx: None,
            task_id: 0,
            task_type: None,
            task_context: None,
        }
    }
}

impl<I: Exchange> ProcessorBuilder<I> {
    pub fn new() -> ProcessorBuilder<I> {
        ProcessorBuilder {
            ..Default::default()
        }
    }

    pub fn config(mut self, config: Arc<super::config::Processor>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn receiver(mut self, receiver: Receiver<I>) -> Self {
        self.rx = Some(receiver);
        self
    }

    pub fn sender(mut self, sender: Sender<Message>) -> Self {
        self.tx = Some(sender);
        self
    }

    pub fn task_id(mut self, task_id: usize) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn task_type(mut self, task_type: &'static str) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn task_context(mut self, task_context: Arc<TaskContext>) -> Self {
        self.task_context = Some(task_context);
        self
    }

    pub fn build(self) -> Result<Processor<I>, Error> {
        Ok(Processor {
            config: self
                .config
                .ok_or_else(|| Error::MissingBuilderAttribute("config".to_string()))?,
            rx: self
                .rx
                .ok_or_else(|| Error::MissingBuilderAttribute("receiver".to_string()))?,
            tx: self.tx,
            task_id: self.task_id,
            task_type: self
                .task_type
                .ok_or_else(|| Error::MissingBuilderAttribute("task_type".to_string()))?,
            task_context: self
                .task_context
                .ok_or_else(|| Error::MissingBuilderAttribute("task_context".to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventBuilder};
    use crate::task::context::TaskContextBuilder;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    fn create_task_context() -> Arc<TaskContext> {
        Arc::new(
            TaskContextBuilder::new()
                .route_name("set-body-test".to_string())
                .build()
                .unwrap(),
        )
    }

    fn event(counter: u64, second: u32) -> Event {
        EventBuilder::new()
            .fired_time(Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, second).unwrap())
            .counter(counter)
            .timer_name("simpleTimer".to_string())
            .subject(format!("timer.simpletimer.{counter}"))
            .task_type("from")
            .build()
            .unwrap()
    }

    fn config(template: &str) -> Arc<super::super::config::Processor> {
        Arc::new(super::super::config::Processor {
            label: None,
            template: template.to_string(),
        })
    }

    #[tokio::test]
    async fn test_processor_renders_default_body_per_event() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let processor = ProcessorBuilder::<Event>::new()
            .config(Arc::new(super::super::config::Processor::default()))
            .receiver(in_rx)
            .sender(out_tx)
            .task_id(1)
            .task_type("set_body")
            .task_context(create_task_context())
            .build()
            .unwrap();

        in_tx.send(event(1, 1)).await.unwrap();
        in_tx.send(event(2, 2)).await.unwrap();
        drop(in_tx);
        processor.run().await.unwrap();

        let first = out_rx.recv().await.unwrap();
        let second = out_rx.recv().await.unwrap();
        assert!(out_rx.recv().await.is_none());
        assert_eq!(first.body, "Hello from timer at 2026-10-14T09:00:01.000Z");
        assert_eq!(second.body, "Hello from timer at 2026-10-14T09:00:02.000Z");
        assert_eq!(first.subject, "set_body.1");
        assert_eq!(first.task_id, 1);
        assert_eq!(first.headers["timerName"], "simpleTimer");
    }

    #[tokio::test]
    async fn test_processor_chains_on_previous_body() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let processor = ProcessorBuilder::<Message>::new()
            .config(config("{{body}} (#{{header.counter}})"))
            .receiver(in_rx)
            .sender(out_tx)
            .task_type("set_body")
            .task_context(create_task_context())
            .build()
            .unwrap();

        let message = MessageBuilder::new()
            .body("Hello".to_string())
            .headers(event(7, 0).headers())
            .subject("set_body.7".to_string())
            .task_type("set_body")
            .build()
            .unwrap();
        in_tx.send(message).await.unwrap();
        drop(in_tx);
        processor.run().await.unwrap();

        assert_eq!(out_rx.recv().await.unwrap().body, "Hello (#7)");
    }

    #[tokio::test]
    async fn test_processor_rejects_invalid_template() {
        let (_in_tx, in_rx) = mpsc::channel::<Event>(1);
        let processor = ProcessorBuilder::new()
            .config(config("{{#each header}}"))
            .receiver(in_rx)
            .task_type("set_body")
            .task_context(create_task_context())
            .build()
            .unwrap();
        assert!(matches!(processor.run().await, Err(Error::Render { .. })));
    }

    #[test]
    fn test_processor_builder_missing_receiver() {
        let result = ProcessorBuilder::<Event>::new()
            .config(config("x"))
            .task_type("set_body")
            .task_context(create_task_context())
            .build();
        assert!(matches!(
            result.err(),
            Some(Error::MissingBuilderAttribute(attr)) if attr == "receiver"
        ));
    }
}
