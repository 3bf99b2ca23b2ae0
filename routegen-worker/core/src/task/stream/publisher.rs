//! Sink stage that writes message bodies to a standard stream.
//!
//! The publisher exclusively owns its writer, so lines are appended in the order
//! messages arrive and never interleave with another stage of the same route.

use crate::endpoint::{StreamEndpoint, StreamKind};
use crate::event::Message;
use crate::task::context::TaskContext;
use crate::task::runner::Runner;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::Receiver;
use tracing::debug;

/// Writer a stream sink appends lines to.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Errors that can occur while writing to a stream.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to write to stream: {source}")]
    IO {
        #[source]
        source: std::io::Error,
    },
    #[error("Stream writer was already taken")]
    WriterUnavailable,
    #[error("Missing required builder attribute: {}", _0)]
    MissingBuilderAttribute(String),
}

/// Owns the writer and appends one line per message.
pub struct EventHandler {
    writer: BoxedWriter,
}

impl EventHandler {
    async fn handle(&mut self, message: Message) -> Result<(), Error> {
        let mut line = message.body;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::IO { source: e })?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::IO { source: e })?;
        debug!(subject = %message.subject, "Message written");
        Ok(())
    }
}

/// Stream sink terminating a route.
pub struct Publisher {
    endpoint: Arc<StreamEndpoint>,
    rx: Receiver<Message>,
    /// Writer override; the endpoint's standard stream is used when unset.
    writer: Mutex<Option<BoxedWriter>>,
    task_id: usize,
    task_type: &'static str,
    task_context: Arc<TaskContext>,
}

#[async_trait::async_trait]
impl Runner for Publisher {
    type Error = Error;
    type EventHandler = EventHandler;

    async fn init(&self) -> Result<EventHandler, Error> {
        let override_writer = self
            .writer
            .lock()
            .map_err(|_| Error::WriterUnavailable)?
            .take();
        let writer = match override_writer {
            Some(writer) => writer,
            None => match self.endpoint.kind {
                StreamKind::Out => Box::new(tokio::io::stdout()) as BoxedWriter,
                StreamKind::Err => Box::new(tokio::io::stderr()) as BoxedWriter,
            },
        };
        Ok(EventHandler { writer })
    }

    #[tracing::instrument(skip(self), name = "stream", fields(route = %self.task_context.route_name, task_id = self.task_id, task_type = %self.task_type))]
    async fn run(mut self) -> Result<(), Error> {
        let mut handler = self.init().await?;
        while let Some(message) = self.rx.recv().await {
            handler.handle(message).await?;
        }
        Ok(())
    }
}

/// Builder for constructing Publisher instances with validation.
#[derive(Default)]
pub struct PublisherBuilder {
    endpoint: Option<Arc<StreamEndpoint>>,
    rx: Option<Receiver<Message>>,
    writer: Option<BoxedWriter>,
    task_id: usize,
    task_type: Option<&'static str>,
    task_context: Option<Arc<TaskContext>>,
}

impl PublisherBuilder {
    pub fn new() -> PublisherBuilder {
        PublisherBuilder {
            ..Default::default()
        }
    }

    pub fn endpoint(mut self, endpoint: Arc<StreamEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn receiver(mut self, receiver: Receiver<Message>) -> Self {
        self.rx = Some(receiver);
        self
    }

    /// Replaces the endpoint's standard stream with another writer.
    pub fn writer(mut self, writer: BoxedWriter) -> Self {
        self.writer = Some(writer);
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

    pub fn build(self) -> Result<Publisher, Error> {
        Ok(Publisher {
            endpoint: self
                .endpoint
                .ok_or_else(|| Error::MissingBuilderAttribute("endpoint".to_string()))?,
            rx: self
                .rx
                .ok_or_else(|| Error::MissingBuilderAttribute("receiver".to_string()))?,
            writer: Mutex::new(self.writer),
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
