//! Route activation and stage orchestration.
//!
//! A [`Route`] holds a [`RouteDefinition`] that has not run yet. Calling
//! [`Route::configure`] checks every stage, then wires the stages into a linear
//! chain and spawns them on the current runtime, yielding an [`ActiveRoute`].
//!
//! ```text
//! [timer] --Event--> [set_body] --Message--> ... [set_body] --Message--> [stream]
//! ```
//!
//! For N stages, N-1 bounded channels are created. Nothing is spawned unless
//! every stage is valid.

use crate::config::{RouteConfig, RouteDefinition, TaskType};
use routegen_core::endpoint::{StreamEndpoint, TimerEndpoint};
use routegen_core::event::{Event, Message};
use routegen_core::task::context::{TaskContext, TaskContextBuilder};
use routegen_core::task::runner::Runner;
use routegen_core::task::stream::publisher::{BoxedWriter, PublisherBuilder};
use routegen_core::task::timer::subscriber::SubscriberBuilder;
use routegen_core::task::{set_body, stream, timer};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, Instrument};

/// Default capacity of the channels between stages.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1024;

/// Errors detected while configuring a route. Nothing runs when one is returned.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("Route {route} has no stages")]
    EmptyRoute { route: String },
    #[error("Route {route} must start with a source stage, found {found}")]
    SourceNotFirst { route: String, found: &'static str },
    #[error("Route {route} must end with a sink stage, found {found}")]
    SinkNotLast { route: String, found: &'static str },
    #[error("Route {route} needs at least one transform between its source and sink")]
    MissingTransform { route: String },
    #[error("Stage {index} of route {route}: {kind} is only allowed at the {position} of a route")]
    MisplacedStage {
        route: String,
        index: usize,
        kind: &'static str,
        position: &'static str,
    },
    #[error("Stage {index} of route {route} has an invalid endpoint: {source}")]
    Endpoint {
        route: String,
        index: usize,
        #[source]
        source: routegen_core::endpoint::Error,
    },
    #[error("Stage {index} of route {route} has an invalid template: {source}")]
    Template {
        route: String,
        index: usize,
        #[source]
        source: routegen_core::config::Error,
    },
    #[error("Failed to create route context: {source}")]
    Context {
        #[source]
        source: routegen_core::task::context::Error,
    },
    #[error("Failed to build stage {index}: {message}")]
    Stage { index: usize, message: String },
    #[error("Route {route} must be configured from within a tokio runtime")]
    NoRuntime { route: String },
    #[error("Missing required builder attribute: {0}")]
    MissingBuilderAttribute(String),
}

/// Errors reported by the stages of an active route.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error in the timer source.
    #[error(transparent)]
    TimerSubscriber(#[from] timer::subscriber::Error),
    /// Error in a set_body transform.
    #[error(transparent)]
    SetBodyProcessor(#[from] set_body::processor::Error),
    /// Error in the stream sink.
    #[error(transparent)]
    StreamPublisher(#[from] stream::publisher::Error),
    /// A stage panicked or was aborted.
    #[error("Stage {index} did not complete: {source}")]
    Join {
        index: usize,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Type alias for a stage join handle.
type TaskHandle = JoinHandle<Result<(), Error>>;

/// Stages of a definition that passed validation.
#[derive(Debug)]
struct RoutePlan {
    source: Arc<TimerEndpoint>,
    transforms: Vec<Arc<set_body::config::Processor>>,
    sink: Arc<StreamEndpoint>,
}

impl RoutePlan {
    /// Checks the stage layout and parses every endpoint and template.
    fn from_definition(definition: &RouteDefinition) -> Result<RoutePlan, ConfigurationError> {
        let route = || definition.name.clone();
        let tasks = &definition.tasks;

        let (first, last) = match (tasks.first(), tasks.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(ConfigurationError::EmptyRoute { route: route() }),
        };
        let TaskType::from(source) = first else {
            return Err(ConfigurationError::SourceNotFirst {
                route: route(),
                found: first.as_str(),
            });
        };
        if tasks.len() < 2 {
            return Err(ConfigurationError::SinkNotLast {
                route: route(),
                found: first.as_str(),
            });
        }
        let TaskType::to(sink) = last else {
            return Err(ConfigurationError::SinkNotLast {
                route: route(),
                found: last.as_str(),
            });
        };

        let source = source
            .uri
            .parse::<TimerEndpoint>()
            .map_err(|e| ConfigurationError::Endpoint {
                route: route(),
                index: 0,
                source: e,
            })?;

        let middle = &tasks[1..tasks.len() - 1];
        if middle.is_empty() {
            return Err(ConfigurationError::MissingTransform { route: route() });
        }
        let mut transforms = Vec::with_capacity(middle.len());
        for (offset, task) in middle.iter().enumerate() {
            let index = offset + 1;
            match task {
                TaskType::set_body(config) => {
                    routegen_core::config::validate_template(&config.template).map_err(|e| {
                        ConfigurationError::Template {
                            route: route(),
                            index,
                            source: e,
                        }
                    })?;
                    transforms.push(Arc::new(config.clone()));
                }
                TaskType::from(_) => {
                    return Err(ConfigurationError::MisplacedStage {
                        route: route(),
                        index,
                        kind: task.as_str(),
                        position: "start",
                    })
                }
                TaskType::to(_) => {
                    return Err(ConfigurationError::MisplacedStage {
                        route: route(),
                        index,
                        kind: task.as_str(),
                        position: "end",
                    })
                }
            }
        }

        let sink = sink
            .uri
            .parse::<StreamEndpoint>()
            .map_err(|e| ConfigurationError::Endpoint {
                route: route(),
                index: tasks.len() - 1,
                source: e,
            })?;

        Ok(RoutePlan {
            source: Arc::new(source),
            transforms,
            sink: Arc::new(sink),
        })
    }
}

/// Stage ready to be spawned.
enum Stage {
    Timer(timer::subscriber::Subscriber),
    FirstTransform(set_body::processor::Processor<Event>),
    Transform(set_body::processor::Processor<Message>),
    Stream(stream::publisher::Publisher),
}

impl Stage {
    async fn run(self) -> Result<(), Error> {
        match self {
            Stage::Timer(stage) => stage.run().await?,
            Stage::FirstTransform(stage) => stage.run().await?,
            Stage::Transform(stage) => stage.run().await?,
            Stage::Stream(stage) => stage.run().await?,
        }
        Ok(())
    }
}

/// A route that has not been configured yet.
pub struct Route {
    /// The route's static configuration.
    pub config: Arc<RouteConfig>,
    /// Capacity of the channels between stages.
    event_buffer_size: usize,
    /// Writer replacing the sink's standard stream.
    output: Option<BoxedWriter>,
}

impl Route {
    /// Returns the name of the route.
    pub fn name(&self) -> &str {
        &self.config.route.name
    }

    /// Checks the stage layout, every endpoint and every template without spawning.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        RoutePlan::from_definition(&self.config.route).map(|_| ())
    }

    /// Validates the definition and registers its stages with the current runtime.
    ///
    /// This is the single activation entry point. Either every stage is
    /// spawned, or a [`ConfigurationError`] is returned and nothing runs.
    #[tracing::instrument(skip(self), name = "route.configure", fields(route = %self.config.route.name))]
    pub fn configure(self) -> Result<ActiveRoute, ConfigurationError> {
        let definition = &self.config.route;
        let plan = RoutePlan::from_definition(definition)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ConfigurationError::NoRuntime {
                route: definition.name.clone(),
            }
        })?;

        let task_context = Arc::new(
            TaskContextBuilder::new()
                .route_name(definition.name.clone())
                .route_labels(definition.labels.clone())
                .build()
                .map_err(|e| ConfigurationError::Context { source: e })?,
        );

        let stages = build_stages(
            plan,
            &definition.tasks,
            task_context,
            self.event_buffer_size,
            self.output,
        )?;
        let stage_count = stages.len();

        let span = tracing::Span::current();
        let handles = stages
            .into_iter()
            .map(|stage| runtime.spawn(stage.run().instrument(span.clone())))
            .collect();

        info!(stages = stage_count, "Route activated");
        Ok(ActiveRoute {
            name: definition.name.clone(),
            handles,
        })
    }
}

/// Reports a stage whose builder rejected its inputs.
fn stage_error(index: usize, e: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::Stage {
        index,
        message: e.to_string(),
    }
}

/// Wires the stages of a plan with one channel between each pair.
fn build_stages(
    plan: RoutePlan,
    tasks: &[TaskType],
    task_context: Arc<TaskContext>,
    buffer_size: usize,
    output: Option<BoxedWriter>,
) -> Result<Vec<Stage>, ConfigurationError> {
    let mut stages = Vec::with_capacity(tasks.len());

    let (event_tx, event_rx) = mpsc::channel::<Event>(buffer_size);
    let timer = SubscriberBuilder::new()
        .endpoint(plan.source)
        .sender(event_tx)
        .task_id(0)
        .task_type(tasks[0].as_str())
        .task_context(Arc::clone(&task_context))
        .build()
        .map_err(|e| stage_error(0, e))?;
    stages.push(Stage::Timer(timer));

    let mut transforms = plan.transforms.into_iter().zip(1..);
    let (first_config, first_index) = transforms
        .next()
        .ok_or_else(|| ConfigurationError::MissingBuilderAttribute("transform".to_string()))?;
    let (message_tx, mut message_rx) = mpsc::channel::<Message>(buffer_size);
    let first = set_body::processor::ProcessorBuilder::<Event>::new()
        .config(first_config)
        .receiver(event_rx)
        .sender(message_tx)
        .task_id(first_index)
        .task_type(tasks[first_index].as_str())
        .task_context(Arc::clone(&task_context))
        .build()
        .map_err(|e| stage_error(first_index, e))?;
    stages.push(Stage::FirstTransform(first));

    for (config, index) in transforms {
        let (tx, rx) = mpsc::channel::<Message>(buffer_size);
        let transform = set_body::processor::ProcessorBuilder::<Message>::new()
            .config(config)
            .receiver(message_rx)
            .sender(tx)
            .task_id(index)
            .task_type(tasks[index].as_str())
            .task_context(Arc::clone(&task_context))
            .build()
            .map_err(|e| stage_error(index, e))?;
        stages.push(Stage::Transform(transform));
        message_rx = rx;
    }

    let sink_index = tasks.len() - 1;
    let mut publisher = PublisherBuilder::new()
        .endpoint(plan.sink)
        .receiver(message_rx)
        .task_id(sink_index)
        .task_type(tasks[sink_index].as_str())
        .task_context(task_context);
    if let Some(output) = output {
        publisher = publisher.writer(output);
    }
    let publisher = publisher
        .build()
        .map_err(|e| stage_error(sink_index, e))?;
    stages.push(Stage::Stream(publisher));

    Ok(stages)
}

/// A route whose stages are running.
pub struct ActiveRoute {
    name: String,
    handles: Vec<TaskHandle>,
}

impl ActiveRoute {
    /// Returns the name of the route.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of running stages.
    pub fn stage_count(&self) -> usize {
        self.handles.len()
    }

    /// Cancels every stage of the route.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
        info!(route = %self.name, "Route aborted");
    }

    /// Waits for every stage to finish and returns the first failure, if any.
    ///
    /// An unbounded timer never finishes, so for such routes this only returns
    /// when a stage fails and the chain drains.
    pub async fn wait(self) -> Result<(), Error> {
        let results = futures::future::join_all(self.handles).await;
        let mut first_error = None;
        for (index, result) in results.into_iter().enumerate() {
            let result = result
                .map_err(|e| Error::Join { index, source: e })
                .and_then(|r| r);
            if let Err(e) = result {
                error!(route = %self.name, stage = index, "Stage failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!(route = %self.name, "All stages completed");
                Ok(())
            }
        }
    }
}

/// Builder for constructing Route instances.
#[derive(Default)]
pub struct RouteBuilder {
    config: Option<Arc<RouteConfig>>,
    event_buffer_size: Option<usize>,
    output: Option<BoxedWriter>,
}

impl RouteBuilder {
    /// Creates a new RouteBuilder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the route configuration.
    pub fn config(mut self, config: Arc<RouteConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the capacity of the channels between stages.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sends the sink's output to `writer` instead of its standard stream.
    pub fn output(mut self, writer: BoxedWriter) -> Self {
        self.output = Some(writer);
        self
    }

    /// Builds an unconfigured Route.
    ///
    /// # Errors
    /// Returns `ConfigurationError::MissingBuilderAttribute` if the config is not set.
    pub fn build(self) -> Result<Route, ConfigurationError> {
        Ok(Route {
            config: self
                .config
                .ok_or_else(|| ConfigurationError::MissingBuilderAttribute("config".to_string()))?,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE)
                .max(1),
            output: self.output,
        })
    }
}
