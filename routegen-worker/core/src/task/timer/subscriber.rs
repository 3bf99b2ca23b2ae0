//! Periodic timer source producing one event per firing.
//!
//! Fires at a fixed period after an initial delay and hands every event to the
//! next stage in order. Stops after `repeatCount` firings when one is set, or
//! when the next stage has gone away.

use crate::endpoint::TimerEndpoint;
use crate::event::{Event, EventBuilder, SendExt};
use crate::task::context::TaskContext;
use crate::task::runner::Runner;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default subject prefix for timer events.
const DEFAULT_MESSAGE_SUBJECT: &str = "timer";

/// Errors that can occur during timer execution.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Event construction or delivery failed.
    #[error(transparent)]
    Event(#[from] crate::event::Error),
    /// Required builder attribute was not provided.
    #[error("Missing required builder attribute: {}", _0)]
    MissingBuilderAttribute(String),
}

/// Builds and dispatches the event of a single firing.
pub struct EventHandler {
    endpoint: Arc<TimerEndpoint>,
    tx: Option<Sender<Event>>,
    task_id: usize,
    task_type: &'static str,
    task_context: Arc<TaskContext>,
}

impl EventHandler {
    async fn handle(&self, counter: u64, fired_at: Instant) -> Result<(), Error> {
        let subject = format!(
            "{}.{}.{}",
            DEFAULT_MESSAGE_SUBJECT,
            self.endpoint.name.to_lowercase(),
            counter
        );
        let event = EventBuilder::new()
            .fired_time(self.task_context.wall_clock(fired_at))
            .counter(counter)
            .timer_name(self.endpoint.name.clone())
            .subject(subject)
            .task_id(self.task_id)
            .task_type(self.task_type)
            .build()?;

        event.send_with_logging(self.tx.as_ref()).await?;
        Ok(())
    }
}

/// Timer source that produces events at a fixed period.
pub struct Subscriber {
    /// Parsed timer endpoint.
    endpoint: Arc<TimerEndpoint>,
    /// Channel sender to the next stage.
    tx: Option<Sender<Event>>,
    /// Stage identifier within the route.
    task_id: usize,
    /// Stage type for event categorization and logging.
    task_type: &'static str,
    /// Route context shared by every stage.
    task_context: Arc<TaskContext>,
}

#[async_trait::async_trait]
impl Runner for Subscriber {
    type Error = Error;
    type EventHandler = EventHandler;

    async fn init(&self) -> Result<EventHandler, Error> {
        Ok(EventHandler {
            endpoint: Arc::clone(&self.endpoint),
            tx: self.tx.clone(),
            task_id: self.task_id,
            task_type: self.task_type,
            task_context: Arc::clone(&self.task_context),
        })
    }

    #[tracing::instrument(skip(self), name = "timer", fields(route = %self.task_context.route_name, task_id = self.task_id, task_type = %self.task_type))]
    async fn run(self) -> Result<(), Error> {
        let handler = self.init().await?;

        let start = Instant::now() + self.endpoint.delay;
        let mut interval = time::interval_at(start, self.endpoint.period);
        interval.set_missed_tick_behavior(if self.endpoint.fixed_rate {
            MissedTickBehavior::Burst
        } else {
            MissedTickBehavior::Delay
        });

        let mut counter = 0;
        loop {
            let fired_at = interval.tick().await;
            counter += 1;

            match handler.handle(counter, fired_at).await {
                Ok(()) => {}
                Err(Error::Event(crate::event::Error::SendMessage)) => {
                    debug!("Next stage closed, stopping timer");
                    break;
                }
                Err(e) => return Err(e),
            }

            match self.endpoint.repeat_count {
                Some(count) if count == counter => {
                    info!(firings = counter, "Timer reached its repeat count");
                    break;
                }
                Some(_) | None => continue,
            }
        }
        Ok(())
    }
}

/// Builder for constructing Subscriber instances.
#[derive(Default)]
pub struct SubscriberBuilder {
    endpoint: Option<Arc<TimerEndpoint>>,
    tx: Option<Sender<Event>>,
    task_id: usize,
    task_type: Option<&'static str>,
    task_context: Option<Arc<TaskContext>>,
}

impl SubscriberBuilder {
    pub fn new() -> SubscriberBuilder {
        SubscriberBuilder {
            ..Default::default()
        }
    }

    pub fn endpoint(mut self, endpoint: Arc<TimerEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn sender(mut self, sender: Sender<Event>) -> Self {
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

    pub fn build(self) -> Result<Subscriber, Error> {
        Ok(Subscriber {
            endpoint: self
                .endpoint
                .ok_or_else(|| Error::MissingBuilderAttribute("endpoint".to_string()))?,
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
    use crate::task::context::TaskContextBuilder;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn create_task_context() -> Arc<TaskContext> {
        Arc::new(
            TaskContextBuilder::new()
                .route_name("timer-test".to_string())
                .activated_at(
                    Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap(),
                    Instant::now(),
                )
                .build()
                .unwrap(),
        )
    }

    fn build_subscriber(uri: &str, tx: Sender<Event>) -> Subscriber {
        SubscriberBuilder::new()
            .endpoint(Arc::new(uri.parse().unwrap()))
            .sender(tx)
            .task_id(0)
            .task_type("from")
            .task_context(create_task_context())
            .build()
            .unwrap()
    }

    #[test]
    fn test_subscriber_builder_missing_endpoint() {
        let result = SubscriberBuilder::new()
            .task_type("from")
            .task_context(create_task_context())
            .build();
        assert!(matches!(
            result.err(),
            Some(Error::MissingBuilderAttribute(attr)) if attr == "endpoint"
        ));
    }

    #[test]
    fn test_subscriber_builder_missing_task_context() {
        let result = SubscriberBuilder::new()
            .endpoint(Arc::new("timer:t".parse().unwrap()))
            .task_type("from")
            .build();
        assert!(matches!(
            result.err(),
            Some(Error::MissingBuilderAttribute(attr)) if attr == "task_context"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_repeat_count_times_at_period() {
        let (tx, mut rx) = mpsc::channel(16);
        let subscriber = build_subscriber("timer:tick?period=1000&delay=0&repeatCount=3", tx);
        subscriber.run().await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 3);
        let counters: Vec<u64> = events.iter().map(|e| e.counter).collect();
        assert_eq!(counters, vec![1, 2, 3]);
        for pair in events.windows(2) {
            assert_eq!(
                pair[1].fired_time - pair[0].fired_time,
                chrono::Duration::milliseconds(1000)
            );
        }
        assert_eq!(events[0].subject, "timer.tick.1");
        assert_eq!(events[0].timer_name, "tick");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_honours_initial_delay() {
        let (tx, mut rx) = mpsc::channel(16);
        let subscriber = build_subscriber("timer:tick?period=500&delay=2000&repeatCount=1", tx);
        let started = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        subscriber.run().await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.fired_time - started,
            chrono::Duration::milliseconds(2000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let subscriber = build_subscriber("timer:tick?period=10&delay=0", tx);
        let result = tokio::time::timeout(Duration::from_secs(60), subscriber.run()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
