//! Base trait for all route stage implementations.
//!
//! Defines the common interface that sources, transforms and sinks implement
//! to participate in a route.

/// Trait for executing route stages asynchronously.
///
/// Every stage is initialized once and then runs until its input is exhausted,
/// its bounded source completes, or an unrecoverable error occurs.
#[async_trait::async_trait]
pub trait Runner {
    /// Error type for stage execution failures.
    type Error;
    /// Per-item handler created by `init`.
    type EventHandler;

    /// Prepares everything the stage needs before processing.
    async fn init(&self) -> Result<Self::EventHandler, Self::Error>;

    /// Executes the stage until completion or error.
    async fn run(self) -> Result<(), Self::Error>;
}
