//! Routegen core library providing the building blocks of a route.
//!
//! This crate contains the endpoint descriptors, the event and message types,
//! body templating and the stage implementations (timer source, set_body
//! transform, stream sink) that a route is assembled from.

/// Message body templating.
pub mod config;
/// Endpoint descriptor parsing for sources and sinks.
pub mod endpoint;
/// Events produced by sources and messages produced by transforms.
pub mod event;
/// Stage execution framework and stage implementations.
pub mod task {
    /// Context shared by every stage of a route.
    pub mod context;
    /// Base runner trait for all stage implementations.
    pub mod runner;
    /// Transform stage replacing the message body.
    pub mod set_body {
        /// Configuration for set_body stages.
        pub mod config;
        /// Processor implementation for set_body stages.
        pub mod processor;
    }
    /// Standard stream sink.
    pub mod stream {
        /// Publisher writing message bodies to stdout or stderr.
        pub mod publisher;
    }
    /// Periodic timer source.
    pub mod timer {
        /// Subscriber implementation producing timer events.
        pub mod subscriber;
    }
}
