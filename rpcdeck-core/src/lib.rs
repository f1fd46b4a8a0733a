//! # rpcdeck Core
//!
//! `rpcdeck-core` is a schema-agnostic gRPC client engine. It connects to a server, discovers
//! its services at runtime through the gRPC Server Reflection Protocol, turns JSON input into
//! messages of a discovered method's input type and executes unary and streaming calls,
//! reporting every step as an [`events::Event`].
//!
//! ## Key Components
//!
//! * **[`Engine`]:** The command surface. `connect`, `select_method`, `send`, `cancel` and
//!   friends are issued by a presentation layer, which receives [`events::Event`]s back through
//!   an [`events::EventSink`].
//! * **[`connection::Session`]:** One live connection plus its discovered schema. A connection
//!   state watcher runs for as long as the session is open.
//! * **[`schema::SchemaRegistry`]:** The descriptors obtained via reflection, with method lookup
//!   by wire name (`/package.Service/Method`).
//! * **[`view`]:** Renders message descriptors into presentation-friendly [`view::MessageView`]s
//!   and builds runtime messages from JSON text.
//! * **[`telemetry`]:** Per-call telemetry (inbound payloads, completion status and duration)
//!   and the collector that republishes it as events.
//!
//! ## Internal clients
//!
//! * **[`grpc::client::GrpcClient`]:** A dynamic gRPC client transporting `DynamicMessage`s.
//! * **[`reflection::client::ReflectionClient`]:** A `grpc.reflection.v1` client able to collect
//!   the complete descriptor set a server exposes.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that consumers
//! use compatible versions of these underlying dependencies.
pub mod connection;
pub mod engine;
pub mod events;
pub mod grpc;
pub mod options;
pub mod reflection;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod view;

#[cfg(test)]
mod testing;

pub use engine::{Engine, EngineError};
pub use events::{Event, EventSink};
pub use options::{ConnectionOptions, TlsOptions};

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
