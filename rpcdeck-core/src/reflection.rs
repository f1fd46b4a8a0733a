//! # Server Reflection
//!
//! This module contains the logic necessary to interact with the gRPC Server Reflection Protocol.
//!
//! It enables the engine to query a server for its own Protobuf schema at runtime, allowing
//! `rpcdeck` to function without pre-compiled descriptors. The protocol bindings are the ones
//! bundled with `tonic-reflection`.
pub mod client;
