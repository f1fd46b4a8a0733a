//! # Generic gRPC Transport
//!
//! This module contains the low-level building blocks for performing gRPC calls using
//! dynamic message types.
//!
//! Unlike standard `tonic` clients which are strongly typed (e.g., `HelloRequest`),
//! the components here transport `prost_reflect::DynamicMessage`s whose shape is only known
//! at runtime, from descriptors discovered through reflection.
pub mod client;
pub mod codec;
