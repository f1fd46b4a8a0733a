use prost_reflect::{EnumDescriptor, MessageDescriptor, ServiceDescriptor};
use std::fmt::Debug;

/// A generic wrapper for the descriptors a symbol can resolve to.
///
/// This enum allows the registry to return a single type when resolving symbols,
/// regardless of whether the symbol points to a Service, a Message, or an Enum.
#[derive(Debug, Clone)]
pub enum Descriptor {
    MessageDescriptor(MessageDescriptor),
    ServiceDescriptor(ServiceDescriptor),
    EnumDescriptor(EnumDescriptor),
}

impl Descriptor {
    /// Returns the full_name (e.g.,`my.package.v1.MyMessage`) of the inner descriptor
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::MessageDescriptor(v) => v.full_name(),
            Descriptor::ServiceDescriptor(v) => v.full_name(),
            Descriptor::EnumDescriptor(v) => v.full_name(),
        }
    }

    /// Short label of the descriptor kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Descriptor::MessageDescriptor(_) => "message",
            Descriptor::ServiceDescriptor(_) => "service",
            Descriptor::EnumDescriptor(_) => "enum",
        }
    }
}
