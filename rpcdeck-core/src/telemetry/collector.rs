//! # Instrumentation Collector
//!
//! A [`StatsHandler`] that turns call telemetry into presentation events: every inbound
//! payload becomes a [`Event::PayloadReceived`] and every call completion a
//! [`Event::CallEnded`]. Telemetry of internal calls is discarded.
use super::{CallContext, Payload, RpcStats, StatsHandler};
use crate::events::{Event, EventSink};
use prost_reflect::text_format::FormatOptions;
use std::sync::Arc;
use tonic::Code;

#[derive(Debug, thiserror::Error)]
pub enum PayloadFormatError {
    #[error("Payload is not a protobuf message ({len} undecodable bytes)")]
    NotAMessage { len: usize },
}

pub struct Collector {
    events: Arc<dyn EventSink>,
}

impl Collector {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }
}

impl StatsHandler for Collector {
    fn handle_rpc(&self, ctx: &CallContext, stats: &RpcStats) {
        if ctx.is_internal() {
            return;
        }

        match stats {
            RpcStats::InPayload { payload } => match format_payload(payload) {
                Ok(text) => self.events.publish(Event::PayloadReceived { text }),
                Err(err) => tracing::error!(error = %err, "dropping inbound payload"),
            },
            RpcStats::End {
                begin_time,
                end_time,
                status,
            } => {
                let code = status.code();
                self.events.publish(Event::CallEnded {
                    status_code: code as i32,
                    status_name: status_name(code).to_string(),
                    duration: end_time.saturating_duration_since(*begin_time),
                });
            }
        }
    }
}

/// Renders a payload as indented, multi-line text.
pub fn format_payload(payload: &Payload) -> Result<String, PayloadFormatError> {
    match payload {
        Payload::Dynamic(message) => {
            let options = FormatOptions::new().pretty(true);
            Ok(message.to_text_format_with_options(&options))
        }
        Payload::Compiled(message) => Ok(format!("{message:#?}")),
        Payload::Encoded(bytes) => Err(PayloadFormatError::NotAMessage { len: bytes.len() }),
    }
}

/// Canonical name of a gRPC status code.
pub fn status_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}
