//! Drives a single user call over a session, per streaming pattern.
//!
//! Outcomes are only logged here: what the presentation layer sees of a call comes from its
//! telemetry, through the collector.
use crate::connection::MonitoredChannel;
use crate::grpc::client::{GrpcClient, GrpcRequestError};
use crate::telemetry::CallTracker;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::Status;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CallPattern {
    Unary,
    ClientStreaming,
    ServerStreaming,
    Bidirectional,
}

impl CallPattern {
    pub(crate) fn of(method: &MethodDescriptor) -> Self {
        match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => CallPattern::Unary,
            (true, false) => CallPattern::ClientStreaming,
            (false, true) => CallPattern::ServerStreaming,
            (true, true) => CallPattern::Bidirectional,
        }
    }
}

/// What the caller hands over to the transport.
pub(crate) enum Outbound {
    Single(DynamicMessage),
    /// Messages pushed to the open client stream. The stream half-closes once every sender
    /// is dropped.
    Stream(mpsc::UnboundedReceiver<DynamicMessage>),
}

pub(crate) struct Call {
    pub client: GrpcClient<MonitoredChannel>,
    pub tracker: CallTracker,
    pub method: MethodDescriptor,
    pub headers: Vec<(String, String)>,
}

impl Call {
    pub(crate) async fn run(self, outbound: Outbound) {
        let Call {
            mut client,
            tracker,
            method,
            headers,
        } = self;
        let name = method.full_name().to_string();

        match (CallPattern::of(&method), outbound) {
            (CallPattern::Unary, Outbound::Single(request)) => {
                let outcome = client.unary(tracker, method, request, &headers).await;
                log_outcome(&name, outcome.map(|r| r.map(|_| ())));
            }
            (CallPattern::ServerStreaming, Outbound::Single(request)) => {
                let outcome = client
                    .server_streaming(tracker, method, request, &headers)
                    .await;
                log_outcome(&name, outcome.map(|r| r.map(|_| ())));
            }
            (CallPattern::ClientStreaming, Outbound::Stream(rx)) => {
                let requests = UnboundedReceiverStream::new(rx);
                let outcome = client
                    .client_streaming(tracker, method, requests, &headers)
                    .await;
                log_outcome(&name, outcome.map(|r| r.map(|_| ())));
            }
            (pattern, _) => {
                tracker.finish(Status::unimplemented(format!(
                    "{pattern:?} calls are not supported"
                )));
                tracing::warn!(method = %name, ?pattern, "unsupported call shape");
            }
        }
    }
}

fn log_outcome(method: &str, outcome: Result<Result<(), Status>, GrpcRequestError>) {
    match outcome {
        Ok(Ok(())) => tracing::debug!(method, "call completed"),
        Ok(Err(status)) => {
            tracing::debug!(method, code = ?status.code(), detail = status.message(), "call failed")
        }
        Err(err) => tracing::warn!(method, error = %err, "call could not be sent"),
    }
}
