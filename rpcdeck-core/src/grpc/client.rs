//! # Generic gRPC Client
//!
//! This module wraps a standard `tonic` client to provide a generic interface for
//! gRPC communication. It is agnostic to the specific Protobuf messages being exchanged.
//!
//! ## How it works
//!
//! The [`GrpcClient`] utilizes the [`super::codec::DynamicCodec`] to handle serialization.
//! Every call is driven with a [`CallTracker`] obtained from [`GrpcClient::track`]: the codec
//! reports each inbound message to it and the client finishes it with the completion status
//! of the call. Creating the tracker before the call future means a call aborted before its
//! first poll is still reported as cancelled.
//!
//! ## Features
//!
//! * **Dynamic Pathing**: Constructs the HTTP/2 path (e.g., `/package.Service/Method`) at runtime.
//! * **Metadata Handling**: Converts standard Rust string tuples into Tonic's `MetadataMap` for headers.
//! * **Access Patterns**: Provides specific methods for Unary, Server Streaming and Client
//!   Streaming calls.
use super::codec::{DynamicCodec, PayloadTap};
use crate::BoxError;
use crate::telemetry::{CallContext, CallTracker, Telemetry};
use futures_util::Stream;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::str::FromStr;
use tonic::{
    Status,
    client::GrpcService,
    metadata::{
        MetadataKey, MetadataValue,
        errors::{InvalidMetadataKey, InvalidMetadataValue},
    },
    transport::Channel,
};

#[derive(thiserror::Error, Debug)]
pub enum GrpcRequestError {
    #[error("Internal error, the client was not ready: '{0}'")]
    ClientNotReady(#[source] BoxError),
    #[error("Invalid gRPC path '{0}'")]
    InvalidPath(String),
    #[error("Invalid metadata (header) key '{key}': '{source}'")]
    InvalidMetadataKey {
        key: String,
        source: InvalidMetadataKey,
    },
    #[error("Invalid metadata (header) value for key '{key}': '{source}'")]
    InvalidMetadataValue {
        key: String,
        source: InvalidMetadataValue,
    },
}

impl GrpcRequestError {
    /// The status a call failing with this error completes with.
    pub fn to_status(&self) -> Status {
        match self {
            GrpcRequestError::ClientNotReady(_) => Status::unavailable(self.to_string()),
            _ => Status::internal(self.to_string()),
        }
    }
}

/// A generic client performing dynamic gRPC calls.
#[derive(Clone, Debug)]
pub struct GrpcClient<S = Channel> {
    client: tonic::client::Grpc<S>,
    telemetry: Telemetry,
}

impl<S> GrpcClient<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S, telemetry: Telemetry) -> Self {
        let client = tonic::client::Grpc::new(service);
        Self { client, telemetry }
    }

    /// Starts tracking a call made with this client.
    pub fn track(&self, ctx: CallContext) -> CallTracker {
        self.telemetry.track(ctx)
    }

    /// Performs a Unary gRPC call (Single Request -> Single Response).
    ///
    /// # Returns
    /// * `Ok(Ok(DynamicMessage))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send request or connect.
    pub async fn unary(
        &mut self,
        tracker: CallTracker,
        method: MethodDescriptor,
        payload: DynamicMessage,
        headers: &[(String, String)],
    ) -> Result<Result<DynamicMessage, Status>, GrpcRequestError> {
        let outcome: Result<Result<DynamicMessage, Status>, GrpcRequestError> = async {
            self.ready().await?;

            let codec = DynamicCodec::new(method.output(), tap(&tracker));
            let path = http_path(&method)?;
            let request = build_request(payload, headers)?;

            match self.client.unary(request, path, codec).await {
                Ok(response) => Ok(Ok(response.into_inner())),
                Err(status) => Ok(Err(status)),
            }
        }
        .await;

        tracker.finish(completion_status(&outcome));
        outcome
    }

    /// Performs a Server Streaming gRPC call (Single Request -> Stream of Responses).
    ///
    /// The response stream is consumed until it ends; responses are only observable
    /// through the telemetry of the call.
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(count))` - The stream completed successfully after `count` responses.
    /// * `Ok(Err(Status))` - RPC executed, but the server returned an error, possibly mid-stream.
    /// * `Err(GrpcRequestError)` - Failed to send request or connect.
    pub async fn server_streaming(
        &mut self,
        tracker: CallTracker,
        method: MethodDescriptor,
        payload: DynamicMessage,
        headers: &[(String, String)],
    ) -> Result<Result<usize, Status>, GrpcRequestError> {
        let outcome: Result<Result<usize, Status>, GrpcRequestError> = async {
            self.ready().await?;

            let codec = DynamicCodec::new(method.output(), tap(&tracker));
            let path = http_path(&method)?;
            let request = build_request(payload, headers)?;

            let mut stream = match self.client.server_streaming(request, path, codec).await {
                Ok(response) => response.into_inner(),
                Err(status) => return Ok(Err(status)),
            };

            let mut received = 0;
            loop {
                match stream.message().await {
                    Ok(Some(_)) => received += 1,
                    Ok(None) => return Ok(Ok(received)),
                    Err(status) => return Ok(Err(status)),
                }
            }
        }
        .await;

        tracker.finish(completion_status(&outcome));
        outcome
    }

    /// Performs a Client Streaming gRPC call (Stream of Requests -> Single Response).
    ///
    /// The request stream is sent as it produces messages; the call half-closes when the
    /// stream ends and then awaits the response.
    ///
    /// # Returns
    ///
    /// * `Ok(Ok(DynamicMessage))` - Successful RPC execution.
    /// * `Ok(Err(Status))` - RPC executed, but server returned an error.
    /// * `Err(GrpcRequestError)` - Failed to send request or connect.
    pub async fn client_streaming(
        &mut self,
        tracker: CallTracker,
        method: MethodDescriptor,
        payload_stream: impl Stream<Item = DynamicMessage> + Send + 'static,
        headers: &[(String, String)],
    ) -> Result<Result<DynamicMessage, Status>, GrpcRequestError> {
        let outcome: Result<Result<DynamicMessage, Status>, GrpcRequestError> = async {
            self.ready().await?;

            let codec = DynamicCodec::new(method.output(), tap(&tracker));
            let path = http_path(&method)?;
            let request = build_request(payload_stream, headers)?;

            match self.client.client_streaming(request, path, codec).await {
                Ok(response) => Ok(Ok(response.into_inner())),
                Err(status) => Ok(Err(status)),
            }
        }
        .await;

        tracker.finish(completion_status(&outcome));
        outcome
    }

    async fn ready(&mut self) -> Result<(), GrpcRequestError> {
        self.client
            .ready()
            .await
            .map_err(|e| GrpcRequestError::ClientNotReady(e.into()))
    }
}

fn tap(tracker: &CallTracker) -> PayloadTap {
    PayloadTap::new(tracker.telemetry().clone(), tracker.context())
}

fn completion_status<T>(outcome: &Result<Result<T, Status>, GrpcRequestError>) -> Status {
    match outcome {
        Ok(Ok(_)) => Status::ok(""),
        Ok(Err(status)) => status.clone(),
        Err(err) => err.to_status(),
    }
}

fn http_path(method: &MethodDescriptor) -> Result<http::uri::PathAndQuery, GrpcRequestError> {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    http::uri::PathAndQuery::from_str(&path).map_err(|_| GrpcRequestError::InvalidPath(path))
}

fn build_request<T>(
    payload: T,
    headers: &[(String, String)],
) -> Result<tonic::Request<T>, GrpcRequestError> {
    let mut request = tonic::Request::new(payload);
    for (k, v) in headers {
        let key =
            MetadataKey::from_str(k).map_err(|source| GrpcRequestError::InvalidMetadataKey {
                key: k.clone(),
                source,
            })?;
        let val = MetadataValue::from_str(v).map_err(|source| {
            GrpcRequestError::InvalidMetadataValue {
                key: k.clone(),
                source,
            }
        })?;
        request.metadata_mut().insert(key, val);
    }
    Ok(request)
}
