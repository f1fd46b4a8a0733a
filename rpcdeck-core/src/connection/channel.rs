//! A [`Channel`] that records the connectivity it observes.
//!
//! `tonic` channels do not expose their connection state, so it is inferred from traffic:
//! a successful readiness check or response means `READY`, a transport error means
//! `TRANSIENT_FAILURE`, and waiting for readiness after a failure means `CONNECTING`.
//! Once the state is `SHUTDOWN` it never changes again and every request fails with
//! [`ChannelShutdown`].
use super::ConnectivityState;
use crate::BoxError;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tonic::body::Body;
use tonic::transport::Channel;
use tower::Service;

#[derive(Debug, thiserror::Error)]
#[error("The connection has been shut down")]
pub struct ChannelShutdown;

#[derive(Clone, Debug)]
pub struct MonitoredChannel {
    channel: Channel,
    state: Arc<watch::Sender<ConnectivityState>>,
}

impl MonitoredChannel {
    pub fn new(channel: Channel, initial: ConnectivityState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            channel,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Marks the channel as shut down. Later traffic no longer affects the state.
    pub fn shutdown(&self) {
        self.state.send_if_modified(|current| {
            let changed = *current != ConnectivityState::Shutdown;
            *current = ConnectivityState::Shutdown;
            changed
        });
    }
}

fn transition(state: &watch::Sender<ConnectivityState>, next: ConnectivityState) {
    state.send_if_modified(|current| {
        if *current == next || *current == ConnectivityState::Shutdown {
            return false;
        }
        *current = next;
        true
    });
}

impl Service<http::Request<Body>> for MonitoredChannel {
    type Response = http::Response<Body>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.state() == ConnectivityState::Shutdown {
            return Poll::Ready(Err(ChannelShutdown.into()));
        }

        let poll = self.channel.poll_ready(cx);

        match &poll {
            Poll::Pending => {
                if matches!(
                    self.state(),
                    ConnectivityState::Idle | ConnectivityState::TransientFailure
                ) {
                    transition(&self.state, ConnectivityState::Connecting);
                }
            }
            Poll::Ready(Ok(())) => transition(&self.state, ConnectivityState::Ready),
            Poll::Ready(Err(_)) => transition(&self.state, ConnectivityState::TransientFailure),
        }

        poll.map_err(Into::into)
    }

    fn call(&mut self, request: http::Request<Body>) -> Self::Future {
        if self.state() == ConnectivityState::Shutdown {
            return Box::pin(async { Err(ChannelShutdown.into()) });
        }

        let state = self.state.clone();
        let response = self.channel.call(request);

        Box::pin(async move {
            let result = response.await.map_err(BoxError::from);
            match &result {
                Ok(_) => transition(&state, ConnectivityState::Ready),
                Err(err) => {
                    tracing::debug!(error = %err, "transport error");
                    transition(&state, ConnectivityState::TransientFailure);
                }
            }
            result
        })
    }
}
