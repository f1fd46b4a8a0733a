//! # Call Telemetry
//!
//! Low-level observations about the calls going through a session: every inbound payload
//! and the completion (status and timing) of every call.
//!
//! Observers register a [`StatsHandler`] on the session's [`Telemetry`]. Each record comes with
//! the [`CallContext`] of the call that produced it, which tells user calls apart from the
//! calls the engine issues for itself (reflection).
//!
//! Completion is tracked by a [`CallTracker`]. A tracker that is dropped before it is finished
//! (the call future was aborted) reports the call as `CANCELLED`.
use prost::bytes::Bytes;
use prost_reflect::DynamicMessage;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tonic::Status;

pub mod collector;

pub use collector::{Collector, PayloadFormatError, format_payload, status_name};

/// Per-call marker attached to every telemetry record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallContext {
    internal: bool,
}

impl CallContext {
    /// Context for a call issued on behalf of the user.
    pub fn user() -> Self {
        Self { internal: false }
    }

    /// Context for a call the engine issues for its own purposes.
    pub fn internal() -> Self {
        Self { internal: true }
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }
}

/// An inbound message, in whichever representation the receiving side produced.
#[derive(Clone, Debug)]
pub enum Payload {
    /// A message decoded at runtime against a discovered descriptor.
    Dynamic(DynamicMessage),
    /// A message type compiled into this crate (e.g. reflection responses).
    Compiled(Arc<dyn Debug + Send + Sync>),
    /// Bytes that could not be decoded into any message.
    Encoded(Bytes),
}

#[derive(Clone, Debug)]
pub enum RpcStats {
    InPayload {
        payload: Payload,
    },
    End {
        begin_time: Instant,
        end_time: Instant,
        status: Status,
    },
}

/// Listener for the telemetry of a session.
pub trait StatsHandler: Send + Sync + 'static {
    fn handle_rpc(&self, ctx: &CallContext, stats: &RpcStats);
}

/// The set of [`StatsHandler`]s registered on a session.
#[derive(Clone, Default)]
pub struct Telemetry {
    handlers: Arc<RwLock<Vec<Arc<dyn StatsHandler>>>>,
}

impl Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("handlers", &self.handlers().len())
            .finish()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: Arc<dyn StatsHandler>) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.push(handler);
    }

    pub fn emit(&self, ctx: &CallContext, stats: RpcStats) {
        for handler in self.handlers() {
            handler.handle_rpc(ctx, &stats);
        }
    }

    /// Starts tracking a call; the returned tracker reports its completion.
    pub fn track(&self, ctx: CallContext) -> CallTracker {
        CallTracker {
            telemetry: self.clone(),
            ctx,
            begin_time: Instant::now(),
            finished: false,
        }
    }

    // Handlers are invoked on a snapshot so one may register another without deadlocking.
    fn handlers(&self) -> Vec<Arc<dyn StatsHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Reports the payloads and the completion of a single call.
#[derive(Debug)]
pub struct CallTracker {
    telemetry: Telemetry,
    ctx: CallContext,
    begin_time: Instant,
    finished: bool,
}

impl CallTracker {
    pub fn context(&self) -> CallContext {
        self.ctx
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn payload(&self, payload: Payload) {
        self.telemetry
            .emit(&self.ctx, RpcStats::InPayload { payload });
    }

    pub fn finish(mut self, status: Status) {
        self.finished = true;
        self.end(status);
    }

    fn end(&self, status: Status) {
        self.telemetry.emit(
            &self.ctx,
            RpcStats::End {
                begin_time: self.begin_time,
                end_time: Instant::now(),
                status,
            },
        );
    }
}

impl Drop for CallTracker {
    fn drop(&mut self) {
        if !self.finished {
            self.end(Status::cancelled("call was cancelled before completion"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(CallContext, String)>>);

    impl StatsHandler for Recorder {
        fn handle_rpc(&self, ctx: &CallContext, stats: &RpcStats) {
            let label = match stats {
                RpcStats::InPayload { .. } => "payload".to_string(),
                RpcStats::End { status, .. } => format!("end:{:?}", status.code()),
            };
            self.0.lock().unwrap().push((*ctx, label));
        }
    }

    #[test]
    fn test_finished_tracker_reports_its_status_once() {
        let telemetry = Telemetry::new();
        let recorder = Arc::new(Recorder::default());
        telemetry.register(recorder.clone());

        let tracker = telemetry.track(CallContext::user());
        tracker.payload(Payload::Encoded(Bytes::from_static(b"\x01")));
        tracker.finish(Status::ok(""));

        let records = recorder.0.lock().unwrap();
        assert_eq!(
            *records,
            vec![
                (CallContext::user(), "payload".to_string()),
                (CallContext::user(), "end:Ok".to_string()),
            ]
        );
    }

    #[test]
    fn test_dropped_tracker_reports_cancelled() {
        let telemetry = Telemetry::new();
        let recorder = Arc::new(Recorder::default());
        telemetry.register(recorder.clone());

        drop(telemetry.track(CallContext::internal()));

        let records = recorder.0.lock().unwrap();
        assert_eq!(
            *records,
            vec![(CallContext::internal(), "end:Cancelled".to_string())]
        );
    }
}
