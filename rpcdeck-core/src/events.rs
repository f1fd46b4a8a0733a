//! # Events
//!
//! Everything the engine reports to the presentation layer goes through an [`EventSink`].
//! The engine never waits on a sink, so implementations must not block.
use crate::connection::ConnectivityState;
use crate::schema::ServiceEntry;
use crate::view::MessageView;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Event {
    ConnectionEstablished {
        address: String,
    },
    ConnectionStateChanged {
        state: ConnectivityState,
    },
    /// Services sorted by full name, methods sorted by name.
    AvailableMethodsChanged {
        services: Vec<ServiceEntry>,
    },
    InputShapeChanged {
        view: MessageView,
    },
    CallStarted {
        client_streaming: bool,
        server_streaming: bool,
    },
    PayloadReceived {
        text: String,
    },
    CallEnded {
        status_code: i32,
        status_name: String,
        duration: Duration,
    },
}

/// Receives the events published by the engine.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, event: Event);
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn publish(&self, event: Event) {
        // A closed receiver means nobody is listening anymore.
        let _ = self.send(event);
    }
}
