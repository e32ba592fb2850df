//! Phase-transition events for observability sinks.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use crate::types::Phase;

/// Emitted once per phase transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchEvent {
    pub phase: Phase,
    pub iteration: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub source_count: usize,
    pub degraded: bool,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Receives research events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ResearchEvent);
}

/// Logs each event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: ResearchEvent) {
        info!(
            phase = %event.phase,
            iteration = event.iteration,
            elapsed_ms = event.elapsed.as_millis() as u64,
            sources = event.source_count,
            degraded = event.degraded,
            "Research phase"
        );
    }
}

/// Forwards events to an unbounded channel; send errors are ignored.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<ResearchEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResearchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ResearchEvent) {
        let _ = self.tx.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: ResearchEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(phase: Phase) -> ResearchEvent {
        ResearchEvent {
            phase,
            iteration: 1,
            elapsed: Duration::from_millis(1500),
            source_count: 4,
            degraded: false,
        }
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelEventSink::new();
        sink.emit(event(Phase::Searching));
        sink.emit(event(Phase::Reflecting));
        assert_eq!(rx.recv().await.unwrap().phase, Phase::Searching);
        assert_eq!(rx.recv().await.unwrap().phase, Phase::Reflecting);
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.emit(event(Phase::Done));
    }

    #[test]
    fn test_event_serializes_elapsed_ms() {
        let json = serde_json::to_value(event(Phase::Planning)).unwrap();
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["phase"], "planning");
    }
}
