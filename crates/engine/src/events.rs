//! Ordered event channel between a pipeline and its caller

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use suiterun_common::{Completion, Failure, LogChunk, LogPhase, StreamEvent, TestReport};
use tokio::sync::mpsc;
use tracing::trace;

/// Sending half of a run's event stream.
///
/// Cloned freely into output readers. Once a terminal event (`complete` or
/// `error`) has gone out, every later send is dropped, so the terminal event
/// is always the last one the caller sees.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
    /// Set once a terminal event is queued. Held across every send.
    finished: Arc<Mutex<bool>>,
}

/// Receiving half of a run's event stream
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl EventSink {
    /// Create a connected sink/stream pair
    pub fn channel() -> (EventSink, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventSink {
                tx,
                finished: Arc::new(Mutex::new(false)),
            },
            EventStream { rx },
        )
    }

    /// Send an event. Returns false when it was dropped, either because the
    /// stream already ended or because the caller went away.
    pub fn send(&self, event: StreamEvent) -> bool {
        let mut finished = self.finished.lock();
        if *finished {
            return false;
        }
        if event.is_terminal() {
            *finished = true;
        }

        trace!(kind = event.kind(), "event");
        self.tx.send(event).is_ok()
    }

    pub fn status(&self, message: impl Into<String>) -> bool {
        self.send(StreamEvent::Status(message.into()))
    }

    pub fn log(&self, phase: LogPhase, chunk: impl Into<String>) -> bool {
        self.send(StreamEvent::Log(LogChunk {
            phase,
            chunk: chunk.into(),
        }))
    }

    pub fn report(&self, report: TestReport) -> bool {
        self.send(StreamEvent::Report(report))
    }

    pub fn complete(&self, exit_code: i32) -> bool {
        self.send(StreamEvent::Complete(Completion { exit_code }))
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(StreamEvent::Error(Failure {
            message: message.into(),
        }))
    }

    /// Whether a terminal event has been sent
    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    /// Whether the receiving side has been dropped
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }
}

impl EventStream {
    /// Receive the next event, or `None` once every sink is gone
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Drain the stream until all senders are dropped
    pub async fn collect_all(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, stream) = EventSink::channel();
        sink.status("starting");
        sink.log(LogPhase::Test, "line 1");
        sink.complete(0);
        drop(sink);

        let kinds: Vec<&str> = stream.map(|e| e.kind()).collect().await;
        assert_eq!(kinds, vec!["status", "log", "complete"]);
    }

    #[tokio::test]
    async fn test_nothing_after_terminal_event() {
        let (sink, stream) = EventSink::channel();
        let reader = sink.clone();
        assert!(sink.error("boom"));
        assert!(sink.is_finished());
        assert!(!reader.log(LogPhase::Test, "late output"));
        assert!(!sink.complete(0));
        drop(sink);
        drop(reader);

        let events = stream.collect_all().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error(f) if f.message == "boom"));
    }

    #[test]
    fn test_terminal_event_stays_last_under_concurrent_senders() {
        for _ in 0..200 {
            let (sink, mut stream) = EventSink::channel();
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let reader = sink.clone();
                    std::thread::spawn(move || {
                        for i in 0..200 {
                            reader.log(LogPhase::Test, format!("line {}", i));
                        }
                    })
                })
                .collect();

            sink.complete(1);
            for reader in readers {
                reader.join().unwrap();
            }
            drop(sink);

            let mut events = Vec::new();
            while let Ok(event) = stream.rx.try_recv() {
                events.push(event);
            }
            let terminal = events.iter().filter(|e| e.is_terminal()).count();
            assert_eq!(terminal, 1);
            assert!(events.last().is_some_and(StreamEvent::is_terminal));
        }
    }

    #[test]
    fn test_disconnected_caller() {
        let (sink, stream) = EventSink::channel();
        drop(stream);
        assert!(sink.is_disconnected());
        assert!(!sink.status("nobody listening"));
    }
}
