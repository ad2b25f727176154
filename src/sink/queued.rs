//! Bounded queue in front of a slower sink.
//!
//! `append` only enqueues and never blocks. A full queue is reported as
//! `SinkError::Backpressure` so the caller learns the event was not
//! accepted. A worker thread drains the queue into the inner sink; write
//! failures there are logged and counted.

use crate::core::Event;
use crate::sink::{EventSink, SinkError};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

enum Message {
    Append(String, Event),
    Flush(Sender<()>),
}

pub struct QueuedSink {
    inner: Arc<dyn EventSink>,
    sender: Option<Sender<Message>>,
    worker: Option<JoinHandle<()>>,
    capacity: usize,
    failures: Arc<AtomicU64>,
}

impl QueuedSink {
    /// Start a worker draining into `inner` through a queue of `capacity`.
    pub fn new(inner: Arc<dyn EventSink>, capacity: usize) -> Self {
        let (sender, receiver) = bounded::<Message>(capacity.max(1));
        let failures = Arc::new(AtomicU64::new(0));

        let worker_inner = Arc::clone(&inner);
        let worker_failures = Arc::clone(&failures);
        let worker = std::thread::Builder::new()
            .name("proctor-sink".to_string())
            .spawn(move || {
                for message in receiver {
                    match message {
                        Message::Append(candidate_id, event) => {
                            if let Err(e) = worker_inner.append(&candidate_id, &event) {
                                worker_failures.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(
                                    candidate = %candidate_id,
                                    event_type = %event.event_type,
                                    "failed to persist event: {e}"
                                );
                            }
                        }
                        Message::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })
            .ok();

        if worker.is_none() {
            tracing::error!("could not spawn sink worker thread");
        }

        Self {
            inner,
            sender: worker.as_ref().map(|_| sender),
            worker,
            capacity: capacity.max(1),
            failures,
        }
    }

    /// Block until everything queued so far has reached the inner sink.
    pub fn flush(&self) -> Result<(), SinkError> {
        let sender = self.sender.as_ref().ok_or(SinkError::Closed)?;
        let (done_tx, done_rx) = bounded(1);
        sender
            .send(Message::Flush(done_tx))
            .map_err(|_| SinkError::Closed)?;
        done_rx.recv().map_err(|_| SinkError::Closed)
    }

    /// Events the worker failed to write to the inner sink.
    pub fn failed_writes(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.sender.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl EventSink for QueuedSink {
    fn append(&self, candidate_id: &str, event: &Event) -> Result<(), SinkError> {
        let sender = self.sender.as_ref().ok_or(SinkError::Closed)?;
        sender
            .try_send(Message::Append(candidate_id.to_string(), event.clone()))
            .map_err(|e| match e {
                TrySendError::Full(_) => SinkError::Backpressure {
                    capacity: self.capacity,
                },
                TrySendError::Disconnected(_) => SinkError::Closed,
            })
    }

    /// Flushes pending writes first so callers read what they appended.
    fn query(&self, candidate_id: &str, limit: usize) -> Result<Vec<Event>, SinkError> {
        self.flush()?;
        self.inner.query(candidate_id, limit)
    }
}

impl Drop for QueuedSink {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
