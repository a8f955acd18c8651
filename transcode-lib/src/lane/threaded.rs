//! Running a lane on its own worker thread
//!
//! The worker pumps the inner lane into a bounded queue and blocks while the
//! queue is full. The scheduler sees an ordinary lane that reports
//! [`Pump::Pending`] when the worker has not produced anything yet.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::capability::{EncodedUnit, StreamDescriptor};
use crate::error::{Result, TranscodeError};
use crate::types::{MediaKind, Rational};

use super::{Lane, LaneState, Pump};

/// How long a pump waits for the worker before reporting `Pending`
const POLL_WAIT: Duration = Duration::from_millis(5);

enum Item {
    Unit(EncodedUnit),
    Done,
    Failed(TranscodeError),
}

struct QueueInner {
    items: VecDeque<Item>,
    capacity: usize,
    closed: bool,
    descriptor: StreamDescriptor,
    clamps: u64,
}

struct UnitQueue {
    inner: Mutex<QueueInner>,
    not_full: Condvar,
    not_empty: Condvar,
}

pub struct ThreadedLane {
    stream: usize,
    kind: MediaKind,
    time_base: Rational,
    state: LaneState,
    queue: Arc<UnitQueue>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedLane {
    /// Move `lane` onto a worker thread buffering up to `capacity` units.
    pub fn spawn(lane: Box<dyn Lane>, capacity: usize) -> Result<Self> {
        let stream = lane.stream_index();
        let kind = lane.kind();
        let time_base = lane.time_base();
        let queue = Arc::new(UnitQueue {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
                closed: false,
                descriptor: lane.descriptor(),
                clamps: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        });

        let worker_queue = Arc::clone(&queue);
        let worker = thread::Builder::new()
            .name(format!("lane-{}", stream))
            .spawn(move || run_worker(lane, worker_queue))?;
        debug!(stream, %kind, capacity, "threaded lane: worker started");

        Ok(Self {
            stream,
            kind,
            time_base,
            state: LaneState::Idle,
            queue,
            worker: Some(worker),
        })
    }

    fn shutdown(&mut self) {
        {
            let mut inner = self.queue.inner.lock();
            inner.closed = true;
            self.queue.not_full.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(stream = self.stream, "threaded lane: worker panicked");
            }
        }
    }
}

fn run_worker(mut lane: Box<dyn Lane>, queue: Arc<UnitQueue>) {
    loop {
        let item = match lane.pump() {
            Ok(Pump::Unit(unit)) => Item::Unit(unit),
            Ok(Pump::Pending) => {
                let mut inner = queue.inner.lock();
                if !inner.closed {
                    queue.not_full.wait_for(&mut inner, POLL_WAIT);
                }
                if inner.closed {
                    drop(inner);
                    lane.close();
                    return;
                }
                continue;
            }
            Ok(Pump::Drained) => Item::Done,
            Err(e) => Item::Failed(e),
        };
        let last = !matches!(item, Item::Unit(_));

        let mut inner = queue.inner.lock();
        while inner.items.len() >= inner.capacity && !inner.closed {
            queue.not_full.wait(&mut inner);
        }
        if inner.closed {
            lane.close();
            return;
        }
        inner.descriptor = lane.descriptor();
        inner.clamps = lane.timestamp_clamps();
        inner.items.push_back(item);
        queue.not_empty.notify_one();
        if last {
            return;
        }
    }
}

impl Lane for ThreadedLane {
    fn stream_index(&self) -> usize {
        self.stream
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn descriptor(&self) -> StreamDescriptor {
        self.queue.inner.lock().descriptor.clone()
    }

    fn state(&self) -> LaneState {
        self.state
    }

    fn pump(&mut self) -> Result<Pump> {
        if self.state == LaneState::Closed {
            return Ok(Pump::Drained);
        }
        let item = {
            let mut inner = self.queue.inner.lock();
            if inner.items.is_empty() {
                self.queue.not_empty.wait_for(&mut inner, POLL_WAIT);
            }
            let item = inner.items.pop_front();
            if item.is_some() {
                self.queue.not_full.notify_one();
            }
            item
        };
        match item {
            None => Ok(Pump::Pending),
            Some(Item::Unit(unit)) => {
                self.state = LaneState::Active;
                Ok(Pump::Unit(unit))
            }
            Some(Item::Done) => {
                self.state = LaneState::Closed;
                Ok(Pump::Drained)
            }
            Some(Item::Failed(e)) => {
                self.state = LaneState::Closed;
                Err(e)
            }
        }
    }

    fn timestamp_clamps(&self) -> u64 {
        self.queue.inner.lock().clamps
    }

    fn close(&mut self) {
        self.state = LaneState::Closed;
        self.shutdown();
    }
}

impl Drop for ThreadedLane {
    fn drop(&mut self) {
        self.shutdown();
    }
}
