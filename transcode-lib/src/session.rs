//! Transcode session: lanes -> scheduler -> container writer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::capability::ContainerWriter;
use crate::error::{Result, TranscodeError};
use crate::lane::Lane;
use crate::mux::{Scheduler, Step, StreamStats};

/// Cooperative cancellation flag shared with a running session
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a session run
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: Uuid,
    pub streams: Vec<StreamStats>,
    /// `(stream, error message)` for every lane that failed
    pub failures: Vec<(usize, String)>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn units_written(&self) -> u64 {
        self.streams.iter().map(|s| s.units).sum()
    }
}

pub struct TranscodeSession<W: ContainerWriter> {
    id: Uuid,
    scheduler: Scheduler,
    writer: W,
    cancel: CancelToken,
    report: Option<SessionReport>,
}

impl<W: ContainerWriter> TranscodeSession<W> {
    pub fn new(lanes: Vec<Box<dyn Lane>>, writer: W) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            scheduler: Scheduler::new(lanes)?,
            writer,
            cancel: CancelToken::new(),
            report: None,
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Report of the last run.
    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    /// Drive every lane to completion.
    ///
    /// The trailer is written whatever happens. Returns `Cancelled` when the
    /// token fired and `LaneFailures` when some lanes failed; the report is
    /// available from [`report`](Self::report) in every case.
    pub fn run(&mut self) -> Result<SessionReport> {
        if self.report.is_some() {
            return Err(TranscodeError::config("session already ran"));
        }
        let span = info_span!("session", id = %self.id);
        let _enter = span.enter();
        let started = Instant::now();
        info!(streams = self.scheduler.stats().len(), "session: starting");

        let outcome = self.drive();
        let cancelled = matches!(outcome, Ok(false));
        let trailer = self.finalize();

        let report = SessionReport {
            id: self.id,
            streams: self.scheduler.stats(),
            failures: self
                .scheduler
                .failures()
                .iter()
                .map(|f| (f.stream, f.error.to_string()))
                .collect(),
            cancelled,
            elapsed: started.elapsed(),
        };
        info!(
            units = report.units_written(),
            failures = report.failures.len(),
            cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "session: finished"
        );
        self.report = Some(report.clone());

        outcome?;
        trailer?;
        if cancelled {
            return Err(TranscodeError::Cancelled);
        }
        if !report.failures.is_empty() {
            let summary = report
                .failures
                .iter()
                .map(|(_, message)| message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TranscodeError::LaneFailures {
                count: report.failures.len(),
                summary,
            });
        }
        Ok(report)
    }

    /// Step the scheduler until done. `Ok(false)` means cancelled.
    fn drive(&mut self) -> Result<bool> {
        loop {
            if self.cancel.is_cancelled() {
                info!("session: cancelled");
                return Ok(false);
            }
            match self.scheduler.step(&mut self.writer)? {
                Step::Finished => return Ok(true),
                Step::Stalled => thread::yield_now(),
                Step::Emitted { .. } | Step::Closed { .. } => {}
            }
        }
    }

    /// Close lanes and write the trailer, making sure a header precedes it.
    fn finalize(&mut self) -> Result<()> {
        self.scheduler.close_all();
        if !self.scheduler.header_written() {
            if let Err(e) = self.scheduler.write_header(&mut self.writer) {
                warn!(error = %e, "session: could not write header before trailer");
            }
        }
        self.writer.write_trailer()
    }
}
