//! Background export
//!
//! A single worker thread takes export jobs one at a time, renders each through
//! its rack snapshot and writes the WAV file. Results come back on a channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{error, info};
use uuid::Uuid;

use super::offline::{render_with_cancel, RenderSummary};
use crate::engine::buffer::AudioBuffer;
use crate::engine::io::{export_audio, ExportFormat};
use crate::error::{RackError, Result};
use crate::rack::RackSnapshot;

/// Work for the export thread
#[derive(Debug)]
pub struct ExportJob {
    pub id: Uuid,
    pub source: Arc<AudioBuffer>,
    pub snapshot: Arc<RackSnapshot>,
    pub destination: PathBuf,
    pub format: ExportFormat,
    pub block_size: usize,
    cancel: Arc<AtomicBool>,
}

/// Caller's handle on a submitted job
#[derive(Debug, Clone)]
pub struct ExportHandle {
    pub id: Uuid,
    cancel: Arc<AtomicBool>,
}

impl ExportHandle {
    /// Ask the worker to stop at the next block boundary
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Outcome of one job
#[derive(Debug)]
pub struct ExportResult {
    pub id: Uuid,
    pub destination: PathBuf,
    pub finished_at: DateTime<Utc>,
    pub outcome: Result<RenderSummary>,
}

/// Owns the export thread; dropping it finishes queued jobs and joins
#[derive(Debug)]
pub struct ExportWorker {
    jobs: Option<Sender<ExportJob>>,
    results: Receiver<ExportResult>,
    thread: Option<JoinHandle<()>>,
}

impl ExportWorker {
    pub fn spawn() -> Result<Self> {
        let (job_tx, job_rx) = unbounded::<ExportJob>();
        let (result_tx, result_rx) = unbounded();

        let thread = std::thread::Builder::new()
            .name("sonic-rack-export".to_string())
            .spawn(move || {
                for job in job_rx {
                    let result = run_job(&job);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            thread: Some(thread),
        })
    }

    /// Queue an export; jobs run strictly one after another
    pub fn submit(
        &self,
        source: Arc<AudioBuffer>,
        snapshot: Arc<RackSnapshot>,
        destination: PathBuf,
        format: ExportFormat,
        block_size: usize,
    ) -> Result<ExportHandle> {
        let cancel = Arc::new(AtomicBool::new(false));
        let job = ExportJob {
            id: Uuid::new_v4(),
            source,
            snapshot,
            destination,
            format,
            block_size,
            cancel: Arc::clone(&cancel),
        };
        let handle = ExportHandle { id: job.id, cancel };

        info!(id = %job.id, destination = %job.destination.display(), "export queued");
        self.jobs
            .as_ref()
            .ok_or(RackError::ChannelClosed { what: "export jobs" })?
            .send(job)
            .map_err(|_| RackError::ChannelClosed { what: "export jobs" })?;
        Ok(handle)
    }

    /// A finished result, if one is waiting
    pub fn try_result(&self) -> Option<ExportResult> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for the next result
    pub fn wait_result(&self, timeout: Duration) -> Result<Option<ExportResult>> {
        match self.results.recv_timeout(timeout) {
            Ok(result) => Ok(Some(result)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RackError::ChannelClosed {
                what: "export results",
            }),
        }
    }
}

impl Drop for ExportWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("export thread panicked");
            }
        }
    }
}

fn run_job(job: &ExportJob) -> ExportResult {
    let outcome = render_with_cancel(&job.source, &job.snapshot, job.block_size, &job.cancel)
        .and_then(|output| {
            export_audio(&output.buffer, &job.destination, job.format)?;
            Ok(RenderSummary::from(&output))
        });

    match &outcome {
        Ok(summary) => info!(
            id = %job.id,
            destination = %job.destination.display(),
            digest = %summary.digest,
            "export finished"
        ),
        Err(err) => error!(id = %job.id, code = err.error_code(), error = %err, "export failed"),
    }

    ExportResult {
        id: job.id,
        destination: job.destination.clone(),
        finished_at: Utc::now(),
        outcome,
    }
}
