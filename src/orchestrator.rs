//! Fans a glob of input files out across a pool of worker threads, each streaming
//! entities with its own [`Reader`], evaluating the shared [`Schema`] against them, and
//! pushing row batches onto a bounded channel a single writer drains to the sink.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;

use encoding_rs::Encoding;
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::path::{PathEngine, PathNode, Schema, TableEmitter};
use crate::reader::{ReadJob, Reader, WorkQueue};
use crate::stats::RunStats;

/// Shared "how many row batches are sitting in the channel right now" counter, since
/// `std::sync::mpsc` exposes no way to query a channel's current length directly.
type Queued = Arc<AtomicUsize>;

/// The pieces of `-mp`/`-root`/`-chunk`/`-encoding` the orchestrator needs once the CLI
/// has already resolved a script into jobs and a compiled schema.
pub struct OrchestratorConfig {
    pub root_pattern: Option<String>,
    pub encoding: &'static Encoding,
    /// Negative or zero means `cpu_count + value`, floored at 1.
    pub workers: i64,
}

impl OrchestratorConfig {
    pub fn resolved_workers(&self) -> usize {
        if self.workers <= 0 {
            let cpus = std::thread::available_parallelism().map(|n| n.get() as i64).unwrap_or(1);
            (cpus + self.workers).max(1) as usize
        } else {
            self.workers as usize
        }
    }
}

enum Message {
    Rows(Vec<String>),
    WorkerDone,
    Fatal(Error),
}

pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Run every job to completion, writing the header then every produced row (in
    /// per-entity order, arbitrary order across entities) to `sink`.
    pub fn run(
        &self,
        jobs: Vec<ReadJob>,
        schema: &Schema,
        tree: &[PathNode],
        mut sink: impl Write,
    ) -> Result<RunStats> {
        let worker_count = self.config.resolved_workers();
        let stats = RunStats::new(worker_count);
        let queue = Arc::new(WorkQueue::new(jobs));
        let capacity = (4 * worker_count).max(1);
        let (tx, rx) = sync_channel::<Message>(capacity);
        let queued: Queued = Arc::new(AtomicUsize::new(0));

        writeln!(sink, "{}", schema.template().output_header()).map_err(io_write_error)?;

        std::thread::scope(|scope| {
            for id in 0..worker_count {
                let queue = Arc::clone(&queue);
                let tx: SyncSender<Message> = tx.clone();
                let root_pattern = self.config.root_pattern.clone();
                let encoding = self.config.encoding;
                let stats = &stats;
                let queued = Arc::clone(&queued);
                scope.spawn(move || {
                    worker_loop(id, queue, root_pattern, encoding, schema, tree, &tx, stats, queued);
                });
            }
            drop(tx);

            let mut done_workers = 0usize;
            let mut first_error: Option<Error> = None;
            while done_workers < worker_count {
                match rx.recv() {
                    Ok(Message::Rows(rows)) => {
                        let still_queued = queued.fetch_sub(1, Ordering::Relaxed) - 1;
                        stats.record_clog(still_queued, capacity);
                        for row in rows {
                            if let Err(e) = writeln!(sink, "{row}") {
                                if first_error.is_none() {
                                    first_error = Some(io_write_error(e));
                                }
                            }
                        }
                    }
                    Ok(Message::WorkerDone) => done_workers += 1,
                    Ok(Message::Fatal(e)) => {
                        warn!("worker reported a fatal error: {e}");
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                        done_workers += 1;
                    }
                    Err(_) => break,
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })?;

        Ok(stats)
    }
}

fn io_write_error(source: std::io::Error) -> Error {
    Error::IoWrite { source }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    id: usize,
    queue: Arc<WorkQueue>,
    root_pattern: Option<String>,
    encoding: &'static Encoding,
    schema: &Schema,
    tree: &[PathNode],
    tx: &SyncSender<Message>,
    stats: &RunStats,
    queued: Queued,
) {
    let mut reader = Reader::new(Arc::clone(&queue), root_pattern, encoding);
    let emitter = TableEmitter::new(schema.template());

    loop {
        let entity = match reader.next() {
            Ok(Some(entity)) => entity,
            Ok(None) => break,
            Err(e) => {
                warn!("worker {id} stopped reading: {e}");
                let _ = tx.send(Message::Fatal(e));
                break;
            }
        };

        stats.record_chunk();
        let mut entity = entity;
        let block = match PathEngine::evaluate(&mut entity, tree) {
            Ok(block) => block,
            Err(e) => {
                debug!("worker {id} skipped an entity: {e}");
                continue;
            }
        };

        let rows = emitter.output_data(&block);
        stats.record_entity(rows.len());
        if !rows.is_empty() {
            queued.fetch_add(1, Ordering::Relaxed);
            if tx.send(Message::Rows(rows)).is_err() {
                break;
            }
        }
    }

    let _ = tx.send(Message::WorkerDone);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_workers_floors_at_one() {
        let config = OrchestratorConfig { root_pattern: None, encoding: encoding_rs::UTF_8, workers: -1000 };
        assert_eq!(config.resolved_workers(), 1);
    }

    #[test]
    fn positive_worker_count_passes_through() {
        let config = OrchestratorConfig { root_pattern: None, encoding: encoding_rs::UTF_8, workers: 3 };
        assert_eq!(config.resolved_workers(), 3);
    }
}
