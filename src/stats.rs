//! Run statistics for the `-info` summary line: chunk/entity/row counts, worker count,
//! and congestion, captured the way a small `Timer`-style helper would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Accumulates counts across every worker, plus a running "clog" average (`qsize /
/// capacity`, one sample per produced entity) used to gauge output-queue congestion.
pub struct RunStats {
    started: Instant,
    docs: AtomicU64,
    entities: AtomicU64,
    rows: AtomicU64,
    clog_samples: AtomicU64,
    clog_total_millis: AtomicU64,
    workers: usize,
}

impl RunStats {
    pub fn new(workers: usize) -> Self {
        Self {
            started: Instant::now(),
            docs: AtomicU64::new(0),
            entities: AtomicU64::new(0),
            rows: AtomicU64::new(0),
            clog_samples: AtomicU64::new(0),
            clog_total_millis: AtomicU64::new(0),
            workers,
        }
    }

    pub fn record_chunk(&self) {
        self.docs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity(&self, rows_emitted: usize) {
        self.entities.fetch_add(1, Ordering::Relaxed);
        self.rows.fetch_add(rows_emitted as u64, Ordering::Relaxed);
    }

    /// Record one congestion sample: `qsize / capacity`, scaled to milli-fractions so
    /// the running total stays an integer.
    pub fn record_clog(&self, qsize: usize, capacity: usize) {
        if capacity == 0 {
            return;
        }
        let milli = (qsize as u64 * 1000) / capacity as u64;
        self.clog_total_millis.fetch_add(milli, Ordering::Relaxed);
        self.clog_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn clog_percent(&self) -> f64 {
        let samples = self.clog_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        let total = self.clog_total_millis.load(Ordering::Relaxed);
        (total as f64 / samples as f64) / 10.0
    }

    /// Render the `-info` summary block described in the external-interface docs.
    pub fn summary(&self) -> String {
        format!(
            "docs {}\npyml {}\nrows {}\nproc {}\nclog {:.1}%\ntime {:.3}s",
            self.docs.load(Ordering::Relaxed),
            self.entities.load(Ordering::Relaxed),
            self.rows.load(Ordering::Relaxed),
            self.workers,
            self.clog_percent(),
            self.started.elapsed().as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_across_calls() {
        let stats = RunStats::new(4);
        stats.record_chunk();
        stats.record_chunk();
        stats.record_entity(3);
        stats.record_entity(2);
        let summary = stats.summary();
        assert!(summary.contains("docs 2"));
        assert!(summary.contains("pyml 2"));
        assert!(summary.contains("rows 5"));
        assert!(summary.contains("proc 4"));
    }

    #[test]
    fn clog_percent_averages_samples() {
        let stats = RunStats::new(1);
        stats.record_clog(1, 4);
        stats.record_clog(3, 4);
        assert!(stats.summary().contains("clog 50.0%"));
    }
}
