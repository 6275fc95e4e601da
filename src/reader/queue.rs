//! Job seeding and the shared, sentinel-terminated work queue.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Error, Result};

/// A `(path, start, end)` slice of a file for a [`super::Reader`] to consume. `end =
/// None` means read to EOF.
#[derive(Clone, Debug)]
pub struct ReadJob {
    pub path: PathBuf,
    pub start: u64,
    pub end: Option<u64>,
}

/// Jobs to drain, shared by every worker reader. Consumed exactly once across all of
/// them: a worker that pops the sentinel puts it right back so the next worker sees
/// completion too, instead of eating it.
pub struct WorkQueue {
    jobs: Mutex<VecDeque<Option<ReadJob>>>,
}

impl WorkQueue {
    pub fn new(jobs: Vec<ReadJob>) -> Self {
        let mut queue: VecDeque<Option<ReadJob>> = jobs.into_iter().map(Some).collect();
        queue.push_back(None);
        Self { jobs: Mutex::new(queue) }
    }

    /// Remaining real jobs, not counting the sentinel.
    pub fn len(&self) -> usize {
        let guard = self.jobs.lock().unwrap();
        guard.iter().filter(|job| job.is_some()).count()
    }

    pub fn pop(&self) -> Option<ReadJob> {
        let mut guard = self.jobs.lock().unwrap();
        match guard.pop_front() {
            Some(Some(job)) => Some(job),
            Some(None) => {
                guard.push_back(None);
                None
            }
            None => None,
        }
    }
}

/// Expand a glob template into jobs, splitting each file into fixed-size chunks when
/// `root` is set and `chunk_bytes > 0`.
pub fn seed_jobs(template: &str, has_root: bool, chunk_bytes: u64) -> Result<Vec<ReadJob>> {
    let mut jobs = Vec::new();
    let entries =
        glob::glob(template).map_err(|e| Error::InvalidPathSyntax(format!("{template}: {e}")))?;

    for entry in entries {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            Error::IoOpen { path, source: e.into_error() }
        })?;

        if has_root && chunk_bytes > 0 {
            let size =
                std::fs::metadata(&path).map_err(|e| Error::IoOpen { path: path.clone(), source: e })?.len();
            let chunk_count = (size / chunk_bytes).saturating_sub(1);
            let mut start = 0u64;
            for _ in 0..chunk_count {
                let stop = start + chunk_bytes;
                jobs.push(ReadJob { path: path.clone(), start, end: Some(stop) });
                start = stop;
            }
            jobs.push(ReadJob { path, start, end: None });
        } else {
            jobs.push(ReadJob { path, start: 0, end: None });
        }
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_reobservable_by_every_worker() {
        let queue = WorkQueue::new(vec![ReadJob { path: PathBuf::from("a"), start: 0, end: None }]);
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn len_excludes_sentinel() {
        let queue = WorkQueue::new(vec![
            ReadJob { path: PathBuf::from("a"), start: 0, end: None },
            ReadJob { path: PathBuf::from("b"), start: 0, end: None },
        ]);
        assert_eq!(queue.len(), 2);
    }
}
