// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bucketed job store: one insertion-ordered map per lifecycle state.

use crate::cache::JobCache;
use crate::error::StoreError;
use gig_core::{Job, JobId, Status, StatusLookup};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Per-bucket sizes, for quick inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// The set of buckets holding every job the engine knows about.
///
/// A job lives in exactly one bucket, the one matching its status
/// (engine transitions call [`JobStore::move_job`] right after every
/// status change). Terminal buckets mirror to disk when a cache path
/// is configured.
pub struct JobStore {
    pending: IndexMap<JobId, Job>,
    running: IndexMap<JobId, Job>,
    done: IndexMap<JobId, Job>,
    failed: IndexMap<JobId, Job>,
    cancelled: IndexMap<JobId, Job>,
    cache: Option<JobCache>,
}

impl JobStore {
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        Self {
            pending: IndexMap::new(),
            running: IndexMap::new(),
            done: IndexMap::new(),
            failed: IndexMap::new(),
            cancelled: IndexMap::new(),
            cache: cache_path.map(JobCache::new),
        }
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache.as_ref().map(JobCache::root)
    }

    pub fn bucket(&self, status: Status) -> &IndexMap<JobId, Job> {
        match status {
            Status::Pending => &self.pending,
            Status::Running => &self.running,
            Status::Done => &self.done,
            Status::Failed => &self.failed,
            Status::Cancelled => &self.cancelled,
        }
    }

    fn bucket_mut(&mut self, status: Status) -> &mut IndexMap<JobId, Job> {
        match status {
            Status::Pending => &mut self.pending,
            Status::Running => &mut self.running,
            Status::Done => &mut self.done,
            Status::Failed => &mut self.failed,
            Status::Cancelled => &mut self.cancelled,
        }
    }

    /// Insert a job into the bucket matching its current status.
    pub fn add(&mut self, job: Job) -> Result<(), StoreError> {
        let status = job.status();
        if status.is_terminal() {
            self.persist(&job)?;
        }
        self.bucket_mut(status).insert(job.id().clone(), job);
        Ok(())
    }

    /// Relocate a job to the bucket matching its (already updated)
    /// status, keeping the disk mirror in sync. Re-entering `pending`
    /// (retry, rerun) lands at the tail.
    pub fn move_job(&mut self, job: &Job) -> Result<(), StoreError> {
        let id = job.id().clone();
        let target = job.status();

        let mut previous = None;
        for status in [
            Status::Pending,
            Status::Running,
            Status::Done,
            Status::Failed,
            Status::Cancelled,
        ] {
            if status != target && self.bucket_mut(status).shift_remove(&id).is_some() {
                previous = Some(status);
                break;
            }
        }

        // Leaving a terminal bucket invalidates its mirror file
        if let Some(prev) = previous.filter(Status::is_terminal) {
            if let Some(cache) = &self.cache {
                cache.remove(prev, &id)?;
            }
        }
        if target.is_terminal() {
            self.persist(job)?;
        }

        self.bucket_mut(target).insert(id, job.clone());
        Ok(())
    }

    fn persist(&self, job: &Job) -> Result<(), StoreError> {
        let snap = job.snapshot();
        if let Some(cache) = &self.cache {
            cache.write(&snap)?;
        }
        // Per-job override mirrors the snapshot into its own directory
        if let Some(dir) = job.cache_dir() {
            JobCache::new(dir).write(&snap)?;
        }
        Ok(())
    }

    /// O(buckets) union lookup.
    pub fn get_by_id(&self, id: &JobId) -> Option<Job> {
        self.iter_buckets()
            .find_map(|bucket| bucket.get(id).cloned())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.iter_buckets().any(|bucket| bucket.contains_key(id))
    }

    pub fn all_jobs(&self) -> Vec<Job> {
        self.iter_buckets()
            .flat_map(|bucket| bucket.values().cloned())
            .collect()
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            pending: self.pending.len(),
            running: self.running.len(),
            done: self.done.len(),
            failed: self.failed.len(),
            cancelled: self.cancelled.len(),
        }
    }

    pub fn non_terminal_count(&self) -> usize {
        self.pending.len() + self.running.len()
    }

    fn iter_buckets(&self) -> impl Iterator<Item = &IndexMap<JobId, Job>> {
        [
            &self.pending,
            &self.running,
            &self.done,
            &self.failed,
            &self.cancelled,
        ]
        .into_iter()
    }

    /// Drop all terminal jobs, in memory and on disk.
    pub fn clear_non_active(&mut self) -> Result<(), StoreError> {
        for status in Status::TERMINAL {
            self.bucket_mut(status).clear();
            if let Some(cache) = &self.cache {
                cache.clear_bucket(status)?;
            }
        }
        Ok(())
    }

    /// Drop every job, leaving the disk mirror untouched.
    pub fn clear_all(&mut self) {
        self.pending.clear();
        self.running.clear();
        self.done.clear();
        self.failed.clear();
        self.cancelled.clear();
    }

    /// Rebuild the terminal buckets from the cache path, replacing
    /// their in-memory contents. Fails with `Runtime` when the store
    /// was constructed without a cache path.
    pub fn update_from_cache(&mut self) -> Result<usize, StoreError> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            StoreError::runtime("cache read attempted on a store with no cache path")
        })?;

        let mut loaded = 0;
        for status in Status::TERMINAL {
            let snapshots = cache.read_bucket(status)?;
            let bucket = match status {
                Status::Done => &mut self.done,
                Status::Failed => &mut self.failed,
                _ => &mut self.cancelled,
            };
            bucket.clear();
            for snap in snapshots {
                let job = Job::from_snapshot(snap);
                bucket.insert(job.id().clone(), job);
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

impl StatusLookup for JobStore {
    fn status_of(&self, id: &JobId) -> Option<Status> {
        self.get_by_id(id).map(|job| job.status())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
