// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk mirror of the terminal buckets.
//!
//! Layout: one `<job_id>.json` snapshot per terminal job under
//! `<root>/<bucket>/`, plus a per-bucket `index.json` enumerating ids
//! for cheap listing. Reconstruction scans the snapshot files and
//! tolerates missing or corrupt entries.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use gig_core::{JobId, JobSnapshot, Status};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.json";

/// Per-bucket listing written next to the snapshot files.
#[derive(Debug, Serialize, Deserialize)]
struct BucketIndex {
    written_at: DateTime<Utc>,
    ids: Vec<JobId>,
}

/// Filesystem half of the job store.
#[derive(Debug, Clone)]
pub struct JobCache {
    root: PathBuf,
}

impl JobCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, status: Status) -> PathBuf {
        self.root.join(status.to_string())
    }

    fn snapshot_path(&self, status: Status, id: &JobId) -> PathBuf {
        self.bucket_dir(status).join(format!("{id}.json"))
    }

    /// Write one job's snapshot into its bucket directory and refresh
    /// the bucket index.
    pub fn write(&self, snap: &JobSnapshot) -> Result<(), StoreError> {
        let dir = self.bucket_dir(snap.status);
        fs::create_dir_all(&dir)?;
        let body = serde_json::to_vec_pretty(snap)?;
        fs::write(self.snapshot_path(snap.status, &snap.id), body)?;
        self.rewrite_index(snap.status)?;
        Ok(())
    }

    /// Remove one job's snapshot, if present.
    pub fn remove(&self, status: Status, id: &JobId) -> Result<(), StoreError> {
        let path = self.snapshot_path(status, id);
        match fs::remove_file(&path) {
            Ok(()) => self.rewrite_index(status),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids currently mirrored for a bucket, from the index file when
    /// present, falling back to a directory scan.
    pub fn ids(&self, status: Status) -> Result<Vec<JobId>, StoreError> {
        let index_path = self.bucket_dir(status).join(INDEX_FILE);
        if let Ok(body) = fs::read(&index_path) {
            if let Ok(index) = serde_json::from_slice::<BucketIndex>(&body) {
                return Ok(index.ids);
            }
            tracing::warn!(path = %index_path.display(), "unreadable bucket index, rescanning");
        }
        Ok(self.scan_ids(status)?)
    }

    /// Load every readable snapshot in a bucket. Corrupt or
    /// unreadable files are logged and skipped; they never abort
    /// reconstruction.
    pub fn read_bucket(&self, status: Status) -> Result<Vec<JobSnapshot>, StoreError> {
        let dir = self.bucket_dir(status);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_snapshot = path.extension().is_some_and(|ext| ext == "json")
                && path.file_name().is_some_and(|name| name != INDEX_FILE);
            if is_snapshot {
                paths.push(path);
            }
        }
        paths.sort();

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            match fs::read(&path) {
                Ok(body) => match serde_json::from_slice::<JobSnapshot>(&body) {
                    Ok(snap) if snap.status == status => out.push(snap),
                    Ok(snap) => {
                        tracing::warn!(
                            path = %path.display(),
                            status = %snap.status,
                            bucket = %status,
                            "snapshot status does not match its bucket, skipping"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "corrupt snapshot, skipping");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable snapshot, skipping");
                }
            }
        }
        Ok(out)
    }

    /// Delete every mirrored snapshot (and index) for a bucket.
    pub fn clear_bucket(&self, status: Status) -> Result<(), StoreError> {
        let dir = self.bucket_dir(status);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn scan_ids(&self, status: Status) -> Result<Vec<JobId>, std::io::Error> {
        let dir = self.bucket_dir(status);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if stem != "index" {
                        ids.push(JobId::new(stem));
                    }
                }
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    fn rewrite_index(&self, status: Status) -> Result<(), StoreError> {
        let ids = self.scan_ids(status)?;
        let dir = self.bucket_dir(status);
        fs::create_dir_all(&dir)?;
        let index = BucketIndex { written_at: Utc::now(), ids };
        fs::write(dir.join(INDEX_FILE), serde_json::to_vec_pretty(&index)?)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
