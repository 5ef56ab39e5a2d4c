//! Observability hooks called by the pipeline at fixed points.
//!
//! Every hook has an empty default body, so `NoopLogger` is a valid stand-in
//! anywhere. `TracingLogger` emits the same information as `tracing` events.

use crate::cleaner::StageCounts;
use crate::grouper::User;
use crate::identifier::IdentifierSet;
use crate::RegroupError;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info};

pub trait PreprocessingLogger: Send + Sync {
    fn init(&self, _workers: usize, _dir_in: &Path, _dir_merged: &Path, _dir_out: &Path) {}

    fn reading_ids(&self, _total: usize) {}
    fn start_worker_read_ids(&self, _worker_id: usize) {}
    fn read_ids(&self, _worker_id: usize, _archive: &Path) {}
    fn stop_worker_read_ids(&self, _worker_id: usize) {}

    fn group_archives_by_ids(&self) {}

    fn merge_groups(&self, _total: usize) {}
    fn start_worker_merge_group(&self, _worker_id: usize) {}
    fn merge_group(&self, _worker_id: usize, _group_size: usize) {}
    fn stop_worker_merge_group(&self, _worker_id: usize) {}

    fn cleaning(&self, _total: usize) {}
    fn start_worker_clean_archive(&self, _worker_id: usize) {}
    fn clean_archive(&self, _worker_id: usize, _archive: &Path) {}
    fn stop_worker_clean_archive(&self, _worker_id: usize) {}

    fn error(&self, _worker_id: usize, _item: &str, _error: &RegroupError) {}
}

pub trait GrouperLogger: Send + Sync {
    fn init(&self) {}
    fn archives(&self, _archives: &[(&Path, &IdentifierSet)]) {}
    fn users(&self, _users: &[User]) {}
}

pub trait CleanerLogger: Send + Sync {
    fn working_in(&self, _dir_merged: &Path, _dir_out: &Path) {}
    fn registered_filters(&self, _names: &[String]) {}
    fn reading_archive(&self, _archive: &Path) {}
    fn writing_events(&self) {}
    fn finished_writing(&self, _counts: &StageCounts) {}
}

/// Ignores every hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl PreprocessingLogger for NoopLogger {}
impl GrouperLogger for NoopLogger {}
impl CleanerLogger for NoopLogger {}

/// Forwards every hook to `tracing`, numbering items as they are started.
#[derive(Debug, Default)]
pub struct TracingLogger {
    total: AtomicUsize,
    started: AtomicUsize,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin_phase(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.started.store(0, Ordering::SeqCst);
    }

    /// Returns "i/n (x% started)" for the next started item.
    fn next_progress(&self) -> String {
        let current = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        progress_label(current, total)
    }
}

fn progress_label(current: usize, total: usize) -> String {
    if total == 0 {
        return format!("{}/?", current);
    }
    let percent = current as f64 * 100.0 / total as f64;
    if total >= 1000 {
        format!("{}/{} ({:.2}% started)", current, total, percent)
    } else {
        format!("{}/{} ({:.1}% started)", current, total, percent)
    }
}

impl PreprocessingLogger for TracingLogger {
    fn init(&self, workers: usize, dir_in: &Path, dir_merged: &Path, dir_out: &Path) {
        info!("[preprocessing] ========================================");
        info!("[preprocessing] Starting preprocessing");
        info!("[preprocessing] workers: {}", workers);
        info!("[preprocessing] input:   {}", dir_in.display());
        info!("[preprocessing] merged:  {}", dir_merged.display());
        info!("[preprocessing] final:   {}", dir_out.display());
        info!("[preprocessing] ========================================");
    }

    fn reading_ids(&self, total: usize) {
        self.begin_phase(total);
        info!("[preprocessing] Reading ids from {} archives", total);
    }

    fn start_worker_read_ids(&self, worker_id: usize) {
        debug!("[preprocessing] ({}) Starting worker", worker_id);
    }

    fn read_ids(&self, worker_id: usize, archive: &Path) {
        info!(
            "[preprocessing] ({}) Reading archive {}: {}",
            worker_id,
            self.next_progress(),
            archive.display()
        );
    }

    fn stop_worker_read_ids(&self, worker_id: usize) {
        debug!("[preprocessing] ({}) Stopping worker", worker_id);
    }

    fn group_archives_by_ids(&self) {
        info!("[preprocessing] Grouping archives by ids");
    }

    fn merge_groups(&self, total: usize) {
        self.begin_phase(total);
        info!("[preprocessing] Merging {} groups", total);
    }

    fn start_worker_merge_group(&self, worker_id: usize) {
        debug!("[preprocessing] ({}) Starting worker", worker_id);
    }

    fn merge_group(&self, worker_id: usize, group_size: usize) {
        info!(
            "[preprocessing] ({}) Merging group {}, contains {} archives",
            worker_id,
            self.next_progress(),
            group_size
        );
    }

    fn stop_worker_merge_group(&self, worker_id: usize) {
        debug!("[preprocessing] ({}) Stopping worker", worker_id);
    }

    fn cleaning(&self, total: usize) {
        self.begin_phase(total);
        info!("[preprocessing] Cleaning {} archives", total);
    }

    fn start_worker_clean_archive(&self, worker_id: usize) {
        debug!("[preprocessing] ({}) Starting worker", worker_id);
    }

    fn clean_archive(&self, worker_id: usize, archive: &Path) {
        info!(
            "[preprocessing] ({}) Cleaning archive {}: {}",
            worker_id,
            self.next_progress(),
            archive.display()
        );
    }

    fn stop_worker_clean_archive(&self, worker_id: usize) {
        debug!("[preprocessing] ({}) Stopping worker", worker_id);
    }

    fn error(&self, worker_id: usize, item: &str, err: &RegroupError) {
        error!(
            "[preprocessing] exception for worker {} while processing {}: {}",
            worker_id, item, err
        );
    }
}

impl GrouperLogger for TracingLogger {
    fn init(&self) {
        info!("[grouper] Grouping archives by overlapping identifiers");
    }

    fn archives(&self, archives: &[(&Path, &IdentifierSet)]) {
        let total_ids: usize = archives.iter().map(|(_, ids)| ids.len()).sum();
        info!(
            "[grouper] {} archives with {} identifiers in total",
            archives.len(),
            total_ids
        );
        for (archive, ids) in archives {
            debug!("[grouper] {}: {} identifiers", archive.display(), ids.len());
        }
    }

    fn users(&self, users: &[User]) {
        info!("[grouper] Found {} users", users.len());
        for user in users {
            debug!(
                "[grouper] user with {} archives, {} identifiers",
                user.archives.len(),
                user.identifiers.len()
            );
        }
    }
}

impl CleanerLogger for TracingLogger {
    fn working_in(&self, dir_merged: &Path, dir_out: &Path) {
        debug!(
            "[cleaner] Reading from {}, writing to {}",
            dir_merged.display(),
            dir_out.display()
        );
    }

    fn registered_filters(&self, names: &[String]) {
        if names.is_empty() {
            debug!("[cleaner] No filters registered");
        }
        for name in names {
            debug!("[cleaner] Registered filter: {}", name);
        }
    }

    fn reading_archive(&self, archive: &Path) {
        debug!("[cleaner] Reading {}", archive.display());
    }

    fn writing_events(&self) {
        debug!("[cleaner] Writing events");
    }

    fn finished_writing(&self, counts: &StageCounts) {
        for (stage, count) in counts.iter() {
            debug!("[cleaner] {:>8} events {}", count, stage);
        }
    }
}

/// Installs a `fmt` subscriber honouring `RUST_LOG` (default `info`).
/// Calling it more than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
