//! Content-based duplicate scan.
//!
//! # Overview
//!
//! [`DuplicateGrouper`] fetches the bytes of every candidate asset, computes
//! its [`Fingerprint`], and groups assets whose fingerprints are equal.
//!
//! Fetching runs on a dedicated rayon pool bounded by `io_threads`. Each
//! worker folds its results into a local map; a single reduce step merges
//! the maps, so workers never contend on a shared lock. Members of a group
//! are then ordered by their position in the input, which makes the survivor
//! independent of which worker finished first.
//!
//! A failed or timed-out fetch excludes that asset from the run and is
//! recorded in [`GroupingStats`]; it never aborts the scan.
//!
//! # Fetch timeouts
//!
//! A backend call cannot be interrupted, so a timed-out fetch keeps its
//! thread until the backend returns. At most
//! [`GrouperConfig::max_stalled_fetches`] such threads may be outstanding
//! per grouper; beyond that, fetches fail fast with
//! [`FetchError::Unavailable`] until stalled ones finish.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;

use super::DuplicateGroup;
use crate::backend::{AssetBackend, AssetId, FetchError};
use crate::cancel::CancelToken;
use crate::config::{TriageConfig, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_IO_THREADS};
use crate::decisions::DecisionStore;
use crate::fingerprint::Fingerprint;
use crate::progress::{ProgressCallback, PHASE_FINGERPRINT};

/// Errors that abort a scan as a whole.
#[derive(thiserror::Error, Debug)]
pub enum GroupError {
    /// The scan was cancelled; partial results were discarded.
    #[error("Duplicate scan cancelled")]
    Cancelled,

    /// The worker pool could not be created.
    #[error("Failed to build fingerprint thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Default cap on fetch threads still running after their timeout.
pub const DEFAULT_MAX_STALLED_FETCHES: usize = 16;

/// Scan settings.
pub struct GrouperConfig {
    /// Number of concurrent fetch workers.
    pub io_threads: usize,
    /// Per-asset fetch timeout; `None` waits indefinitely.
    ///
    /// Each timed fetch runs on its own thread, which outlives the timeout
    /// if the backend stalls. See `max_stalled_fetches`.
    pub fetch_timeout: Option<Duration>,
    /// Fetch threads allowed to linger past their timeout before new
    /// fetches are refused.
    pub max_stalled_fetches: usize,
    /// Optional cancellation token.
    pub cancel: Option<CancelToken>,
    /// Optional progress reporter.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for GrouperConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrouperConfig")
            .field("io_threads", &self.io_threads)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("max_stalled_fetches", &self.max_stalled_fetches)
            .field("cancel", &self.cancel)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            io_threads: DEFAULT_IO_THREADS,
            fetch_timeout: Some(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)),
            max_stalled_fetches: DEFAULT_MAX_STALLED_FETCHES,
            cancel: None,
            progress_callback: None,
        }
    }
}

impl From<&TriageConfig> for GrouperConfig {
    fn from(config: &TriageConfig) -> Self {
        Self::default()
            .with_io_threads(config.io_threads)
            .with_fetch_timeout(config.fetch_timeout())
    }
}

impl GrouperConfig {
    /// Set the number of fetch workers (minimum 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the per-asset fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set how many timed-out fetch threads may be outstanding (minimum 1).
    #[must_use]
    pub fn with_max_stalled_fetches(mut self, limit: usize) -> Self {
        self.max_stalled_fetches = limit.max(1);
        self
    }

    /// Set the cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set the progress reporter.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Counters for one scan.
#[derive(Debug, Clone, Default)]
pub struct GroupingStats {
    /// Assets handed to the scan
    pub input_assets: usize,
    /// Assets skipped because they were excluded or listed twice
    pub excluded_assets: usize,
    /// Assets whose fingerprint was computed
    pub fingerprinted: usize,
    /// Assets whose bytes could not be fetched (timeouts included)
    pub failed: usize,
    /// Subset of `failed` that hit the fetch timeout
    pub timed_out: usize,
    /// Groups with two or more members
    pub duplicate_groups: usize,
    /// Group members other than the survivors
    pub duplicate_assets: usize,
    /// Every fetch failure, in no particular order
    pub errors: Vec<FetchError>,
}

/// Output of a scan.
#[derive(Debug, Clone, Default)]
pub struct GroupingReport {
    /// Duplicate groups, ordered by the input position of their survivor
    pub groups: Vec<DuplicateGroup>,
    /// Scan counters
    pub stats: GroupingStats,
}

impl GroupingReport {
    /// Whether the scan found no duplicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every member that a merge would delete.
    pub fn deletion_candidates(&self) -> impl Iterator<Item = &AssetId> {
        self.groups
            .iter()
            .flat_map(|group| group.deletion_candidates().iter())
    }
}

/// Per-worker partial result.
#[derive(Default)]
struct ScanAccumulator {
    buckets: HashMap<Fingerprint, Vec<(usize, AssetId)>>,
    fingerprinted: usize,
    errors: Vec<FetchError>,
}

impl ScanAccumulator {
    fn merge(mut self, mut other: Self) -> Self {
        if self.buckets.len() < other.buckets.len() {
            std::mem::swap(&mut self, &mut other);
        }
        for (fingerprint, members) in other.buckets {
            self.buckets.entry(fingerprint).or_default().extend(members);
        }
        self.fingerprinted += other.fingerprinted;
        self.errors.extend(other.errors);
        self
    }
}

/// Groups assets by content fingerprint.
pub struct DuplicateGrouper {
    backend: Arc<dyn AssetBackend>,
    config: GrouperConfig,
    /// Timed-out fetch threads that have not returned yet
    stalled_fetches: Arc<AtomicUsize>,
}

const FETCH_RUNNING: u8 = 0;
const FETCH_DONE: u8 = 1;
const FETCH_ABANDONED: u8 = 2;

impl std::fmt::Debug for DuplicateGrouper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateGrouper")
            .field("backend", &"<backend>")
            .field("config", &self.config)
            .field("stalled_fetches", &self.stalled_fetches.load(Ordering::Relaxed))
            .finish()
    }
}

impl DuplicateGrouper {
    /// Create a grouper reading from `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn AssetBackend>, config: GrouperConfig) -> Self {
        Self {
            backend,
            config,
            stalled_fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Scan the assets that have no decision yet.
    ///
    /// # Errors
    ///
    /// See [`group`](Self::group).
    pub fn group_undecided(
        &self,
        assets: &[AssetId],
        store: &DecisionStore,
    ) -> Result<GroupingReport, GroupError> {
        let decided: BTreeSet<AssetId> = store.kept().union(store.deleted()).cloned().collect();
        self.group(assets, &decided)
    }

    /// Group `assets` by content, skipping everything in `excluding`.
    ///
    /// The survivor of each group is its member that appears first in
    /// `assets`. Fetch failures are counted in the stats and do not fail the
    /// scan.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if the cancellation token was set during the scan
    /// - `ThreadPool` if the worker pool could not be created
    pub fn group(
        &self,
        assets: &[AssetId],
        excluding: &BTreeSet<AssetId>,
    ) -> Result<GroupingReport, GroupError> {
        let mut stats = GroupingStats {
            input_assets: assets.len(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        let candidates: Vec<&AssetId> = assets
            .iter()
            .filter(|id| !excluding.contains(*id) && seen.insert(*id))
            .collect();
        stats.excluded_assets = assets.len() - candidates.len();

        if candidates.is_empty() {
            log::debug!("Duplicate scan: no candidate assets");
            return Ok(GroupingReport {
                groups: Vec::new(),
                stats,
            });
        }

        log::info!(
            "Fingerprinting {} asset(s) ({} excluded)",
            candidates.len(),
            stats.excluded_assets
        );
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_FINGERPRINT, candidates.len());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.io_threads)
            .thread_name(|i| format!("phototriage-fingerprint-{}", i))
            .build()?;

        let completed = AtomicUsize::new(0);
        let scanned = pool.install(|| {
            candidates
                .par_iter()
                .enumerate()
                .fold(ScanAccumulator::default, |mut acc, (index, id)| {
                    if self.config.is_cancelled() {
                        return acc;
                    }
                    match self.fetch(id) {
                        Ok(bytes) => {
                            let fingerprint = Fingerprint::of(&bytes);
                            log::trace!("Fingerprinted {}: {}", id, fingerprint);
                            acc.buckets
                                .entry(fingerprint)
                                .or_default()
                                .push((index, (*id).clone()));
                            acc.fingerprinted += 1;
                        }
                        Err(e) => {
                            log::warn!("Skipping {}: {}", id, e);
                            acc.errors.push(e);
                        }
                    }
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref callback) = self.config.progress_callback {
                        callback.on_progress(done, id.as_str());
                    }
                    acc
                })
                .reduce(ScanAccumulator::default, ScanAccumulator::merge)
        });

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_FINGERPRINT);
        }

        if self.config.is_cancelled() {
            log::info!(
                "Duplicate scan cancelled after {} of {} asset(s)",
                completed.load(Ordering::Relaxed),
                candidates.len()
            );
            return Err(GroupError::Cancelled);
        }

        let mut ordered: Vec<(usize, DuplicateGroup)> = scanned
            .buckets
            .into_iter()
            .filter_map(|(fingerprint, mut members)| {
                members.sort_unstable_by_key(|(index, _)| *index);
                let first = members.first().map(|(index, _)| *index)?;
                let ids = members.into_iter().map(|(_, id)| id).collect();
                DuplicateGroup::new(fingerprint, ids).map(|group| (first, group))
            })
            .collect();
        ordered.sort_unstable_by_key(|(first, _)| *first);
        let groups: Vec<DuplicateGroup> = ordered.into_iter().map(|(_, group)| group).collect();

        stats.fingerprinted = scanned.fingerprinted;
        stats.failed = scanned.errors.len();
        stats.timed_out = scanned.errors.iter().filter(|e| e.is_timeout()).count();
        stats.errors = scanned.errors;
        stats.duplicate_groups = groups.len();
        stats.duplicate_assets = groups.iter().map(|g| g.len() - 1).sum();

        for group in &groups {
            log::debug!(
                "Duplicate group {}: {} asset(s), survivor {}",
                group.fingerprint(),
                group.len(),
                group.survivor()
            );
        }
        log::info!(
            "Duplicate scan complete: {} group(s), {} duplicate(s), {} failed",
            stats.duplicate_groups,
            stats.duplicate_assets,
            stats.failed
        );

        Ok(GroupingReport { groups, stats })
    }

    /// Fetch with the configured timeout.
    ///
    /// The backend call runs on a detached thread; on timeout the result is
    /// abandoned and the thread finishes on its own. While
    /// `max_stalled_fetches` abandoned threads are still running, further
    /// fetches are refused.
    fn fetch(&self, id: &AssetId) -> Result<Vec<u8>, FetchError> {
        let Some(timeout) = self.config.fetch_timeout else {
            return self.backend.fetch_bytes(id);
        };

        let stalled = self.stalled_fetches.load(Ordering::SeqCst);
        if stalled >= self.config.max_stalled_fetches.max(1) {
            log::warn!("Not fetching {}: {} earlier fetch(es) still stalled", id, stalled);
            return Err(FetchError::Unavailable {
                id: id.clone(),
                message: format!("{} stalled fetch(es) still running", stalled),
            });
        }

        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let target = id.clone();
        let state = Arc::new(AtomicU8::new(FETCH_RUNNING));
        let thread_state = Arc::clone(&state);
        let stalled_fetches = Arc::clone(&self.stalled_fetches);
        thread::Builder::new()
            .name("phototriage-fetch".to_string())
            .spawn(move || {
                // Receiver is gone if the fetch already timed out.
                let _ = tx.send(backend.fetch_bytes(&target));
                if thread_state
                    .compare_exchange(FETCH_RUNNING, FETCH_DONE, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    stalled_fetches.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .map_err(|e| FetchError::Io {
                id: id.clone(),
                source: Arc::new(e),
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                // Count before abandoning so the thread's decrement never
                // runs ahead of it.
                self.stalled_fetches.fetch_add(1, Ordering::SeqCst);
                if state
                    .compare_exchange(
                        FETCH_RUNNING,
                        FETCH_ABANDONED,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_err()
                {
                    // Finished right at the deadline.
                    self.stalled_fetches.fetch_sub(1, Ordering::SeqCst);
                    if let Ok(result) = rx.try_recv() {
                        return result;
                    }
                }
                Err(FetchError::TimedOut {
                    id: id.clone(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(FetchError::Unavailable {
                id: id.clone(),
                message: "fetch worker exited without a result".to_string(),
            }),
        }
    }
}
