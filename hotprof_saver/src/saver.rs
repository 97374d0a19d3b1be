//! Profile saver
//!
//! Flushes tracker state for every registered application into its current
//! profile file. Each save merges with the file already on disk and replaces
//! it atomically.

use crate::tracker::MethodHotnessTracker;
use hotprof_core::serializer::{self, ProfileContents};
use hotprof_core::{AppRegistration, CodeLocationRegistry, ProfileSnapshot, Result, SaverConfig};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;
use tokio::sync::Notify;

/// Why a save cycle runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    /// Explicit request; always writes
    Forced,
    /// Background timer or wakeup; may skip when little changed
    Periodic,
    /// Final flush when the background task stops
    Shutdown,
}

/// Result of saving one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The profile file was replaced
    Written {
        methods: usize,
        new_methods: usize,
        bytes: usize,
        boot_image: bool,
    },
    /// Too few new methods for a background save
    Skipped { new_methods: usize },
}

/// Per-cycle counts over all applications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Running saver statistics
#[derive(Debug, Default)]
pub struct SaverStats {
    cycles: AtomicU64,
    files_written: AtomicU64,
    bytes_written: AtomicU64,
    skipped_saves: AtomicU64,
    failed_saves: AtomicU64,
    timed_out_cycles: AtomicU64,
}

/// Point-in-time copy of [`SaverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaverStatsSnapshot {
    pub cycles: u64,
    pub files_written: u64,
    pub bytes_written: u64,
    pub skipped_saves: u64,
    pub failed_saves: u64,
    pub timed_out_cycles: u64,
}

impl SaverStats {
    pub fn snapshot(&self) -> SaverStatsSnapshot {
        SaverStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            files_written: self.files_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            skipped_saves: self.skipped_saves.load(Ordering::Relaxed),
            failed_saves: self.failed_saves.load(Ordering::Relaxed),
            timed_out_cycles: self.timed_out_cycles.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_timeout(&self) {
        self.timed_out_cycles.fetch_add(1, Ordering::Relaxed);
    }
}

/// Writes tracker state to profile files
pub struct ProfileSaver {
    registry: Arc<CodeLocationRegistry>,
    tracker: Arc<MethodHotnessTracker>,
    config: SaverConfig,
    /// One lock per application so only one save per file is in flight
    app_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: SaverStats,
    wakeup: Notify,
}

impl ProfileSaver {
    /// Create a saver over a registry and tracker
    pub fn new(
        registry: Arc<CodeLocationRegistry>,
        tracker: Arc<MethodHotnessTracker>,
        config: SaverConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            config,
            app_locks: Mutex::new(HashMap::new()),
            stats: SaverStats::default(),
            wakeup: Notify::new(),
        }
    }

    pub fn config(&self) -> &SaverConfig {
        &self.config
    }

    pub fn stats(&self) -> &SaverStats {
        &self.stats
    }

    /// Wake the background task ahead of its next period
    pub fn request_save(&self) {
        self.wakeup.notify_one();
    }

    pub(crate) fn wakeup(&self) -> &Notify {
        &self.wakeup
    }

    /// Save every registered application now and wait for the writes
    ///
    /// A no-op when nothing is registered. Failures are logged and counted,
    /// never returned.
    pub fn trigger_save_and_wait(&self) -> CycleSummary {
        self.run_cycle(SaveReason::Forced)
    }

    /// Run one save cycle over all registered applications
    pub fn run_cycle(&self, reason: SaveReason) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for app in self.registry.registered_apps() {
            match self.save_app(&app, reason) {
                Ok(SaveOutcome::Written {
                    methods,
                    new_methods,
                    bytes,
                    boot_image,
                }) => {
                    tracing::info!(
                        "Saved profile for {} to {}: {} method(s), {} new, {} bytes{}",
                        app.app_id,
                        app.current_profile.display(),
                        methods,
                        new_methods,
                        bytes,
                        if boot_image { ", boot image" } else { "" }
                    );
                    summary.written += 1;
                }
                Ok(SaveOutcome::Skipped { new_methods }) => {
                    tracing::debug!(
                        "Skipped saving {}: {} new method(s), need {}",
                        app.app_id,
                        new_methods,
                        self.config.min_new_methods
                    );
                    self.stats.skipped_saves.fetch_add(1, Ordering::Relaxed);
                    summary.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to save profile for {} to {}: {}",
                        app.app_id,
                        app.current_profile.display(),
                        e
                    );
                    self.stats.failed_saves.fetch_add(1, Ordering::Relaxed);
                    summary.failed += 1;
                }
            }
        }

        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        summary
    }

    pub(crate) fn app_lock(&self, app_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.app_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(app_id.to_string()).or_default())
    }

    /// Save a single application
    pub fn save_app(&self, app: &AppRegistration, reason: SaveReason) -> Result<SaveOutcome> {
        let lock = self.app_lock(&app.app_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot = self.snapshot_for(app);
        let (mut merged, existed) = self.read_prior(&app.current_profile);
        let new_methods = merged.merge(&snapshot);

        if reason == SaveReason::Periodic && existed && new_methods < self.config.min_new_methods {
            return Ok(SaveOutcome::Skipped { new_methods });
        }

        let boot_image = merged.only_boot_image_methods();
        let bytes = serializer::encode(&merged.locations, boot_image)?;
        write_atomically(&app.current_profile, &bytes)?;

        self.stats.files_written.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);

        Ok(SaveOutcome::Written {
            methods: merged.method_count(),
            new_methods,
            bytes: bytes.len(),
            boot_image,
        })
    }

    /// Marked methods of the app's own locations plus all boot image locations
    fn snapshot_for(&self, app: &AppRegistration) -> ProfileSnapshot {
        let mut snapshot = self
            .tracker
            .snapshot(|location| location.is_boot_image() || app.owns(location));
        for location in &app.code_locations {
            snapshot
                .entry(location.clone())
                .or_insert_with(BTreeSet::new);
        }
        snapshot
    }

    /// Read the existing profile, treating anything unreadable as empty
    ///
    /// The flag reports whether a usable file exists; a corrupt file counts
    /// as absent so the next cycle always replaces it.
    fn read_prior(&self, path: &Path) -> (ProfileContents, bool) {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (ProfileContents::default(), false);
            }
            Err(e) => {
                tracing::warn!("Cannot read existing profile {}: {}", path.display(), e);
                return (ProfileContents::default(), false);
            }
        };

        match serializer::decode(&bytes) {
            Ok(contents) => (contents, true),
            Err(e) => {
                tracing::warn!(
                    "Discarding unreadable profile {}: {}",
                    path.display(),
                    e
                );
                (ProfileContents::default(), false)
            }
        }
    }
}

/// Replace `path` with `bytes` so readers see either the old or new file
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
