//! Method hotness tracking
//!
//! Records which methods carry profiling info, bucketed per code location so
//! threads executing code from different locations never contend.

use hotprof_core::{CodeLocation, MethodIdentity, MethodSignature, ProfileSnapshot};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Default number of executions before a method is marked
pub const DEFAULT_HOT_THRESHOLD: u32 = 10_000;

#[derive(Default)]
struct LocationRecord {
    /// Methods with profiling info
    marked: Mutex<BTreeSet<MethodSignature>>,
    /// Execution counts for methods not yet marked
    counts: Mutex<HashMap<MethodSignature, u32>>,
}

/// Tracks which methods are hot enough to be saved
pub struct MethodHotnessTracker {
    buckets: RwLock<HashMap<CodeLocation, Arc<LocationRecord>>>,
    /// Threshold for implicit marking
    hot_threshold: u32,
}

impl MethodHotnessTracker {
    /// Create a tracker with default threshold
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_HOT_THRESHOLD)
    }

    /// Create a tracker with custom threshold
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            hot_threshold: threshold.max(1),
        }
    }

    pub fn hot_threshold(&self) -> u32 {
        self.hot_threshold
    }

    fn bucket(&self, location: &CodeLocation) -> Arc<LocationRecord> {
        if let Some(record) = self
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
        {
            return Arc::clone(record);
        }
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(buckets.entry(location.clone()).or_default())
    }

    fn existing_bucket(&self, location: &CodeLocation) -> Option<Arc<LocationRecord>> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned()
    }

    /// Give `method` profiling info
    ///
    /// Returns true if the method was not marked before.
    pub fn mark_has_profiling_info(&self, method: &MethodIdentity) -> bool {
        let record = self.bucket(&method.location);
        let newly = record
            .marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.signature.clone());
        if newly {
            record
                .counts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&method.signature);
            tracing::debug!("Profiling info added for {}", method);
        }
        newly
    }

    /// Check if a method has profiling info
    pub fn is_marked(&self, method: &MethodIdentity) -> bool {
        self.existing_bucket(&method.location)
            .map(|record| {
                record
                    .marked
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(&method.signature)
            })
            .unwrap_or(false)
    }

    /// Record an execution of `method`
    ///
    /// Returns true when this execution crossed the threshold and marked the
    /// method.
    pub fn record_execution(&self, method: &MethodIdentity) -> bool {
        let record = self.bucket(&method.location);
        if record
            .marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&method.signature)
        {
            return false;
        }

        let hot = {
            let mut counts = record.counts.lock().unwrap_or_else(PoisonError::into_inner);
            let count = counts.entry(method.signature.clone()).or_insert(0);
            *count = count.saturating_add(1);
            *count >= self.hot_threshold
        };

        hot && self.mark_has_profiling_info(method)
    }

    /// Get the execution count for a method
    ///
    /// Marked methods report the threshold.
    pub fn execution_count(&self, method: &MethodIdentity) -> u32 {
        let Some(record) = self.existing_bucket(&method.location) else {
            return 0;
        };
        if record
            .marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&method.signature)
        {
            return self.hot_threshold;
        }
        let count = record
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&method.signature)
            .copied()
            .unwrap_or(0);
        count
    }

    /// Copy the marked methods of every location accepted by `include`
    ///
    /// Locations without marked methods are left out.
    pub fn snapshot<F>(&self, include: F) -> ProfileSnapshot
    where
        F: Fn(&CodeLocation) -> bool,
    {
        let records: Vec<(CodeLocation, Arc<LocationRecord>)> = self
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(location, _)| include(location))
            .map(|(location, record)| (location.clone(), Arc::clone(record)))
            .collect();

        let mut snapshot = ProfileSnapshot::new();
        for (location, record) in records {
            let marked = record
                .marked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if !marked.is_empty() {
                snapshot.insert(location, marked);
            }
        }
        snapshot
    }

    /// Number of marked methods over all locations
    pub fn marked_count(&self) -> usize {
        let records: Vec<Arc<LocationRecord>> = self
            .buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records
            .iter()
            .map(|r| r.marked.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }
}

impl Default for MethodHotnessTracker {
    fn default() -> Self {
        Self::new()
    }
}
