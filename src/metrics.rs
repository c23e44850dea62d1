//! Mirror request accounting.
//!
//! The recorder is the only process-wide state in the registry and is
//! injected rather than global so tests stay deterministic.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => "hit",
            CacheOutcome::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestSource {
    Internal,
    External,
}

impl RequestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestSource::Internal => "internal",
            RequestSource::External => "external",
        }
    }
}

pub trait MetricsRecorder: Send + Sync {
    fn record_mirror_request(&self, registry: &str, cache: CacheOutcome, source: RequestSource);
}

/// Recorder that drops everything.
#[derive(Debug, Default)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn record_mirror_request(&self, _registry: &str, _cache: CacheOutcome, _source: RequestSource) {
    }
}

/// Keyed counters behind a lock, readable for reporting and assertions.
#[derive(Debug, Default)]
pub struct CounterRecorder {
    counts: Mutex<HashMap<(String, CacheOutcome, RequestSource), u64>>,
}

impl CounterRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, registry: &str, cache: CacheOutcome, source: RequestSource) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts
            .get(&(registry.to_string(), cache, source))
            .copied()
            .unwrap_or(0)
    }
}

impl MetricsRecorder for CounterRecorder {
    fn record_mirror_request(&self, registry: &str, cache: CacheOutcome, source: RequestSource) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        *counts
            .entry((registry.to_string(), cache, source))
            .or_insert(0) += 1;
    }
}
