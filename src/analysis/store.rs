use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::models::{AnalysisRecord, AnalysisStatus, StatusUpdate};
use crate::errors::AnalysisError;

/// Process-local map from analysis id to its last-known status.
///
/// Cloning is cheap: clones share the same map. Writes for one key are
/// last-write-wins. Each process owns an independent copy, so instances
/// behind a load balancer may disagree.
///
/// Terminal records (`completed`/`failed`) expire `terminal_ttl` after their
/// last write. In-flight records never expire. With no TTL the map grows
/// without bound.
#[derive(Clone, Default)]
pub struct StatusStore {
    inner: Arc<RwLock<HashMap<String, AnalysisRecord>>>,
    terminal_ttl: Option<Duration>,
}

impl StatusStore {
    pub fn new(terminal_ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            terminal_ttl,
        }
    }

    pub fn get(&self, analysis_id: &str) -> Result<Option<AnalysisRecord>, AnalysisError> {
        let map = self
            .inner
            .read()
            .map_err(|_| AnalysisError::StoreLockPoisoned)?;
        Ok(map.get(analysis_id).cloned())
    }

    /// Overwrite status, progress and current activity from a job queue
    /// poll, creating the record if needed.
    pub fn record_poll(
        &self,
        analysis_id: &str,
        status: AnalysisStatus,
        progress: i64,
        current_file: String,
        now: DateTime<Utc>,
    ) -> Result<AnalysisRecord, AnalysisError> {
        self.apply(
            analysis_id,
            StatusUpdate {
                status: Some(status),
                progress: Some(progress),
                current_file: Some(current_file),
                ..Default::default()
            },
            now,
        )
    }

    /// Merge `update` into the record for `analysis_id`, creating it with
    /// `start_time = now` if absent or expired. Returns the stored record.
    ///
    /// Only the written key is checked for expiry; the sweeper purges the
    /// rest of the map.
    pub fn apply(
        &self,
        analysis_id: &str,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<AnalysisRecord, AnalysisError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| AnalysisError::StoreLockPoisoned)?;
        if map
            .get(analysis_id)
            .is_some_and(|record| self.is_expired(record, now))
        {
            map.remove(analysis_id);
        }

        let record = map
            .entry(analysis_id.to_string())
            .or_insert_with(|| AnalysisRecord::new(analysis_id, now));
        update.apply(record);
        record.updated_at = now;
        Ok(record.clone())
    }

    /// Drop expired terminal records. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, AnalysisError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| AnalysisError::StoreLockPoisoned)?;
        Ok(self.evict_locked(&mut map, now))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn terminal_ttl(&self) -> Option<Duration> {
        self.terminal_ttl
    }

    fn is_expired(&self, record: &AnalysisRecord, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.terminal_ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        else {
            return false;
        };
        record.status.is_terminal() && now - record.updated_at >= ttl
    }

    fn evict_locked(&self, map: &mut HashMap<String, AnalysisRecord>, now: DateTime<Utc>) -> usize {
        let before = map.len();
        map.retain(|_, record| !self.is_expired(record, now));
        before - map.len()
    }
}

/// Periodically purge expired records until the process exits.
pub fn spawn_sweeper(store: StatusStore, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match store.purge_expired(Utc::now()) {
                Ok(0) => {}
                Ok(n) => tracing::debug!(evicted = n, "purged expired analysis records"),
                Err(e) => tracing::warn!(error = %e, "status store sweep failed"),
            }
        }
    })
}
