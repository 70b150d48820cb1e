//! # Processed Job Tracker
//!
//! Job ids a monitor has claimed in this process. A peek-based monitor sees a
//! request again on every poll until the build finishes and the message is
//! deleted; the tracker keeps it from being built twice.
//!
//! A claim is marked responded once the build's response is on the response
//! queue. A peeked duplicate of a responded job can then be deleted instead of
//! sitting at the head of the queue.
//!
//! Entries expire after a TTL (the queue visibility timeout by default), after
//! which a still-visible message may legitimately be retried. The set is also
//! capped: expired entries are evicted on every claim and, when the tracker is
//! still full, the oldest entry goes.

use crate::config::MonitorConfig;
use crate::models::JobId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Claim {
    claimed_at: Instant,
    responded: bool,
}

impl Claim {
    fn new(claimed_at: Instant) -> Self {
        Self {
            claimed_at,
            responded: false,
        }
    }
}

#[derive(Debug)]
pub struct ProcessedJobTracker {
    entries: DashMap<JobId, Claim>,
    ttl: Duration,
    capacity: usize,
}

impl ProcessedJobTracker {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.processed_job_ttl(), config.processed_job_capacity)
    }

    /// Claim `job_id`; false when it is already claimed and not expired
    pub fn try_claim(&self, job_id: &JobId) -> bool {
        let now = Instant::now();
        self.evict_expired(now);
        if self.entries.len() >= self.capacity && !self.entries.contains_key(job_id) {
            self.evict_oldest();
        }

        match self.entries.entry(job_id.clone()) {
            Entry::Occupied(mut entry) => {
                if self.is_expired(entry.get().claimed_at, now) {
                    entry.insert(Claim::new(now));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Claim::new(now));
                true
            }
        }
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        let now = Instant::now();
        self.entries
            .get(job_id)
            .map(|claim| !self.is_expired(claim.claimed_at, now))
            .unwrap_or(false)
    }

    /// Record that the claimed job's response has been enqueued
    pub fn mark_responded(&self, job_id: &JobId) {
        if let Some(mut claim) = self.entries.get_mut(job_id) {
            claim.responded = true;
        }
    }

    /// Whether a live claim on `job_id` already produced its response
    pub fn is_responded(&self, job_id: &JobId) -> bool {
        let now = Instant::now();
        self.entries
            .get(job_id)
            .map(|claim| claim.responded && !self.is_expired(claim.claimed_at, now))
            .unwrap_or(false)
    }

    /// Forget a claim so the job can be picked up again
    pub fn release(&self, job_id: &JobId) {
        self.entries.remove(job_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, claimed_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(claimed_at) >= self.ttl
    }

    fn evict_expired(&self, now: Instant) {
        let before = self.entries.len();
        self.entries
            .retain(|_, claim| !self.is_expired(claim.claimed_at, now));
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired processed job ids");
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().claimed_at)
            .map(|entry| entry.key().clone());
        if let Some(job_id) = oldest {
            self.entries.remove(&job_id);
            debug!(job_id = %job_id, "Evicted oldest processed job id at capacity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobId {
        JobId::new(id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_is_exclusive_until_expiry() {
        let tracker = ProcessedJobTracker::new(Duration::from_secs(60), 10);

        assert!(tracker.try_claim(&job("J1")));
        assert!(!tracker.try_claim(&job("J1")));
        assert!(tracker.contains(&job("J1")));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!tracker.contains(&job("J1")));
        assert!(tracker.try_claim(&job("J1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let tracker = ProcessedJobTracker::new(Duration::from_secs(600), 2);

        assert!(tracker.try_claim(&job("J1")));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(tracker.try_claim(&job("J2")));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(tracker.try_claim(&job("J3")));

        assert_eq!(tracker.len(), 2);
        assert!(!tracker.contains(&job("J1")));
        assert!(tracker.contains(&job("J2")));
        assert!(tracker.contains(&job("J3")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_evicted_on_claim() {
        let tracker = ProcessedJobTracker::new(Duration::from_secs(10), 100);
        tracker.try_claim(&job("J1"));
        tracker.try_claim(&job("J2"));

        tokio::time::advance(Duration::from_secs(11)).await;
        tracker.try_claim(&job("J3"));
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_responded_marks_live_claims_only() {
        let tracker = ProcessedJobTracker::new(Duration::from_secs(60), 10);
        tracker.mark_responded(&job("J1"));
        assert!(!tracker.is_responded(&job("J1")));

        assert!(tracker.try_claim(&job("J1")));
        assert!(!tracker.is_responded(&job("J1")));
        tracker.mark_responded(&job("J1"));
        assert!(tracker.is_responded(&job("J1")));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!tracker.is_responded(&job("J1")));
        assert!(tracker.try_claim(&job("J1")));
        assert!(!tracker.is_responded(&job("J1")));
    }

    #[test]
    fn test_release() {
        let tracker = ProcessedJobTracker::new(Duration::from_secs(10), 100);
        tracker.try_claim(&job("J1"));
        tracker.release(&job("J1"));
        assert!(tracker.is_empty());
        assert!(tracker.try_claim(&job("J1")));
    }
}
