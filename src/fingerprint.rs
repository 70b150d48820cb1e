//! # Fingerprint Service
//!
//! Computes the discriminant that identifies a build's logical inputs and owns
//! the fingerprint table used to claim those inputs.
//!
//! The discriminant is a SHA-256 over the length-prefixed canonical fields:
//!
//! - the data standard
//! - the requested products, trimmed, sorted and deduplicated
//! - the product filter, trimmed
//! - the upstream catalogue freshness timestamp (RFC 3339, UTC, nanoseconds)
//!
//! The callback URI and job id are not inputs: two callers asking for the same
//! data at the same catalogue timestamp get the same discriminant.
//!
//! ## Claims
//!
//! [`FingerprintService::claim`] writes the fingerprint with insert-if-absent
//! semantics. Exactly one of several racing claimants wins; the others get the
//! winner's record back and deduplicate against it.

use crate::models::{BatchId, BuildFingerprint, DataStandard, JobId};
use crate::storage::{EntityStore, StorageError, StorageResult};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Length-prefixed so no field value can run into the next
fn update_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

/// Outcome of a fingerprint claim
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimResult {
    /// This caller now owns the fingerprint
    Claimed,
    /// Another job already owns it
    Exists(Box<BuildFingerprint>),
}

/// Logical inputs of one build
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInputs<'a> {
    pub data_standard: DataStandard,
    pub products: &'a [String],
    pub filter: Option<&'a str>,
    pub catalogue_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FingerprintService {
    fingerprints: EntityStore<BuildFingerprint>,
}

impl FingerprintService {
    pub fn new(fingerprints: EntityStore<BuildFingerprint>) -> Self {
        Self { fingerprints }
    }

    pub fn store(&self) -> &EntityStore<BuildFingerprint> {
        &self.fingerprints
    }

    /// Deterministic hex discriminant of the inputs
    pub fn discriminant(inputs: FingerprintInputs<'_>) -> String {
        let products: BTreeSet<&str> = inputs
            .products
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        let filter = inputs.filter.map(str::trim).unwrap_or_default();

        let catalogue = inputs
            .catalogue_timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true);

        let mut hasher = Sha256::new();
        update_field(&mut hasher, inputs.data_standard.as_str());
        hasher.update((products.len() as u64).to_be_bytes());
        for product in &products {
            update_field(&mut hasher, product);
        }
        update_field(&mut hasher, filter);
        update_field(&mut hasher, &catalogue);
        hex::encode(hasher.finalize())
    }

    pub async fn load(
        &self,
        data_standard: DataStandard,
        discriminant: &str,
    ) -> StorageResult<Option<BuildFingerprint>> {
        self.fingerprints
            .get(data_standard.as_str(), discriminant)
            .await
    }

    /// Claim the fingerprint for its job (insert if absent)
    pub async fn claim(&self, fingerprint: &BuildFingerprint) -> StorageResult<ClaimResult> {
        match self.fingerprints.add(fingerprint).await {
            Ok(()) => {
                info!(
                    job_id = %fingerprint.job_id,
                    data_standard = %fingerprint.data_standard,
                    discriminant = %fingerprint.discriminant,
                    "🔏 Claimed build fingerprint"
                );
                Ok(ClaimResult::Claimed)
            }
            Err(e) if e.is_already_exists() => {
                let existing = self
                    .load(fingerprint.data_standard, &fingerprint.discriminant)
                    .await?
                    .ok_or_else(|| {
                        StorageError::backend(
                            "claim_fingerprint",
                            "fingerprint disappeared during claim",
                        )
                    })?;
                debug!(
                    job_id = %fingerprint.job_id,
                    owner = %existing.job_id,
                    discriminant = %fingerprint.discriminant,
                    "Fingerprint already claimed"
                );
                Ok(ClaimResult::Exists(Box::new(existing)))
            }
            Err(e) => Err(e),
        }
    }

    /// Replace a claim whose owner can no longer produce the build
    pub async fn take_over(&self, fingerprint: &BuildFingerprint) -> StorageResult<()> {
        self.fingerprints.upsert(fingerprint).await?;
        info!(
            job_id = %fingerprint.job_id,
            discriminant = %fingerprint.discriminant,
            "🔏 Took over build fingerprint"
        );
        Ok(())
    }

    /// Drop the claim when `job_id` still owns it
    pub async fn release(
        &self,
        data_standard: DataStandard,
        discriminant: &str,
        job_id: &JobId,
    ) -> StorageResult<bool> {
        match self.load(data_standard, discriminant).await? {
            Some(fingerprint) if &fingerprint.job_id == job_id => {
                let deleted = self
                    .fingerprints
                    .delete(data_standard.as_str(), discriminant)
                    .await?;
                info!(job_id = %job_id, discriminant, "🔓 Released build fingerprint");
                Ok(deleted)
            }
            _ => Ok(false),
        }
    }

    /// Record the batch a successful build produced, if `job_id` still owns the claim
    pub async fn record_batch(
        &self,
        data_standard: DataStandard,
        discriminant: &str,
        job_id: &JobId,
        batch_id: &BatchId,
    ) -> StorageResult<bool> {
        let Some(mut fingerprint) = self.load(data_standard, discriminant).await? else {
            return Ok(false);
        };
        if &fingerprint.job_id != job_id {
            return Ok(false);
        }
        fingerprint.batch_id = batch_id.clone();
        self.fingerprints.upsert(&fingerprint).await?;
        Ok(true)
    }
}
