//! # Identifiers
//!
//! Newtype identifiers for jobs and batches. Both are opaque strings that are
//! trimmed on construction; a `JobId` may never be empty, while `BatchId::none()`
//! is the distinguished empty value meaning "no batch produced yet".

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} must not be empty")]
pub struct InvalidIdentifier {
    pub kind: &'static str,
}

/// Identifier of one accepted logical request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(value: impl AsRef<str>) -> Result<Self, InvalidIdentifier> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InvalidIdentifier { kind: "JobId" });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate a fresh random job identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::str::FromStr for JobId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier of a published batch in the file share service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BatchId(String);

impl BatchId {
    pub fn new(value: impl AsRef<str>) -> Result<Self, InvalidIdentifier> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InvalidIdentifier { kind: "BatchId" });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The "no batch yet" value
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `None` for the empty batch, the batch otherwise
    pub fn into_option(self) -> Option<BatchId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("<none>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<String> for BatchId {
    fn from(value: String) -> Self {
        Self(value.trim().to_string())
    }
}

impl From<BatchId> for String {
    fn from(id: BatchId) -> Self {
        id.0
    }
}

impl From<Option<BatchId>> for BatchId {
    fn from(value: Option<BatchId>) -> Self {
        value.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_trimmed() {
        let id = JobId::new("  job-42 \n").unwrap();
        assert_eq!(id.as_str(), "job-42");
    }

    #[test]
    fn test_job_id_rejects_blank() {
        assert!(JobId::new("").is_err());
        assert!(JobId::new("   ").is_err());
        assert!(serde_json::from_str::<JobId>("\"  \"").is_err());
    }

    #[test]
    fn test_batch_id_none() {
        let none = BatchId::none();
        assert!(none.is_none());
        assert_eq!(none.to_string(), "<none>");
        assert_eq!(none.clone().into_option(), None);
        assert!(BatchId::new(" ").is_err());

        let batch = BatchId::new("B1").unwrap();
        assert_eq!(batch.clone().into_option(), Some(batch));
    }

    #[test]
    fn test_serde_as_plain_strings() {
        let id = JobId::new("J1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"J1\"");

        let batch: BatchId = serde_json::from_str("\" B1 \"").unwrap();
        assert_eq!(batch.as_str(), "B1");

        let empty: BatchId = serde_json::from_str("\"\"").unwrap();
        assert!(empty.is_none());
    }
}
