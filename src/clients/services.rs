//! # External Service Contracts
//!
//! The catalogue, file share and exchange set tool are remote services. The
//! orchestrator and builders only see these traits; transports live with the
//! host application.

use super::errors::ServiceResult;
use crate::models::{BatchId, DataStandard, JobId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Catalogue answer for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueSnapshot {
    pub products: Vec<String>,
    /// When the catalogue data for the standard last changed
    pub freshness_timestamp: DateTime<Utc>,
}

/// A product file located in the file share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFile {
    pub product: String,
    pub file_name: String,
    pub location: String,
}

#[async_trait]
pub trait SalesCatalogueClient: Send + Sync + Debug {
    /// Resolve requested products and the catalogue freshness timestamp
    async fn get_products(
        &self,
        data_standard: DataStandard,
        products: &[String],
        filter: Option<&str>,
    ) -> ServiceResult<CatalogueSnapshot>;
}

#[async_trait]
pub trait FileShareClient: Send + Sync + Debug {
    async fn create_batch(&self, data_standard: DataStandard, job_id: &JobId) -> ServiceResult<BatchId>;

    /// Locate the files of the given products
    async fn search(
        &self,
        data_standard: DataStandard,
        products: &[String],
    ) -> ServiceResult<Vec<ProductFile>>;

    async fn add_file(&self, batch_id: &BatchId, file_name: &str, content: Vec<u8>) -> ServiceResult<()>;

    async fn commit_batch(&self, batch_id: &BatchId) -> ServiceResult<()>;
}

#[async_trait]
pub trait ExchangeSetToolClient: Send + Sync + Debug {
    /// Open a workspace and return its id
    async fn create_workspace(&self, job_id: &JobId, data_standard: DataStandard) -> ServiceResult<String>;

    async fn add_content(&self, workspace: &str, files: &[ProductFile]) -> ServiceResult<()>;

    async fn sign(&self, workspace: &str) -> ServiceResult<()>;

    /// Produce the exchange set archive
    async fn extract(&self, workspace: &str) -> ServiceResult<Vec<u8>>;
}
