//! In-process stand-ins for the downstream services.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use exchange_set_core::clients::{
    CallbackNotifier, CallbackPayload, CatalogueSnapshot, ExchangeSetToolClient, FileShareClient,
    ProductFile, SalesCatalogueClient, ServiceError, ServiceResult,
};
use exchange_set_core::models::{BatchId, DataStandard, JobId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn catalogue_time(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

/// What the fake catalogue resolves any product filter to
pub const FILTERED_PRODUCTS: [&str; 2] = ["101GB001", "101GB002"];

/// Catalogue whose freshness timestamp can be moved between requests
#[derive(Debug)]
pub struct FakeCatalogue {
    freshness: Mutex<DateTime<Utc>>,
    down: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeCatalogue {
    pub fn new(freshness: DateTime<Utc>) -> Self {
        Self {
            freshness: Mutex::new(freshness),
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_freshness(&self, freshness: DateTime<Utc>) {
        *self.freshness.lock() = freshness;
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl SalesCatalogueClient for FakeCatalogue {
    async fn get_products(
        &self,
        _data_standard: DataStandard,
        products: &[String],
        filter: Option<&str>,
    ) -> ServiceResult<CatalogueSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(ServiceError::http_status("sales-catalogue", 503, "unavailable"));
        }
        let products = match filter {
            Some(_) if products.is_empty() => FILTERED_PRODUCTS.iter().map(|p| p.to_string()).collect(),
            _ => products.to_vec(),
        };
        Ok(CatalogueSnapshot {
            products,
            freshness_timestamp: *self.freshness.lock(),
        })
    }
}

/// File share that hands out sequential batch ids and remembers commits
#[derive(Debug, Default)]
pub struct FakeFileShare {
    next_batch: AtomicUsize,
    fail_commit: AtomicBool,
    pub committed: Mutex<Vec<BatchId>>,
    pub uploads: Mutex<Vec<(BatchId, String)>>,
    pub searched: Mutex<Vec<String>>,
}

impl FakeFileShare {
    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn batches_created(&self) -> usize {
        self.next_batch.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileShareClient for FakeFileShare {
    async fn create_batch(&self, _data_standard: DataStandard, _job_id: &JobId) -> ServiceResult<BatchId> {
        let n = self.next_batch.fetch_add(1, Ordering::SeqCst) + 1;
        BatchId::new(format!("batch-{n}")).map_err(|e| ServiceError::other("file-share", e.to_string()))
    }

    async fn search(&self, _data_standard: DataStandard, products: &[String]) -> ServiceResult<Vec<ProductFile>> {
        self.searched.lock().extend(products.iter().cloned());
        Ok(products
            .iter()
            .map(|product| ProductFile {
                product: product.clone(),
                file_name: format!("{product}.000"),
                location: format!("fss://products/{product}"),
            })
            .collect())
    }

    async fn add_file(&self, batch_id: &BatchId, file_name: &str, _content: Vec<u8>) -> ServiceResult<()> {
        self.uploads.lock().push((batch_id.clone(), file_name.to_string()));
        Ok(())
    }

    async fn commit_batch(&self, batch_id: &BatchId) -> ServiceResult<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(ServiceError::http_status("file-share", 409, "batch rejected"));
        }
        self.committed.lock().push(batch_id.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeTool {
    pub signed: AtomicUsize,
}

#[async_trait]
impl ExchangeSetToolClient for FakeTool {
    async fn create_workspace(&self, job_id: &JobId, data_standard: DataStandard) -> ServiceResult<String> {
        Ok(format!("ws-{data_standard}-{job_id}"))
    }

    async fn add_content(&self, _workspace: &str, _files: &[ProductFile]) -> ServiceResult<()> {
        Ok(())
    }

    async fn sign(&self, _workspace: &str) -> ServiceResult<()> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn extract(&self, workspace: &str) -> ServiceResult<Vec<u8>> {
        Ok(format!("archive of {workspace}").into_bytes())
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    fail: AtomicBool,
    pub sent: Mutex<Vec<(String, CallbackPayload)>>,
}

impl RecordingNotifier {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn payloads(&self) -> Vec<CallbackPayload> {
        self.sent.lock().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl CallbackNotifier for RecordingNotifier {
    async fn notify(&self, uri: &str, payload: &CallbackPayload) -> ServiceResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::network("callback", "connection refused"));
        }
        self.sent.lock().push((uri.to_string(), payload.clone()));
        Ok(())
    }
}
