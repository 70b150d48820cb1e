//! # External Clients
//!
//! Contracts for the services the orchestrator and builders call, the retry
//! policy wrapped around them and caller callback delivery.

pub mod callback;
pub mod errors;
pub mod retry;
pub mod services;

pub use callback::{CallbackNotifier, CallbackPayload, HttpCallbackNotifier};
pub use errors::{ServiceError, ServiceResult, DEFAULT_RETRIABLE_STATUS_CODES};
pub use retry::RetryPolicy;
pub use services::{
    CatalogueSnapshot, ExchangeSetToolClient, FileShareClient, ProductFile, SalesCatalogueClient,
};
