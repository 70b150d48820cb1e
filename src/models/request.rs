//! # Exchange Set Request
//!
//! The validated request handed to the assembly orchestrator by the API layer.
//! `normalized()` produces the canonical shape used for fingerprinting, so two
//! requests that differ only in product order, duplicates or whitespace are
//! treated as the same logical request.

use super::DataStandard;
use crate::error::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSetRequest {
    pub data_standard: DataStandard,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub callback_uri: Option<String>,
}

impl ExchangeSetRequest {
    pub fn new(data_standard: DataStandard) -> Self {
        Self {
            data_standard,
            products: Vec::new(),
            filter: None,
            callback_uri: None,
        }
    }

    pub fn with_products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_callback_uri(mut self, uri: impl Into<String>) -> Self {
        self.callback_uri = Some(uri.into());
        self
    }

    /// Canonical form: trimmed, de-duplicated, sorted products and blank options removed
    pub fn normalized(self) -> OrchestratorResult<Self> {
        let mut products: Vec<String> = self
            .products
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        products.sort();
        products.dedup();

        let filter = non_blank(self.filter);
        let callback_uri = non_blank(self.callback_uri);

        if products.is_empty() && filter.is_none() {
            return Err(OrchestratorError::validation(
                "request must name at least one product or a product filter",
            ));
        }

        Ok(Self {
            data_standard: self.data_standard,
            products,
            filter,
            callback_uri,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_sorts_and_dedups_products() {
        let request = ExchangeSetRequest::new(DataStandard::S100)
            .with_products([" 101GB004 ", "101GB001", "101GB004", ""])
            .with_callback_uri("   ")
            .normalized()
            .unwrap();

        assert_eq!(request.products, vec!["101GB001", "101GB004"]);
        assert_eq!(request.callback_uri, None);
        assert_eq!(request.filter, None);
    }

    #[test]
    fn test_filter_only_request_is_valid() {
        let request = ExchangeSetRequest::new(DataStandard::S57)
            .with_filter(" f1 ")
            .normalized()
            .unwrap();
        assert_eq!(request.filter.as_deref(), Some("f1"));
    }

    #[test]
    fn test_empty_request_is_rejected() {
        let result = ExchangeSetRequest::new(DataStandard::S63)
            .with_filter("  ")
            .normalized();
        assert!(matches!(result, Err(OrchestratorError::Validation(_))));
    }
}
