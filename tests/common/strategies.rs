//! Proptest strategies for requests and stored entities.

use exchange_set_core::models::DataStandard;
use proptest::prelude::*;

pub fn data_standard_strategy() -> impl Strategy<Value = DataStandard> {
    prop_oneof![
        Just(DataStandard::S100),
        Just(DataStandard::S57),
        Just(DataStandard::S63),
    ]
}

/// Product names in the catalogue's style, e.g. `101GB00042`
pub fn product_strategy() -> impl Strategy<Value = String> {
    "[0-9]{3}[A-Z]{2}[0-9A-Z]{5}"
}

pub fn product_list_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(product_strategy(), 1..12)
}

/// Free text with multi-byte characters, for chunk boundary coverage
pub fn note_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z ]{1,8}",
            Just("é".to_string()),
            Just("⚓".to_string()),
            Just("🌊".to_string()),
        ],
        0..200,
    )
    .prop_map(|parts| parts.concat())
}
