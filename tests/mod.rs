//! Integration tests for aniplay
//!
//! Tests are organized by component:
//! - catalog_test: content service API client tests
//! - resolver_test: resolution cascade tests (episodes -> servers -> manifest)
//! - pipeline_test: media pipeline and decoding strategy tests
//! - cli_test: argument parsing, validation, and output format tests
//! - e2e_test: end-to-end flow tests (Resolve -> Mount -> Switch -> Skip)

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
