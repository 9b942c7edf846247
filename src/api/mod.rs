//! API clients for external services
//!
//! - Catalog: content service (titles, episodes, servers, stream manifests)

pub mod catalog;

pub use catalog::{CatalogClient, CatalogError};
