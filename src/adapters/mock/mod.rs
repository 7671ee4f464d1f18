pub mod catalog;

pub use catalog::{CatalogSeed, ResourceCatalog as MockResourceCatalog};
