/// Resource Vault - local resource storage engine
///
/// Persists per-project resources (documents, images, code, archives) in a
/// local SQLite database with transactional blob and metadata collections,
/// an image transformation pipeline and a derived-state change hook.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod metrics;
pub mod resource_store;

pub use config::VaultConfig;
pub use context::VaultContext;
pub use error::{VaultError, VaultResult};
pub use resource_store::{
    ResourceCategory, ResourceChangeHook, ResourceMetadata, ResourceStore, ResourceStoreConfig,
};
