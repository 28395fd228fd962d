/// Resource Storage Engine
///
/// Stores project resources as two SQLite collections: full payloads in the
/// blob collection and descriptive fields in the metadata collection. Both
/// are written in one transaction so a resource is always present in both
/// or in neither.

pub mod blobs;
pub mod classify;
pub mod hook;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod quota;
pub mod store;

pub use classify::{classify, format_size};
pub use hook::{ChangeKind, NoopHook, ResourceChangeHook, ResourceEvent};
pub use models::*;
pub use pipeline::ImagePipeline;
pub use quota::{DiskEstimator, QuotaReporter, StorageEstimate, StorageEstimator, UnsupportedEstimator};
pub use store::{ResourceStore, ResourceStoreConfig};
