pub mod catalog;
pub mod correlate;
pub mod deletion;
pub mod engine;
pub mod error;
pub mod exclusions;
pub mod jobs;
pub mod reconcile;
pub mod rules;
pub mod storage;
mod sync;

#[cfg(test)]
mod testing;

pub use catalog::{internal_id, Catalog};
pub use engine::{Engine, SyncStatus};
pub use error::EngineError;
pub use exclusions::ExclusionStore;
pub use jobs::JobRecorder;
pub use rules::{evaluate, RuleContext, Verdict};
pub use storage::CatalogStorage;
