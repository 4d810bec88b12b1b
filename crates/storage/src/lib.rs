//! Storage for dbkeep: the `Catalog` and `BackupStore` traits, the
//! JSON-file catalog implementation, and the local filesystem store.

pub mod catalog;
pub mod error;
pub mod local;
pub mod traits;

pub use catalog::JsonCatalog;
pub use error::{CatalogError, StoreError};
pub use local::LocalStore;
pub use traits::{ArtifactStat, BackupStore, Catalog, NewBackup, RecordFilter};
