pub mod cache;
pub mod firestore;
pub mod models;
pub mod repository;
pub mod storage;

pub use cache::CachedRepository;
pub use firestore::FirestoreRepository;
pub use models::{ProcessingStatus, Recording};
pub use repository::{RecordRepository, RepositoryError};
pub use storage::{ObjectStore, ObjectStoreManager, S3Config, StorageError};
