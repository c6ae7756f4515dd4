mod sqlite;

pub use sqlite::SqliteBlobStore;

use crate::error::StoreError;

/// Opaque byte storage for uploaded collection/environment documents. The
/// execution engine never touches storage itself; it runs against parsed
/// documents.
pub trait BlobStore: Send + Sync {
    fn put(&self, bytes: &[u8]) -> Result<i64, StoreError>;
    fn get(&self, id: i64) -> Result<Vec<u8>, StoreError>;
}
