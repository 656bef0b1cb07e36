pub mod conformance;
mod error;
mod file;
mod memory;
mod record;
mod table;
mod traits;

pub use error::StorageError;
pub use file::{FileStorage, RecoveryReport};
pub use memory::MemoryStorage;
pub use record::{IdempotencyRecord, QuoteRecord, UnitOfWork, MAX_IDEMPOTENCY_KEY_LEN};
pub use traits::QuoteStorage;
