//! `forgecmd-infra`: collaborators the command core runs against.
//!
//! Transactions, record persistence and the background job service. Each
//! comes as a trait plus an in-memory implementation for tests/dev.

pub mod jobs;
pub mod record_store;
pub mod transaction;

pub use record_store::{InMemoryRecordStore, RecordStore, RecordStoreError, StoredRecord};
pub use transaction::{NoTransactions, TransactionError, TransactionManager};
