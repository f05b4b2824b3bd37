//! Transactional boundary used around command bodies.
//!
//! The execution core only decides *whether* to open a transaction and
//! whether to roll it back; what a transaction means belongs to the
//! persistence layer behind this trait.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("no transaction is active")]
    NotActive,

    #[error("transaction storage error: {0}")]
    Storage(String),
}

/// Begin/commit/rollback on some persistence layer. Calls nest: every
/// `begin` is matched by exactly one `commit` or `rollback`.
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> Result<(), TransactionError>;

    fn commit(&self) -> Result<(), TransactionError>;

    fn rollback(&self) -> Result<(), TransactionError>;
}

impl<T: TransactionManager + ?Sized> TransactionManager for Arc<T> {
    fn begin(&self) -> Result<(), TransactionError> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), TransactionError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        (**self).rollback()
    }
}

impl<T: TransactionManager + ?Sized> TransactionManager for &T {
    fn begin(&self) -> Result<(), TransactionError> {
        (**self).begin()
    }

    fn commit(&self) -> Result<(), TransactionError> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        (**self).rollback()
    }
}

/// For commands whose bodies touch nothing transactional.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransactions;

impl TransactionManager for NoTransactions {
    fn begin(&self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), TransactionError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), TransactionError> {
        Ok(())
    }
}
