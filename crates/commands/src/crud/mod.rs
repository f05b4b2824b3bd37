//! Generic create/update/destroy commands over a [`RecordStore`].
//!
//! A resource describes its fields once; the three commands add the
//! plumbing every resource needs (`current_user`, `id`, `lock_version`),
//! ask the policy resolver, and write through the store inside a
//! transaction.
//!
//! ```ignore
//! struct Post;
//!
//! impl Resource for Post {
//!     forgecmd::crud_names!("posts");
//!     const PARAM_KEY: &'static str = "post";
//!
//!     fn schema() -> Schema {
//!         Schema::new()
//!             .required("title", AttrType::String)
//!             .attribute("body", AttrType::String)
//!     }
//! }
//!
//! CreateCommand::<Post>::new(ctx).call(input)?;
//! ```

mod create;
mod destroy;
mod update;

use std::sync::Arc;

use forgecmd_auth::{Actor, PolicyResolver};
use forgecmd_core::{Attributes, Errors, RecordId, Schema};
use forgecmd_infra::{InMemoryRecordStore, RecordStore, StoredRecord, TransactionManager};
use tracing::warn;

pub use create::CreateCommand;
pub use destroy::DestroyCommand;
pub use update::UpdateCommand;

/// Attribute holding the serialized [`Actor`] a command runs for.
pub const CURRENT_USER: &str = "current_user";

/// A kind of record the CRUD commands can manage.
pub trait Resource: Send + Sync + 'static {
    /// Table name in the store; also the policy resource name.
    const NAME: &'static str;
    const PARAM_KEY: &'static str;
    const CREATE: &'static str;
    const UPDATE: &'static str;
    const DESTROY: &'static str;

    /// The resource's own fields.
    fn schema() -> Schema;

    /// Extra validation shared by create and update.
    fn validate(_attributes: &Attributes, _errors: &mut Errors) {}
}

/// Declares `NAME` and the three command names (`<name>.create`, ...)
/// inside an `impl Resource` block.
#[macro_export]
macro_rules! crud_names {
    ($resource:literal) => {
        const NAME: &'static str = $resource;
        const CREATE: &'static str = concat!($resource, ".create");
        const UPDATE: &'static str = concat!($resource, ".update");
        const DESTROY: &'static str = concat!($resource, ".destroy");
    };
}

/// Collaborators the CRUD commands run against.
#[derive(Clone)]
pub struct CrudContext {
    pub records: Arc<dyn RecordStore>,
    pub transactions: Arc<dyn TransactionManager>,
    pub policy: Arc<dyn PolicyResolver>,
}

impl CrudContext {
    pub fn new(
        records: Arc<dyn RecordStore>,
        transactions: Arc<dyn TransactionManager>,
        policy: Arc<dyn PolicyResolver>,
    ) -> Self {
        Self {
            records,
            transactions,
            policy,
        }
    }

    /// The in-memory store doubles as the transaction manager.
    pub fn in_memory(store: Arc<InMemoryRecordStore>, policy: Arc<dyn PolicyResolver>) -> Self {
        Self {
            records: store.clone(),
            transactions: store,
            policy,
        }
    }
}

impl core::fmt::Debug for CrudContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CrudContext").finish_non_exhaustive()
    }
}

pub(crate) fn current_user(attributes: &Attributes) -> Option<Actor> {
    attributes.get(CURRENT_USER)
}

/// Memoised lookup of the record named by the `id` attribute.
#[derive(Debug, Default)]
pub(crate) struct Lookup {
    memo: Option<Option<StoredRecord>>,
}

impl Lookup {
    pub(crate) fn get(&mut self, records: &dyn RecordStore, resource: &str, attributes: &Attributes) -> Option<&StoredRecord> {
        if self.memo.is_none() {
            let found = attributes
                .str("id")
                .and_then(|id| id.parse::<RecordId>().ok())
                .and_then(|id| match records.find(resource, id) {
                    Ok(found) => found,
                    Err(error) => {
                        warn!(resource, %id, %error, "record lookup failed");
                        None
                    }
                });
            self.memo = Some(found);
        }
        self.memo.as_ref().and_then(Option::as_ref)
    }

    pub(crate) fn replace(&mut self, record: StoredRecord) {
        self.memo = Some(Some(record));
    }
}
