//! `forgecmd-core`: command data primitives.
//!
//! Attribute schemas, the validation engine and identifiers. No I/O, no
//! execution concerns.

pub mod attributes;
pub mod error;
pub mod id;
pub mod record;
pub mod validation;
pub mod version;

pub use attributes::{AttrType, AttributeMap, Attributes, FieldDecl, Input, PermittedField, Schema};
pub use error::{AttributeError, AttributeResult, InvalidId};
pub use id::{ActorId, JobId, RecordId};
pub use record::Record;
pub use validation::{BASE, Errors, FieldError, Rule, Validatable, is_blank, run_validations};
pub use version::ExpectedVersion;
