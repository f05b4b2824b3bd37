//! Binding between commands and existing domain records.

use crate::attributes::AttributeMap;
use crate::id::RecordId;

/// A persisted domain record whose current field values can pre-fill a
/// command (edit forms, update commands).
pub trait Record {
    fn record_id(&self) -> RecordId;

    /// Current field values, keyed by field name.
    fn fields(&self) -> AttributeMap;
}

impl<R: Record + ?Sized> Record for &R {
    fn record_id(&self) -> RecordId {
        (**self).record_id()
    }

    fn fields(&self) -> AttributeMap {
        (**self).fields()
    }
}
