//! Pre-filling a command from an existing record.

use forgecmd_core::{AttributeError, Input, Record};

use crate::command::Command;
use crate::instance::Instance;

impl<C: Command> Instance<'_, C> {
    /// Start from the record's current values for every declared field
    /// (and its id when `id` is declared); `input` overrides them.
    pub fn build_from_object(command: C, record: &dyn Record, input: impl Into<Input>) -> Result<Self, AttributeError> {
        let mut merged = C::schema().attributes_from_record(record);
        merged.extend(input.into().merge()?);
        Self::new(command, merged)
    }
}
