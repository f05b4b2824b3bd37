use std::marker::PhantomData;

use forgecmd_core::{AttrType, Attributes, BASE, Errors, Schema, Validatable};
use forgecmd_infra::{RecordStoreError, StoredRecord, TransactionManager};

use super::{CURRENT_USER, CrudContext, Resource, current_user};
use crate::command::{Authorizable, Command, ProcessContext, Stalenessable};
use crate::error::ProcessError;

/// Insert a new `R` from the provided fields.
pub struct CreateCommand<R> {
    ctx: CrudContext,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> CreateCommand<R> {
    pub fn new(ctx: CrudContext) -> Self {
        Self {
            ctx,
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> Validatable for CreateCommand<R> {
    fn validate(&mut self, attributes: &Attributes, errors: &mut Errors) {
        R::validate(attributes, errors);
    }
}

impl<R: Resource> Authorizable for CreateCommand<R> {
    fn authorized(&mut self, attributes: &Attributes) -> bool {
        self.ctx
            .policy
            .permission(current_user(attributes).as_ref(), "create", R::NAME, None)
    }
}

impl<R: Resource> Stalenessable for CreateCommand<R> {}

impl<R: Resource> Command for CreateCommand<R> {
    type Output = StoredRecord;
    const NAME: &'static str = R::CREATE;
    const PARAM_KEY: &'static str = R::PARAM_KEY;

    fn schema() -> &'static Schema {
        Schema::cached::<Self>(|| R::schema().attribute(CURRENT_USER, AttrType::Any))
    }

    fn transactions(&self) -> &dyn TransactionManager {
        &*self.ctx.transactions
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<StoredRecord, ProcessError> {
        let fields = ctx.attributes().without(&[CURRENT_USER]);
        match self.ctx.records.insert(R::NAME, fields) {
            Ok(record) => Ok(record),
            Err(error @ RecordStoreError::Rejected { .. }) => Err(ctx.abort_with(BASE, "failed", error.to_string())),
            Err(error) => Err(error.into()),
        }
    }
}
