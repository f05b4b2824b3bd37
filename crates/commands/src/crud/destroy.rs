use std::marker::PhantomData;

use forgecmd_core::{AttrType, Attributes, BASE, Record, Rule, Schema, Validatable};
use forgecmd_infra::{RecordStoreError, StoredRecord, TransactionManager};

use super::{CURRENT_USER, CrudContext, Lookup, Resource, current_user};
use crate::command::{Authorizable, Command, ProcessContext, Stalenessable};
use crate::error::ProcessError;

/// Delete the `R` named by `id`; `ok` carries the deleted record.
pub struct DestroyCommand<R> {
    ctx: CrudContext,
    resource: Lookup,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> DestroyCommand<R> {
    pub fn new(ctx: CrudContext) -> Self {
        Self {
            ctx,
            resource: Lookup::default(),
            _resource: PhantomData,
        }
    }

    pub fn resource(&mut self, attributes: &Attributes) -> Option<&StoredRecord> {
        self.resource.get(&*self.ctx.records, R::NAME, attributes)
    }
}

impl<R: Resource> Validatable for DestroyCommand<R> {
    fn rules() -> Vec<Rule<Self>> {
        vec![Rule::custom("resource", |cmd: &mut Self, attributes, errors| {
            if cmd.resource(attributes).is_none() {
                errors.add("resource", "blank");
            }
        })]
    }
}

impl<R: Resource> Authorizable for DestroyCommand<R> {
    fn authorized(&mut self, attributes: &Attributes) -> bool {
        let actor = current_user(attributes);
        match self.resource.get(&*self.ctx.records, R::NAME, attributes) {
            None => true,
            Some(record) => self
                .ctx
                .policy
                .permission(actor.as_ref(), "destroy", R::NAME, Some(record as &dyn Record)),
        }
    }
}

impl<R: Resource> Stalenessable for DestroyCommand<R> {}

impl<R: Resource> Command for DestroyCommand<R> {
    type Output = StoredRecord;
    const NAME: &'static str = R::DESTROY;
    const PARAM_KEY: &'static str = R::PARAM_KEY;

    fn schema() -> &'static Schema {
        Schema::cached::<Self>(|| {
            Schema::new()
                .required("id", AttrType::String)
                .attribute(CURRENT_USER, AttrType::Any)
        })
    }

    fn transactions(&self) -> &dyn TransactionManager {
        &*self.ctx.transactions
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<StoredRecord, ProcessError> {
        let Some(id) = self.resource(ctx.attributes()).map(|record| record.id) else {
            return Err(ctx.abort_with(BASE, "not_found", "record no longer exists"));
        };
        match self.ctx.records.delete(R::NAME, id) {
            Ok(record) => Ok(record),
            Err(error @ RecordStoreError::NotFound { .. }) => Err(ctx.abort_with(BASE, "failed", error.to_string())),
            Err(error) => Err(error.into()),
        }
    }

    fn persisted(&self) -> bool {
        true
    }
}
