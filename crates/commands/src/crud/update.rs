use std::marker::PhantomData;

use forgecmd_core::{AttrType, Attributes, BASE, Errors, ExpectedVersion, Record, Rule, Schema, Validatable};
use forgecmd_infra::{RecordStoreError, StoredRecord, TransactionManager};

use super::{CURRENT_USER, CrudContext, Lookup, Resource, current_user};
use crate::command::{Authorizable, Command, ProcessContext, Stalenessable};
use crate::error::ProcessError;

const LOCK_VERSION: &str = "lock_version";

/// Update the provided fields of the `R` named by `id`.
///
/// Unauthorized only when the record exists and the policy denies `update`;
/// a missing record is reported as invalid instead.
pub struct UpdateCommand<R> {
    ctx: CrudContext,
    resource: Lookup,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> UpdateCommand<R> {
    pub fn new(ctx: CrudContext) -> Self {
        Self {
            ctx,
            resource: Lookup::default(),
            _resource: PhantomData,
        }
    }

    /// The record being updated, looked up once.
    pub fn resource(&mut self, attributes: &Attributes) -> Option<&StoredRecord> {
        self.resource.get(&*self.ctx.records, R::NAME, attributes)
    }

    fn expected_version(attributes: &Attributes) -> ExpectedVersion {
        ExpectedVersion::from_option(attributes.get::<u64>(LOCK_VERSION))
    }
}

impl<R: Resource> Validatable for UpdateCommand<R> {
    fn rules() -> Vec<Rule<Self>> {
        vec![Rule::custom("resource", |cmd: &mut Self, attributes, errors| {
            if cmd.resource(attributes).is_none() {
                errors.add("resource", "blank");
            }
        })]
    }

    fn validate(&mut self, attributes: &Attributes, errors: &mut Errors) {
        R::validate(attributes, errors);
    }
}

impl<R: Resource> Authorizable for UpdateCommand<R> {
    fn authorized(&mut self, attributes: &Attributes) -> bool {
        let actor = current_user(attributes);
        match self.resource.get(&*self.ctx.records, R::NAME, attributes) {
            None => true,
            Some(record) => self
                .ctx
                .policy
                .permission(actor.as_ref(), "update", R::NAME, Some(record as &dyn Record)),
        }
    }
}

impl<R: Resource> Stalenessable for UpdateCommand<R> {
    fn stale(&mut self, attributes: &Attributes) -> bool {
        let expected = Self::expected_version(attributes);
        self.resource(attributes)
            .is_some_and(|record| expected.is_stale(record.version))
    }
}

impl<R: Resource> Command for UpdateCommand<R> {
    type Output = StoredRecord;
    const NAME: &'static str = R::UPDATE;
    const PARAM_KEY: &'static str = R::PARAM_KEY;

    fn schema() -> &'static Schema {
        Schema::cached::<Self>(|| {
            R::schema()
                .required("id", AttrType::String)
                .attribute(LOCK_VERSION, AttrType::Integer)
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
        let changes = ctx
            .attributes()
            .without(&["id", LOCK_VERSION, CURRENT_USER])
            .into_iter()
            .filter(|(name, _)| ctx.supplied(name))
            .collect();
        let expected = Self::expected_version(ctx.attributes());

        match self.ctx.records.update(R::NAME, id, changes, expected) {
            Ok(record) => {
                self.resource.replace(record.clone());
                Ok(record)
            }
            Err(error @ RecordStoreError::Concurrency(_)) => Err(ctx.abort_with(BASE, "stale", error.to_string())),
            Err(error @ (RecordStoreError::Rejected { .. } | RecordStoreError::NotFound { .. })) => {
                Err(ctx.abort_with(BASE, "failed", error.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn persisted(&self) -> bool {
        true
    }
}
