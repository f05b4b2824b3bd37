#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use forgecmd::crud::{CrudContext, Resource};
use forgecmd::{
    AttrType, Authorizable, Command, Errors, ProcessContext, ProcessError, Schema, Stalenessable, Validatable,
};
use forgecmd_auth::{Actor, Permission, PermissionPolicy, Role, RoleMap};
use forgecmd_core::{ActorId, Attributes};
use forgecmd_infra::InMemoryRecordStore;
use forgecmd_infra::jobs::{CommandEnvelope, Delay, JobId, JobScheduler, SchedulerError};
use forgecmd_observability::{LogConfig, LogFormat};
use serde_json::json;

/// Human-readable logs for the test binary; `RUST_LOG` still applies.
pub fn logging() {
    let config = LogConfig::from_env().with_format(LogFormat::Pretty).with_target(true);
    forgecmd_observability::tracing::init_with(&config);
}

/// `name` (string, required) and `tags` (list, default empty).
#[derive(Debug, Default)]
pub struct Tagged;

impl Validatable for Tagged {}
impl Authorizable for Tagged {}
impl Stalenessable for Tagged {}

impl Command for Tagged {
    type Output = ();
    const NAME: &'static str = "tagged";
    const TRANSACTIONAL: bool = false;

    fn schema() -> &'static Schema {
        Schema::cached::<Self>(|| {
            Schema::new()
                .required("name", AttrType::String)
                .with_default("tags", AttrType::Array, || json!([]))
        })
    }

    fn process(&mut self, _: &mut ProcessContext<'_>) -> Result<(), ProcessError> {
        Ok(())
    }
}

/// Preflight answers fixed at construction.
#[derive(Debug)]
pub struct Gate {
    pub allow: bool,
    pub stale: bool,
}

impl Gate {
    pub fn open() -> Self {
        Self { allow: true, stale: false }
    }

    pub fn denied() -> Self {
        Self { allow: false, stale: false }
    }

    pub fn stale() -> Self {
        Self { allow: true, stale: true }
    }
}

impl Validatable for Gate {
    fn validate(&mut self, attributes: &Attributes, errors: &mut Errors) {
        if attributes.bool("broken") == Some(true) {
            errors.add("broken", "invalid");
        }
    }
}

impl Authorizable for Gate {
    fn authorized(&mut self, _: &Attributes) -> bool {
        self.allow
    }
}

impl Stalenessable for Gate {
    fn stale(&mut self, _: &Attributes) -> bool {
        self.stale
    }
}

impl Command for Gate {
    type Output = &'static str;
    const NAME: &'static str = "gate";
    const TRANSACTIONAL: bool = false;

    fn schema() -> &'static Schema {
        Schema::cached::<Self>(|| Schema::new().attribute("broken", AttrType::Bool))
    }

    fn process(&mut self, _: &mut ProcessContext<'_>) -> Result<&'static str, ProcessError> {
        Ok("done")
    }
}

/// Records every submission instead of enqueueing it.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    pub submitted: Mutex<Vec<(CommandEnvelope, Option<Delay>)>>,
}

impl RecordingScheduler {
    pub fn calls(&self) -> Vec<(CommandEnvelope, Option<Delay>)> {
        self.submitted.lock().unwrap().clone()
    }
}

impl JobScheduler for RecordingScheduler {
    fn submit(&self, envelope: CommandEnvelope) -> Result<JobId, SchedulerError> {
        self.submitted.lock().unwrap().push((envelope, None));
        Ok(JobId::new())
    }

    fn submit_at(&self, envelope: CommandEnvelope, delay: Delay) -> Result<JobId, SchedulerError> {
        self.submitted.lock().unwrap().push((envelope, Some(delay)));
        Ok(JobId::new())
    }
}

pub struct Post;

impl Resource for Post {
    forgecmd::crud_names!("posts");
    const PARAM_KEY: &'static str = "post";

    fn schema() -> Schema {
        Schema::new()
            .required("title", AttrType::String)
            .attribute("body", AttrType::String)
            .attribute("author_id", AttrType::String)
            .with_default("tags", AttrType::Array, || json!([]))
    }

    fn validate(attributes: &Attributes, errors: &mut Errors) {
        if attributes.str("title").is_some_and(|t| t.len() > 80) {
            errors.add("title", "too_long");
        }
    }
}

pub fn editor() -> Actor {
    Actor::new(ActorId::new()).with_role(Role::new("editor"))
}

pub fn reader() -> Actor {
    Actor::new(ActorId::new()).with_role(Role::new("reader"))
}

/// Editors may do anything to posts; authors may touch their own.
pub fn crud_context() -> (CrudContext, Arc<InMemoryRecordStore>) {
    let store = Arc::new(InMemoryRecordStore::new().with_unique("posts", "title"));
    let roles = RoleMap::new().grant("editor", Permission::new("posts.*"));
    let policy = PermissionPolicy::new(roles).with_owner_field("author_id");
    (CrudContext::in_memory(store.clone(), Arc::new(policy)), store)
}
