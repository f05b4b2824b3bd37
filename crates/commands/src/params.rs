//! Building command input from untrusted request parameters.
//!
//! Parameters are nested under the command's `PARAM_KEY`
//! (`{"post": {"title": ..}}`). Only declared fields pass, in the shape
//! their type allows; trusted `extra` values (the current user, a route id)
//! are merged on top.

use forgecmd_core::{AttrType, AttributeMap, PermittedField, Schema};
use serde_json::Value;

use crate::command::Command;

/// Filtered attributes for `C` from a decoded parameter tree.
///
/// A missing or blank `PARAM_KEY` yields `extra` alone.
pub fn attributes_from_params<C: Command>(params: &Value, extra: AttributeMap) -> AttributeMap {
    let scoped = match params.get(C::PARAM_KEY) {
        Some(Value::Object(scoped)) if !scoped.is_empty() => scoped,
        _ => return extra,
    };

    let mut attributes = if C::PERMIT_ALL_PARAMS {
        scoped.clone()
    } else {
        permit(C::schema(), scoped)
    };
    attributes.extend(extra);
    attributes
}

/// Keep declared fields whose value has an allowed shape.
pub fn permit(schema: &Schema, scoped: &AttributeMap) -> AttributeMap {
    schema
        .permitted_fields()
        .into_iter()
        .filter_map(|field| {
            let value = scoped.get(field.name())?;
            let allowed = match (&field, value) {
                (PermittedField::List(_), Value::Array(items)) => items.iter().all(is_scalar),
                (PermittedField::List(_), _) => false,
                (PermittedField::Scalar(name), Value::Object(_)) => {
                    schema.field(name).is_some_and(|decl| decl.ty() == AttrType::Hash)
                }
                (PermittedField::Scalar(_), other) => is_scalar(other),
            };
            allowed.then(|| (field.name().to_string(), value.clone()))
        })
        .collect()
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
