//! Attribute schema: declared, typed command fields with factory defaults.
//!
//! A command type declares an ordered list of [`FieldDecl`]s. Construction
//! resolves that list against caller [`Input`] into an [`Attributes`]
//! mapping:
//!
//! - explicit values win over the positional source mapping
//! - a declared field absent from the input takes a *freshly produced*
//!   default, or stays absent
//! - every value is coerced the way decoded request parameters are
//!   (`"42"` → `42` for integers, `""` → null for non-string scalars)
//!
//! Presence is not enforced here; required fields are checked by the
//! validation engine.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{AttributeError, AttributeResult, value_kind};
use crate::record::Record;

/// Canonical key → value mapping of a command instance.
pub type AttributeMap = Map<String, Value>;

/// Zero-argument function producing a fresh default value per instance.
pub type DefaultFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// Type tag of a declared attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    Any,
    String,
    Integer,
    Float,
    Bool,
    /// RFC 3339 timestamp, normalised to UTC.
    Time,
    Array,
    Hash,
}

const TRUE_STRINGS: [&str; 7] = ["1", "on", "t", "true", "y", "yes", "checked"];
const FALSE_STRINGS: [&str; 6] = ["0", "off", "f", "false", "n", "no"];

impl AttrType {
    pub fn as_str(self) -> &'static str {
        match self {
            AttrType::Any => "any",
            AttrType::String => "string",
            AttrType::Integer => "integer",
            AttrType::Float => "float",
            AttrType::Bool => "bool",
            AttrType::Time => "time",
            AttrType::Array => "array",
            AttrType::Hash => "hash",
        }
    }

    /// Coerce a raw value to this type. Null is always accepted.
    ///
    /// On failure the original value is handed back so the caller can
    /// report what it actually received.
    pub fn coerce(self, value: Value) -> Result<Value, Value> {
        let already_typed = matches!(
            (self, &value),
            (_, Value::Null)
                | (AttrType::Any, _)
                | (AttrType::String, Value::String(_))
                | (AttrType::Array, Value::Array(_))
                | (AttrType::Hash, Value::Object(_))
                | (AttrType::Bool, Value::Bool(_))
        );
        if already_typed {
            return Ok(value);
        }

        let coerced = match self {
            AttrType::String => match &value {
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            AttrType::Integer => coerce_integer(&value),
            AttrType::Float => coerce_float(&value),
            AttrType::Bool => coerce_bool(&value),
            AttrType::Time => coerce_time(&value),
            AttrType::Any | AttrType::Array | AttrType::Hash => None,
        };

        coerced.ok_or(value)
    }
}

impl core::fmt::Display for AttrType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn blank_string(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim)
}

fn coerce_integer(value: &Value) -> Option<Value> {
    if let Some(s) = blank_string(value) {
        if s.is_empty() {
            return Some(Value::Null);
        }
        if let Ok(i) = s.parse::<i64>() {
            return Some(Value::from(i));
        }
        return s.parse::<f64>().ok().and_then(whole_number);
    }
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n.as_f64().and_then(whole_number),
        _ => None,
    }
}

fn whole_number(f: f64) -> Option<Value> {
    (f.is_finite() && f.fract() == 0.0).then(|| Value::from(f as i64))
}

fn coerce_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(_) => {
            let s = blank_string(value)?;
            if s.is_empty() {
                return Some(Value::Null);
            }
            s.parse::<f64>().ok()
        }
        _ => None,
    }?;
    Number::from_f64(f).map(Value::Number)
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            if s.is_empty() {
                Some(Value::Null)
            } else if TRUE_STRINGS.contains(&s.as_str()) {
                Some(Value::Bool(true))
            } else if FALSE_STRINGS.contains(&s.as_str()) {
                Some(Value::Bool(false))
            } else {
                None
            }
        }
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(Value::Bool(true)),
            Some(0) => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_time(value: &Value) -> Option<Value> {
    let s = blank_string(value)?;
    if s.is_empty() {
        return Some(Value::Null);
    }
    let parsed = DateTime::parse_from_rfc3339(s).ok()?;
    Some(Value::String(
        parsed
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
    ))
}

/// Declaration of one named, typed field on a command type.
#[derive(Clone)]
pub struct FieldDecl {
    name: String,
    ty: AttrType,
    required: bool,
    default: Option<DefaultFactory>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, ty: AttrType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: None,
        }
    }

    /// Mark the field as required; enforced as a presence rule at validation.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a default factory. It runs once per constructed instance, so
    /// mutable defaults (lists, maps) are never shared.
    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(factory));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> AttrType {
        self.ty
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    fn coerce(&self, raw: Value) -> AttributeResult<Value> {
        self.ty.coerce(raw).map_err(|found| AttributeError::Coercion {
            field: self.name.clone(),
            expected: self.ty,
            found: value_kind(&found).to_string(),
        })
    }

    fn produce_default(&self) -> AttributeResult<Option<Value>> {
        let Some(factory) = &self.default else {
            return Ok(None);
        };
        self.ty
            .coerce(factory())
            .map(Some)
            .map_err(|found| AttributeError::InvalidDefault {
                field: self.name.clone(),
                expected: self.ty,
                found: value_kind(&found).to_string(),
            })
    }
}

impl core::fmt::Debug for FieldDecl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FieldDecl")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("required", &self.required)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Shape of a field as seen by a request-parameter filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermittedField {
    Scalar(String),
    /// Array-typed field; the filter must allow repeated values for the key.
    List(String),
}

impl PermittedField {
    pub fn name(&self) -> &str {
        match self {
            PermittedField::Scalar(name) | PermittedField::List(name) => name,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, PermittedField::List(_))
    }
}

/// Ordered list of field declarations attached to a command type.
///
/// Subtypes start from their parent's schema with [`Schema::inherit`] and
/// append; declarations are additive.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Arc<Vec<FieldDecl>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a subtype schema from the parent's declarations.
    pub fn inherit(parent: &Schema) -> Self {
        parent.clone()
    }

    /// Memoise one schema per type `T` for the life of the process.
    ///
    /// `build` runs outside the cache lock, so it may itself call `cached`
    /// for a parent type.
    pub fn cached<T: 'static>(build: impl FnOnce() -> Schema) -> &'static Schema {
        static CACHE: OnceLock<RwLock<HashMap<TypeId, &'static Schema>>> = OnceLock::new();

        let cache = CACHE.get_or_init(Default::default);
        let key = TypeId::of::<T>();
        if let Some(schema) = cache.read().ok().and_then(|map| map.get(&key).copied()) {
            return schema;
        }

        let built: &'static Schema = Box::leak(Box::new(build()));
        match cache.write() {
            Ok(mut map) => *map.entry(key).or_insert(built),
            Err(_) => built,
        }
    }

    /// Register a field. Redeclaring an existing name refines it in place.
    pub fn declare(mut self, decl: FieldDecl) -> Self {
        let fields = Arc::make_mut(&mut self.fields);
        match fields.iter_mut().find(|f| f.name == decl.name) {
            Some(existing) => *existing = decl,
            None => fields.push(decl),
        }
        self
    }

    pub fn attribute(self, name: impl Into<String>, ty: AttrType) -> Self {
        self.declare(FieldDecl::new(name, ty))
    }

    pub fn required(self, name: impl Into<String>, ty: AttrType) -> Self {
        self.declare(FieldDecl::new(name, ty).required())
    }

    pub fn with_default<F>(self, name: impl Into<String>, ty: AttrType, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.declare(FieldDecl::new(name, ty).default_with(factory))
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared field names for filtering untrusted input.
    pub fn permitted_fields(&self) -> Vec<PermittedField> {
        self.fields
            .iter()
            .map(|f| match f.ty {
                AttrType::Array => PermittedField::List(f.name.clone()),
                _ => PermittedField::Scalar(f.name.clone()),
            })
            .collect()
    }

    /// Resolve caller input into a concrete attribute mapping.
    pub fn construct(&self, input: impl Into<Input>) -> AttributeResult<Attributes> {
        let merged = input.into().merge()?;
        self.resolve(&merged)
    }

    /// Resolve an already-merged mapping (keys not declared are ignored).
    pub fn resolve(&self, merged: &AttributeMap) -> AttributeResult<Attributes> {
        let mut values = AttributeMap::new();
        for decl in self.fields.iter() {
            let resolved = match merged.get(&decl.name) {
                Some(raw) => Some(decl.coerce(raw.clone())?),
                None => decl.produce_default()?,
            };
            if let Some(value) = resolved {
                values.insert(decl.name.clone(), value);
            }
        }

        Ok(Attributes {
            schema: self.clone(),
            values,
        })
    }

    /// Copy the declared subset of a record's current fields (plus its id
    /// when `id` is declared).
    pub fn attributes_from_record(&self, record: &dyn Record) -> AttributeMap {
        let fields = record.fields();
        let mut out: AttributeMap = self
            .names()
            .filter_map(|name| fields.get(name).map(|v| (name.to_string(), v.clone())))
            .collect();
        if self.contains("id") {
            out.insert("id".into(), Value::String(record.record_id().to_string()));
        }
        out
    }
}

/// Caller input for construction: an optional positional source mapping
/// merged with explicit named values (explicit values win).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Input {
    source: Option<Value>,
    explicit: AttributeMap,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional source, e.g. a decoded request body.
    pub fn from_source(source: Value) -> Self {
        Self {
            source: Some(source),
            explicit: AttributeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.explicit.insert(key.into(), value.into());
        self
    }

    pub fn extend(mut self, values: AttributeMap) -> Self {
        self.explicit.extend(values);
        self
    }

    /// Combine source and explicit values into one raw mapping.
    pub fn merge(self) -> AttributeResult<AttributeMap> {
        let mut combined = match self.source {
            None | Some(Value::Null) => AttributeMap::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(AttributeError::NotAMapping {
                    found: value_kind(&other),
                });
            }
        };
        combined.extend(self.explicit);
        Ok(combined)
    }
}

impl From<AttributeMap> for Input {
    fn from(explicit: AttributeMap) -> Self {
        Self {
            source: None,
            explicit,
        }
    }
}

impl From<Value> for Input {
    fn from(source: Value) -> Self {
        Self::from_source(source)
    }
}

/// Resolved attributes of one command instance.
///
/// Only fields that were supplied or defaulted are present; everything else
/// reads as absent.
#[derive(Debug, Clone)]
pub struct Attributes {
    schema: Schema,
    values: AttributeMap,
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Attributes {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Whether the field was supplied or defaulted (even as null).
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Non-null value of a field.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn value_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values.get_mut(name)
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.value(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(Value::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(Value::as_bool)
    }

    pub fn array(&self, name: &str) -> Option<&Vec<Value>> {
        self.value(name).and_then(Value::as_array)
    }

    pub fn hash(&self, name: &str) -> Option<&AttributeMap> {
        self.value(name).and_then(Value::as_object)
    }

    pub fn time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.str(name)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Explicit setter; coerces like construction does.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> AttributeResult<()> {
        let decl = self
            .schema
            .field(name)
            .ok_or_else(|| AttributeError::unknown(name))?;
        let coerced = decl.coerce(value.into())?;
        self.values.insert(name.to_string(), coerced);
        Ok(())
    }

    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// The mapping minus the given keys.
    pub fn without(&self, names: &[&str]) -> AttributeMap {
        self.values
            .iter()
            .filter(|(k, _)| !names.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn as_map(&self) -> &AttributeMap {
        &self.values
    }

    pub fn into_map(self) -> AttributeMap {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_defaults() -> Schema {
        Schema::new()
            .with_default("name", AttrType::String, || json!("John Doe"))
            .with_default("age", AttrType::Integer, || json!(25))
            .with_default("metadata", AttrType::Hash, || json!({ "status": "pending" }))
            .with_default("tags", AttrType::Array, || json!(["default"]))
            .with_default("created_at", AttrType::Time, || json!(Utc::now()))
            .attribute("optional_field", AttrType::String)
    }

    #[test]
    fn defaults_are_produced_per_instance() {
        let schema = with_defaults();
        let mut a = schema.construct(Input::new()).unwrap();
        let b = schema.construct(Input::new()).unwrap();

        a.value_mut("tags").unwrap().as_array_mut().unwrap().push(json!("extra"));
        a.value_mut("metadata").unwrap()["status"] = json!("modified");

        assert_eq!(a.value("tags"), Some(&json!(["default", "extra"])));
        assert_eq!(b.value("tags"), Some(&json!(["default"])));
        assert_eq!(b.value("metadata"), Some(&json!({ "status": "pending" })));
        assert_eq!(b.i64("age"), Some(25));
        assert!(b.time("created_at").is_some());
    }

    #[test]
    fn fields_without_default_stay_absent() {
        let attrs = with_defaults().construct(Input::new()).unwrap();
        assert!(!attrs.contains("optional_field"));
        assert_eq!(attrs.str("optional_field"), None);
    }

    #[test]
    fn explicit_values_win_over_source() {
        let input = Input::from_source(json!({ "name": "from_hash", "age": 35 }))
            .with("name", "from_kwargs");
        let attrs = with_defaults().construct(input).unwrap();

        assert_eq!(attrs.str("name"), Some("from_kwargs"));
        assert_eq!(attrs.i64("age"), Some(35));
    }

    #[test]
    fn non_mapping_source_is_rejected() {
        let err = with_defaults().construct(json!(["a"])).unwrap_err();
        assert_eq!(err, AttributeError::NotAMapping { found: "array" });
    }

    #[test]
    fn params_style_coercion() {
        let schema = Schema::new()
            .attribute("count", AttrType::Integer)
            .attribute("ratio", AttrType::Float)
            .attribute("active", AttrType::Bool)
            .attribute("at", AttrType::Time);
        let attrs = schema
            .construct(json!({
                "count": " 42 ",
                "ratio": "0.5",
                "active": "yes",
                "at": "2024-05-01T10:00:00+02:00"
            }))
            .unwrap();

        assert_eq!(attrs.i64("count"), Some(42));
        assert_eq!(attrs.f64("ratio"), Some(0.5));
        assert_eq!(attrs.bool("active"), Some(true));
        assert_eq!(attrs.str("at"), Some("2024-05-01T08:00:00Z"));

        let blank = schema.construct(json!({ "count": "" })).unwrap();
        assert!(blank.contains("count"));
        assert_eq!(blank.i64("count"), None);
    }

    #[test]
    fn uncoercible_value_fails_construction() {
        let schema = Schema::new().attribute("count", AttrType::Integer);
        let err = schema.construct(json!({ "count": "abc" })).unwrap_err();
        assert!(matches!(err, AttributeError::Coercion { ref field, .. } if field == "count"));
    }

    #[test]
    fn malformed_default_fails_fast() {
        let schema = Schema::new().with_default("tags", AttrType::Array, || json!("oops"));
        let err = schema.construct(Input::new()).unwrap_err();
        assert!(matches!(err, AttributeError::InvalidDefault { .. }));
    }

    #[test]
    fn inheritance_is_additive_and_ordered() {
        let parent = Schema::new()
            .attribute("name", AttrType::String)
            .attribute("tags", AttrType::Array);
        let child = Schema::inherit(&parent)
            .attribute("extra_ids", AttrType::Array)
            .attribute("status", AttrType::String)
            .attribute("name", AttrType::String);

        assert_eq!(parent.len(), 2);
        assert_eq!(
            child.permitted_fields(),
            vec![
                PermittedField::Scalar("name".into()),
                PermittedField::List("tags".into()),
                PermittedField::List("extra_ids".into()),
                PermittedField::Scalar("status".into()),
            ]
        );
    }

    #[test]
    fn setter_coerces_and_rejects_unknown_fields() {
        let mut attrs = with_defaults().construct(Input::new()).unwrap();
        attrs.set("age", "30").unwrap();
        assert_eq!(attrs.i64("age"), Some(30));
        assert_eq!(attrs.set("nope", 1), Err(AttributeError::unknown("nope")));
    }

    #[test]
    fn cached_schema_is_built_once_per_type() {
        struct Marker;
        let first = Schema::cached::<Marker>(|| Schema::new().attribute("a", AttrType::Any));
        let second = Schema::cached::<Marker>(|| Schema::new());
        assert!(std::ptr::eq(first, second));
        assert_eq!(second.len(), 1);
    }

    mod coercion {
        use super::*;
        use proptest::prelude::*;

        fn attr_type() -> impl Strategy<Value = AttrType> {
            prop_oneof![
                Just(AttrType::Any),
                Just(AttrType::String),
                Just(AttrType::Integer),
                Just(AttrType::Float),
                Just(AttrType::Bool),
                Just(AttrType::Time),
                Just(AttrType::Array),
                Just(AttrType::Hash),
            ]
        }

        fn raw_value() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::from),
                any::<i64>().prop_map(Value::from),
                (-1.0e6f64..1.0e6).prop_map(Value::from),
                "[ ]?-?[0-9]{1,6}(\\.[0-9]{1,3})?[ ]?".prop_map(Value::from),
                prop::sample::select(vec!["yes", "off", "T", "", "maybe", "2024-05-01T10:00:00+02:00"])
                    .prop_map(Value::from),
                prop::collection::vec(any::<u8>().prop_map(Value::from), 0..3).prop_map(Value::from),
            ]
        }

        proptest! {
            #[test]
            fn coercion_is_idempotent(ty in attr_type(), value in raw_value()) {
                if let Ok(once) = ty.coerce(value) {
                    prop_assert_eq!(ty.coerce(once.clone()), Ok(once));
                }
            }

            #[test]
            fn padded_integer_strings_parse(n in any::<i64>(), pad in "[ ]{0,2}") {
                let raw = Value::from(format!("{pad}{n}{pad}"));
                prop_assert_eq!(AttrType::Integer.coerce(raw), Ok(Value::from(n)));
            }

            #[test]
            fn failed_coercion_returns_the_input(value in "[a-z]{2,8}") {
                prop_assume!(!TRUE_STRINGS.contains(&value.as_str()) && !FALSE_STRINGS.contains(&value.as_str()));
                for ty in [AttrType::Integer, AttrType::Float, AttrType::Bool, AttrType::Time, AttrType::Array] {
                    prop_assert_eq!(ty.coerce(Value::from(value.clone())), Err(Value::from(value.clone())));
                }
            }
        }
    }
}
