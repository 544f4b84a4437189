//! Typed argument schemas for tasks.
//!
//! Each task declares an ordered list of [`Param`]s. At registration the list
//! is compiled into an [`ArgSchema`], which renders the JSON Schema shown to
//! the model and decodes the model's untyped payload into [`DecodedArgs`].
//! Decoding happens before any handler runs, so a missing field or a format
//! violation never leaves a partial side effect behind.

use std::collections::HashSet;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Number, Value};
use thiserror::Error;

use super::data_root::{DataRoot, PathViolation};

/// Primitive type of a task argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    /// A file or directory path, confined to the data root after decoding.
    Path,
    /// A flat object of string keys to scalar values.
    StringMap,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            Self::String | Self::Path => "string",
            Self::Integer => "integer",
            Self::StringMap => "object",
        }
    }
}

/// Declaration of a single named argument.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub default: Option<Value>,
    /// Regex the (string) value must match.
    pub pattern: Option<&'static str>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    /// May be absent even without a default.
    pub optional: bool,
}

impl Param {
    fn new(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            default: None,
            pattern: None,
            minimum: None,
            maximum: None,
            optional: false,
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    pub fn path(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Path, description)
    }

    pub fn string_map(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::StringMap, description)
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn minimum(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn maximum(mut self, maximum: i64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.optional
    }
}

/// A schema that failed to compile.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("parameter `{0}` is declared twice")]
    DuplicateParam(String),

    #[error("parameter `{param}` has an invalid pattern: {source}")]
    InvalidPattern {
        param: String,
        #[source]
        source: regex::Error,
    },

    #[error("parameter `{param}` has an invalid default: {reason}")]
    InvalidDefault { param: String, reason: String },
}

/// Payload rejected during decoding, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid argument `{field}`: {reason}")]
pub struct ArgumentError {
    pub field: String,
    pub reason: String,
}

impl ArgumentError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug)]
struct CompiledParam {
    param: Param,
    pattern: Option<Regex>,
}

/// Compiled, validated argument schema of one task.
#[derive(Debug)]
pub struct ArgSchema {
    params: Vec<CompiledParam>,
}

impl ArgSchema {
    pub fn compile(params: Vec<Param>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(params.len());

        for param in params {
            if !seen.insert(param.name) {
                return Err(SchemaError::DuplicateParam(param.name.to_string()));
            }

            let pattern = param
                .pattern
                .map(Regex::new)
                .transpose()
                .map_err(|source| SchemaError::InvalidPattern {
                    param: param.name.to_string(),
                    source,
                })?;

            let entry = CompiledParam { param, pattern };
            if let Some(default) = entry.param.default.clone() {
                entry
                    .coerce(default)
                    .map_err(|e| SchemaError::InvalidDefault {
                        param: entry.param.name.to_string(),
                        reason: e.reason,
                    })?;
            }
            compiled.push(entry);
        }

        Ok(Self { params: compiled })
    }

    /// JSON Schema object for the `parameters` field of a tool declaration.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for CompiledParam { param, .. } in &self.params {
            let mut property = Map::new();
            property.insert("type".to_string(), json!(param.kind.json_type()));
            property.insert("description".to_string(), json!(param.description));
            if let Some(pattern) = param.pattern {
                property.insert("pattern".to_string(), json!(pattern));
            }
            if let Some(minimum) = param.minimum {
                property.insert("minimum".to_string(), json!(minimum));
            }
            if let Some(maximum) = param.maximum {
                property.insert("maximum".to_string(), json!(maximum));
            }
            if let Some(default) = &param.default {
                property.insert("default".to_string(), default.clone());
            }
            if param.kind == ParamKind::StringMap {
                property.insert(
                    "additionalProperties".to_string(),
                    json!({"type": ["string", "number", "boolean"]}),
                );
            }
            properties.insert(param.name.to_string(), Value::Object(property));

            if param.is_required() {
                required.push(json!(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Coerce a raw payload into declared types, applying defaults.
    ///
    /// `null` counts as absent. Keys the schema does not declare are dropped.
    pub fn decode(&self, raw: &Map<String, Value>) -> Result<DecodedArgs, ArgumentError> {
        let mut values = Map::new();
        let mut paths = Vec::new();

        for entry in &self.params {
            let param = &entry.param;
            let supplied = raw.get(param.name).filter(|v| !v.is_null()).cloned();

            let value = match supplied.or_else(|| param.default.clone()) {
                Some(value) => entry.coerce(value)?,
                None if param.optional => continue,
                None => return Err(ArgumentError::new(param.name, "required field is missing")),
            };

            if param.kind == ParamKind::Path {
                paths.push(param.name);
            }
            values.insert(param.name.to_string(), value);
        }

        for key in raw.keys() {
            if !self.params.iter().any(|p| p.param.name == key) {
                tracing::debug!(field = %key, "Ignoring undeclared argument");
            }
        }

        Ok(DecodedArgs { values, paths })
    }
}

impl CompiledParam {
    fn coerce(&self, value: Value) -> Result<Value, ArgumentError> {
        let name = self.param.name;
        let coerced = match self.param.kind {
            ParamKind::String => Value::String(scalar_to_string(name, value)?),
            ParamKind::Path => {
                let path = scalar_to_string(name, value)?;
                if path.trim().is_empty() {
                    return Err(ArgumentError::new(name, "path must not be empty"));
                }
                Value::String(path.trim().to_string())
            }
            ParamKind::Integer => {
                let n = to_integer(name, &value)?;
                if let Some(minimum) = self.param.minimum {
                    if n < minimum {
                        return Err(ArgumentError::new(
                            name,
                            format!("must be at least {}, got {}", minimum, n),
                        ));
                    }
                }
                if let Some(maximum) = self.param.maximum {
                    if n > maximum {
                        return Err(ArgumentError::new(
                            name,
                            format!("must be at most {}, got {}", maximum, n),
                        ));
                    }
                }
                Value::Number(Number::from(n))
            }
            ParamKind::StringMap => match value {
                Value::Object(map) => {
                    let mut out = Map::new();
                    for (key, v) in map {
                        let v = scalar_to_string(name, v)?;
                        out.insert(key, Value::String(v));
                    }
                    Value::Object(out)
                }
                other => {
                    return Err(ArgumentError::new(name, format!("expected an object, got {}", other)))
                }
            },
        };

        if let (Some(regex), Value::String(s)) = (&self.pattern, &coerced) {
            if !regex.is_match(s) {
                return Err(ArgumentError::new(
                    name,
                    format!("`{}` does not match pattern {}", s, regex.as_str()),
                ));
            }
        }

        Ok(coerced)
    }
}

fn scalar_to_string(name: &str, value: Value) -> Result<String, ArgumentError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ArgumentError::new(name, format!("expected a string, got {}", other))),
    }
}

fn to_integer(name: &str, value: &Value) -> Result<i64, ArgumentError> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ArgumentError::new(name, format!("expected an integer, got {}", value)))
}

/// Arguments that passed schema decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedArgs {
    values: Map<String, Value>,
    paths: Vec<&'static str>,
}

impl DecodedArgs {
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Resolve every path argument against `root`, rewriting it to the absolute path.
    pub fn confine_paths(&mut self, root: &DataRoot) -> Result<(), PathViolation> {
        for name in &self.paths {
            if let Some(Value::String(raw)) = self.values.get(*name) {
                let resolved = root.resolve(raw)?;
                self.values.insert(
                    name.to_string(),
                    Value::String(resolved.to_string_lossy().into_owned()),
                );
            }
        }
        Ok(())
    }

    /// Deserialize into the task's typed argument struct.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn schema() -> ArgSchema {
        ArgSchema::compile(vec![
            Param::path("filename", "Input").pattern(r"\.json$"),
            Param::integer("num_files", "Count").minimum(1).default(10),
            Param::string("note", "Optional note").optional(),
        ])
        .expect("schema compiles")
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object payload")
    }

    #[test]
    fn json_schema_lists_only_fields_without_defaults_as_required() {
        let value = schema().to_json_schema();
        assert_eq!(value["type"], "object");
        assert_eq!(value["required"], json!(["filename"]));
        assert_eq!(value["properties"]["filename"]["type"], "string");
        assert_eq!(value["properties"]["filename"]["pattern"], r"\.json$");
        assert_eq!(value["properties"]["num_files"]["default"], 10);
        assert_eq!(value["properties"]["num_files"]["minimum"], 1);
    }

    #[test]
    fn decode_applies_defaults_and_skips_absent_optionals() {
        let args = schema()
            .decode(&payload(json!({"filename": "/data/contacts.json"})))
            .expect("decodes");
        assert_eq!(
            args.values(),
            &payload(json!({"filename": "/data/contacts.json", "num_files": 10}))
        );
    }

    #[test]
    fn decode_reports_missing_required_field() {
        let err = schema().decode(&payload(json!({"num_files": 3}))).unwrap_err();
        assert_eq!(err.field, "filename");
        assert_eq!(err.reason, "required field is missing");
    }

    #[test]
    fn null_counts_as_missing() {
        let err = schema()
            .decode(&payload(json!({"filename": null})))
            .unwrap_err();
        assert_eq!(err.field, "filename");
    }

    #[test]
    fn decode_rejects_pattern_mismatch() {
        let err = schema()
            .decode(&payload(json!({"filename": "/data/contacts.csv"})))
            .unwrap_err();
        assert_eq!(err.field, "filename");
        assert!(err.reason.contains("does not match"), "{}", err.reason);
    }

    #[test]
    fn integers_accept_numeric_strings_and_enforce_minimum() {
        let args = schema()
            .decode(&payload(json!({"filename": "a.json", "num_files": " 4 "})))
            .expect("decodes");
        assert_eq!(args.values()["num_files"], 4);

        let err = schema()
            .decode(&payload(json!({"filename": "a.json", "num_files": 0})))
            .unwrap_err();
        assert_eq!(err.field, "num_files");

        let err = schema()
            .decode(&payload(json!({"filename": "a.json", "num_files": "ten"})))
            .unwrap_err();
        assert!(err.reason.contains("expected an integer"));
    }

    #[test]
    fn integers_enforce_maximum() {
        let schema =
            ArgSchema::compile(vec![Param::integer("width", "Width").minimum(1).maximum(100)])
                .unwrap();
        assert_eq!(schema.to_json_schema()["properties"]["width"]["maximum"], 100);

        let args = schema.decode(&payload(json!({"width": 100}))).unwrap();
        assert_eq!(args.values()["width"], 100);

        let err = schema.decode(&payload(json!({"width": 100000}))).unwrap_err();
        assert_eq!(err.field, "width");
        assert!(err.reason.contains("at most 100"), "{}", err.reason);
    }

    #[test]
    fn string_map_stringifies_scalars() {
        let schema = ArgSchema::compile(vec![Param::string_map("filters", "Filters")]).unwrap();
        let args = schema
            .decode(&payload(json!({"filters": {"city": "Pune", "age": 30, "active": true}})))
            .unwrap();
        assert_eq!(
            args.values()["filters"],
            json!({"city": "Pune", "age": "30", "active": "true"})
        );

        let err = schema
            .decode(&payload(json!({"filters": {"nested": {"a": 1}}})))
            .unwrap_err();
        assert_eq!(err.field, "filters");
    }

    #[test]
    fn compile_rejects_duplicates_bad_patterns_and_bad_defaults() {
        assert!(matches!(
            ArgSchema::compile(vec![Param::string("a", ""), Param::string("a", "")]),
            Err(SchemaError::DuplicateParam(_))
        ));
        assert!(matches!(
            ArgSchema::compile(vec![Param::string("a", "").pattern("(")]),
            Err(SchemaError::InvalidPattern { .. })
        ));
        assert!(matches!(
            ArgSchema::compile(vec![Param::path("p", "").pattern(r"\.txt$").default("x.md")]),
            Err(SchemaError::InvalidDefault { .. })
        ));
    }

    #[test]
    fn confine_paths_rewrites_relative_paths_and_typed_decode_works() {
        #[derive(Deserialize)]
        struct Args {
            filename: std::path::PathBuf,
            num_files: usize,
        }

        let dir = tempfile::tempdir().unwrap();
        let root = DataRoot::new(dir.path());
        let mut args = schema()
            .decode(&payload(json!({"filename": "contacts.json"})))
            .unwrap();
        args.confine_paths(&root).unwrap();

        let typed: Args = args.into_typed().unwrap();
        assert_eq!(typed.filename, root.path().join("contacts.json"));
        assert_eq!(typed.num_files, 10);
    }

    #[test]
    fn confine_paths_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let root = DataRoot::new(dir.path());
        let mut args = schema()
            .decode(&payload(json!({"filename": "/etc/passwd.json"})))
            .unwrap();
        assert!(args.confine_paths(&root).is_err());
    }
}
