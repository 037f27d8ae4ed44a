//! Built-in validator for a practical subset of JSON Schema.
//!
//! Supported keywords: boolean schemas, `type`, `enum`, `const`,
//! `properties` (with `default` filling), `required`, `additionalProperties`,
//! `items`, `minItems`, `maxItems`, `minimum`, `maximum`, `exclusiveMinimum`,
//! `exclusiveMaximum`, `minLength`, `maxLength`, `allOf`, `anyOf`, `oneOf` and
//! `not`. Unknown keywords are ignored. Applications needing full draft support
//! can plug their own [`SchemaCompiler`].

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{SchemaCompiler, SchemaValidator, ValidationOutcome};
use crate::core::JobError;

/// Compiler for the built-in schema subset.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSchemaCompiler;

impl BasicSchemaCompiler {
    /// Create a compiler.
    pub const fn new() -> Self {
        Self
    }
}

impl SchemaCompiler for BasicSchemaCompiler {
    fn compile(&self, schema: &Value) -> Result<Arc<dyn SchemaValidator>, JobError> {
        let root = Node::compile(schema, "#")?;
        Ok(Arc::new(BasicValidator { root }))
    }
}

#[derive(Debug)]
struct BasicValidator {
    root: Node,
}

impl SchemaValidator for BasicValidator {
    fn validate(&self, value: &Value) -> ValidationOutcome {
        let mut data = value.clone();
        let mut errors = Vec::new();
        self.root.check(&mut data, "", &mut errors);
        if errors.is_empty() {
            ValidationOutcome::accepted(data)
        } else {
            ValidationOutcome::rejected(value.clone(), errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Self::Null),
            "boolean" => Some(Self::Boolean),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Null, Value::Null)
            | (Self::Boolean, Value::Bool(_))
            | (Self::Number, Value::Number(_))
            | (Self::String, Value::String(_))
            | (Self::Array, Value::Array(_))
            | (Self::Object, Value::Object(_)) => true,
            (Self::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        }
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn at(path: &str) -> &str {
    if path.is_empty() {
        "(root)"
    } else {
        path
    }
}

#[derive(Debug)]
enum Node {
    Bool(bool),
    Rules(Box<Rules>),
}

#[derive(Debug, Default)]
struct Rules {
    types: Option<Vec<JsonType>>,
    constant: Option<Value>,
    enumeration: Option<Vec<Value>>,
    properties: Vec<Property>,
    required: Vec<String>,
    additional: Option<Node>,
    items: Option<Node>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    exclusive_minimum: Option<f64>,
    exclusive_maximum: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    all_of: Vec<Node>,
    any_of: Vec<Node>,
    one_of: Vec<Node>,
    not: Option<Node>,
}

#[derive(Debug)]
struct Property {
    name: String,
    schema: Node,
    default: Option<Value>,
}

impl Node {
    fn compile(schema: &Value, path: &str) -> Result<Self, JobError> {
        match schema {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Object(obj) => Ok(Self::Rules(Box::new(Rules::compile(obj, path)?))),
            other => Err(JobError::InvalidSchema(format!(
                "{path}: schema must be a boolean or an object, found {}",
                type_of(other)
            ))),
        }
    }

    fn check(&self, value: &mut Value, path: &str, errors: &mut Vec<String>) {
        match self {
            Self::Bool(true) => {}
            Self::Bool(false) => errors.push(format!("{}: no value is allowed here", at(path))),
            Self::Rules(rules) => rules.check(value, path, errors),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        let mut scratch = value.clone();
        let mut errors = Vec::new();
        self.check(&mut scratch, "", &mut errors);
        errors.is_empty()
    }
}

fn compile_list(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Vec<Node>, JobError> {
    match obj.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, s)| Node::compile(s, &format!("{path}/{key}/{i}")))
            .collect(),
        Some(_) => Err(JobError::InvalidSchema(format!("{path}/{key}: expected an array"))),
    }
}

fn compile_optional(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<Node>, JobError> {
    obj.get(key)
        .map(|s| Node::compile(s, &format!("{path}/{key}")))
        .transpose()
}

fn number(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<f64>, JobError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| JobError::InvalidSchema(format!("{path}/{key}: expected a number"))),
    }
}

fn count(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<usize>, JobError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                JobError::InvalidSchema(format!("{path}/{key}: expected a non-negative integer"))
            }),
    }
}

impl Rules {
    fn compile(obj: &Map<String, Value>, path: &str) -> Result<Self, JobError> {
        let types = match obj.get("type") {
            None => None,
            Some(Value::String(name)) => Some(vec![parse_type(name, path)?]),
            Some(Value::Array(names)) => Some(
                names
                    .iter()
                    .map(|n| {
                        n.as_str().map_or_else(
                            || Err(JobError::InvalidSchema(format!("{path}/type: expected strings"))),
                            |name| parse_type(name, path),
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => {
                return Err(JobError::InvalidSchema(format!(
                    "{path}/type: expected a string or an array"
                )))
            }
        };

        let enumeration = match obj.get("enum") {
            None => None,
            Some(Value::Array(values)) => Some(values.clone()),
            Some(_) => return Err(JobError::InvalidSchema(format!("{path}/enum: expected an array"))),
        };

        let mut properties = Vec::new();
        match obj.get("properties") {
            None => {}
            Some(Value::Object(props)) => {
                for (name, schema) in props {
                    properties.push(Property {
                        name: name.clone(),
                        schema: Node::compile(schema, &format!("{path}/properties/{name}"))?,
                        default: schema.get("default").cloned(),
                    });
                }
            }
            Some(_) => {
                return Err(JobError::InvalidSchema(format!(
                    "{path}/properties: expected an object"
                )))
            }
        }

        let required = match obj.get("required") {
            None => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| {
                    n.as_str().map(str::to_owned).ok_or_else(|| {
                        JobError::InvalidSchema(format!("{path}/required: expected strings"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(JobError::InvalidSchema(format!("{path}/required: expected an array")))
            }
        };

        Ok(Self {
            types,
            constant: obj.get("const").cloned(),
            enumeration,
            properties,
            required,
            additional: compile_optional(obj, "additionalProperties", path)?,
            items: compile_optional(obj, "items", path)?,
            min_items: count(obj, "minItems", path)?,
            max_items: count(obj, "maxItems", path)?,
            minimum: number(obj, "minimum", path)?,
            maximum: number(obj, "maximum", path)?,
            exclusive_minimum: number(obj, "exclusiveMinimum", path)?,
            exclusive_maximum: number(obj, "exclusiveMaximum", path)?,
            min_length: count(obj, "minLength", path)?,
            max_length: count(obj, "maxLength", path)?,
            all_of: compile_list(obj, "allOf", path)?,
            any_of: compile_list(obj, "anyOf", path)?,
            one_of: compile_list(obj, "oneOf", path)?,
            not: compile_optional(obj, "not", path)?,
        })
    }

    fn check(&self, value: &mut Value, path: &str, errors: &mut Vec<String>) {
        if let Some(types) = &self.types {
            if !types.iter().any(|t| t.matches(value)) {
                let expected: Vec<&str> = types.iter().map(|t| t.name()).collect();
                errors.push(format!(
                    "{}: expected {}, found {}",
                    at(path),
                    expected.join(" or "),
                    type_of(value)
                ));
                return;
            }
        }
        if let Some(constant) = &self.constant {
            if value != constant {
                errors.push(format!("{}: expected constant {constant}", at(path)));
            }
        }
        if let Some(allowed) = &self.enumeration {
            if !allowed.contains(value) {
                errors.push(format!("{}: value is not one of the allowed values", at(path)));
            }
        }

        match value {
            Value::Number(n) => {
                if let Some(x) = n.as_f64() {
                    self.check_number(x, path, errors);
                }
            }
            Value::String(s) => {
                let len = s.chars().count();
                if self.min_length.is_some_and(|min| len < min) {
                    errors.push(format!("{}: string is too short", at(path)));
                }
                if self.max_length.is_some_and(|max| len > max) {
                    errors.push(format!("{}: string is too long", at(path)));
                }
            }
            Value::Array(items) => {
                if self.min_items.is_some_and(|min| items.len() < min) {
                    errors.push(format!("{}: expected at least {} items", at(path), self.min_items.unwrap_or(0)));
                }
                if self.max_items.is_some_and(|max| items.len() > max) {
                    errors.push(format!("{}: expected at most {} items", at(path), self.max_items.unwrap_or(0)));
                }
                if let Some(schema) = &self.items {
                    for (i, item) in items.iter_mut().enumerate() {
                        schema.check(item, &format!("{path}/{i}"), errors);
                    }
                }
            }
            Value::Object(map) => self.check_object(map, path, errors),
            Value::Null | Value::Bool(_) => {}
        }

        for schema in &self.all_of {
            schema.check(value, path, errors);
        }
        if !self.any_of.is_empty() && !self.any_of.iter().any(|s| s.accepts(value)) {
            errors.push(format!("{}: value does not match any allowed schema", at(path)));
        }
        if !self.one_of.is_empty() {
            let matched = self.one_of.iter().filter(|s| s.accepts(value)).count();
            if matched != 1 {
                errors.push(format!(
                    "{}: value must match exactly one schema, matched {matched}",
                    at(path)
                ));
            }
        }
        if let Some(not) = &self.not {
            if not.accepts(value) {
                errors.push(format!("{}: value matches a forbidden schema", at(path)));
            }
        }
    }

    fn check_number(&self, x: f64, path: &str, errors: &mut Vec<String>) {
        if self.minimum.is_some_and(|min| x < min) {
            errors.push(format!("{}: {x} is below the minimum", at(path)));
        }
        if self.maximum.is_some_and(|max| x > max) {
            errors.push(format!("{}: {x} is above the maximum", at(path)));
        }
        if self.exclusive_minimum.is_some_and(|min| x <= min) {
            errors.push(format!("{}: {x} must be greater than the exclusive minimum", at(path)));
        }
        if self.exclusive_maximum.is_some_and(|max| x >= max) {
            errors.push(format!("{}: {x} must be less than the exclusive maximum", at(path)));
        }
    }

    fn check_object(&self, map: &mut Map<String, Value>, path: &str, errors: &mut Vec<String>) {
        for property in &self.properties {
            if !map.contains_key(&property.name) {
                if let Some(default) = &property.default {
                    map.insert(property.name.clone(), default.clone());
                }
            }
            if let Some(child) = map.get_mut(&property.name) {
                property
                    .schema
                    .check(child, &format!("{path}/{}", property.name), errors);
            }
        }
        for name in &self.required {
            if !map.contains_key(name) {
                errors.push(format!("{}: missing required property `{name}`", at(path)));
            }
        }
        if let Some(additional) = &self.additional {
            for (key, child) in map.iter_mut() {
                if !self.properties.iter().any(|p| &p.name == key) {
                    additional.check(child, &format!("{path}/{key}"), errors);
                }
            }
        }
    }
}

fn parse_type(name: &str, path: &str) -> Result<JsonType, JobError> {
    JsonType::parse(name)
        .ok_or_else(|| JobError::InvalidSchema(format!("{path}/type: unknown type `{name}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(schema: Value, value: Value) -> ValidationOutcome {
        BasicSchemaCompiler::new().compile(&schema).unwrap().validate(&value)
    }

    #[test]
    fn test_true_accepts_everything() {
        assert!(validate(json!(true), json!({"any": [1, "x"]})).success);
        assert!(!validate(json!(false), json!(null)).success);
    }

    #[test]
    fn test_array_of_numbers() {
        let schema = json!({"type": "array", "items": {"type": "number"}});
        assert!(validate(schema.clone(), json!([1, 2, 3.5])).success);

        let outcome = validate(schema, json!(["1", 2]));
        assert!(!outcome.success);
        assert_eq!(outcome.errors, vec!["/0: expected number, found string".to_string()]);
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        assert!(validate(json!({"type": "integer"}), json!(3.0)).success);
        assert!(!validate(json!({"type": "integer"}), json!(3.5)).success);
    }

    #[test]
    fn test_required_and_defaults() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "retries": {"type": "integer", "default": 3}},
            "required": ["name"],
            "additionalProperties": false
        });
        let outcome = validate(schema.clone(), json!({"name": "build"}));
        assert!(outcome.success);
        assert_eq!(outcome.data, json!({"name": "build", "retries": 3}));

        let outcome = validate(schema.clone(), json!({}));
        assert!(!outcome.success);
        assert!(outcome.errors[0].contains("missing required property `name`"));

        assert!(!validate(schema, json!({"name": "x", "extra": 1})).success);
    }

    #[test]
    fn test_combinators() {
        let schema = json!({"anyOf": [{"type": "string"}, {"type": "number", "minimum": 10}]});
        assert!(validate(schema.clone(), json!("x")).success);
        assert!(validate(schema.clone(), json!(12)).success);
        assert!(!validate(schema, json!(3)).success);

        let schema = json!({"oneOf": [{"type": "number"}, {"type": "integer"}]});
        assert!(validate(schema.clone(), json!(1.5)).success);
        assert!(!validate(schema, json!(1)).success);

        assert!(!validate(json!({"not": {"type": "null"}}), json!(null)).success);
    }

    #[test]
    fn test_enum_const_and_lengths() {
        assert!(validate(json!({"enum": ["a", "b"]}), json!("a")).success);
        assert!(!validate(json!({"enum": ["a", "b"]}), json!("c")).success);
        assert!(!validate(json!({"const": 1}), json!(2)).success);
        assert!(!validate(json!({"minLength": 2}), json!("a")).success);
        assert!(!validate(json!({"maxItems": 1}), json!([1, 2])).success);
    }

    #[test]
    fn test_invalid_schemas_are_rejected() {
        let compiler = BasicSchemaCompiler::new();
        assert!(compiler.compile(&json!("string")).is_err());
        assert!(compiler.compile(&json!({"type": "thing"})).is_err());
        assert!(compiler.compile(&json!({"required": "name"})).is_err());
    }
}
