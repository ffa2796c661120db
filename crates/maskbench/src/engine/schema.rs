//! JSON Schema subset compiled into an arena of constraint nodes.
//!
//! Nodes are addressed by index so recognizer stacks stay cheap to clone.
//! The first five slots are fixed: any value, no value, and the
//! unconstrained string, array and object shapes that "any value" expands
//! into.

use super::SchemaRejected;
use serde_json::{Map, Value};

pub(crate) type NodeId = usize;

pub(crate) const ANY: NodeId = 0;
pub(crate) const NEVER: NodeId = 1;
pub(crate) const ANY_STRING: NodeId = 2;
pub(crate) const ANY_ARRAY: NodeId = 3;
pub(crate) const ANY_OBJECT: NodeId = 4;

/// Largest `required` list a node can track
pub const MAX_REQUIRED: usize = 64;

const ANNOTATIONS: &[&str] = &[
    "title",
    "description",
    "$schema",
    "$id",
    "$comment",
    "default",
    "examples",
    "deprecated",
    "readOnly",
    "writeOnly",
    "$defs",
    "definitions",
];

const SUPPORTED: &[&str] = &[
    "type",
    "const",
    "enum",
    "anyOf",
    "oneOf",
    "allOf",
    "properties",
    "required",
    "additionalProperties",
    "items",
    "minItems",
    "maxItems",
    "minLength",
    "maxLength",
];

const TYPE_NAMES: [&str; 7] = [
    "null", "boolean", "integer", "number", "string", "array", "object",
];

/// How unsupported keywords are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileMode {
    /// Reject the schema
    Strict,
    /// Ignore the keyword
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Any,
    Never,
    Null,
    Boolean,
    Integer,
    Number,
    String {
        min_len: usize,
        max_len: Option<usize>,
    },
    /// Exact compact serialization of a `const`/`enum` member
    Literal(Vec<u8>),
    Array {
        items: NodeId,
        min_items: usize,
        max_items: Option<usize>,
    },
    /// Property names are kept in their escaped JSON form
    Object {
        properties: Vec<(Vec<u8>, NodeId)>,
        required: Vec<Vec<u8>>,
        additional: NodeId,
    },
    Union(Vec<NodeId>),
}

/// Compiled constraint graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Grammar {
    /// Compile a schema document
    pub fn compile(schema: &Value, mode: CompileMode) -> Result<Self, SchemaRejected> {
        let mut compiler = Compiler::new(mode);
        let root = compiler.compile(schema, "#")?;
        Ok(Self {
            nodes: compiler.nodes,
            root,
        })
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) const fn root(&self) -> NodeId {
        self.root
    }

    /// Number of constraint nodes, fixed slots included
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the fixed slots are present in every grammar
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct Compiler {
    nodes: Vec<Node>,
    mode: CompileMode,
}

fn reject(path: &str, detail: impl std::fmt::Display) -> SchemaRejected {
    SchemaRejected::new(format!("{path}: {detail}"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn escaped_name(name: &str) -> Vec<u8> {
    let quoted = Value::String(name.to_string()).to_string().into_bytes();
    quoted[1..quoted.len() - 1].to_vec()
}

/// Every integer up to this magnitude has an exact `f64` spelling
const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

fn integral(value: &Value) -> Option<f64> {
    let f = value.as_f64()?;
    (f.fract() == 0.0 && f.abs() <= EXACT_F64_INT).then_some(f)
}

/// Compact texts that an instance equal to `value` serializes to.
///
/// A top-level integral number has both an integer and a float spelling
/// (`1` and `1.0`). Numbers nested inside array or object literals keep the
/// spelling they have in the schema.
fn literal_forms(value: &Value) -> Vec<Vec<u8>> {
    let mut forms = vec![value.to_string().into_bytes()];
    if let Some(f) = integral(value) {
        for alt in [Value::from(f as i64), Value::from(f)] {
            let text = alt.to_string().into_bytes();
            if !forms.contains(&text) {
                forms.push(text);
            }
        }
    }
    forms
}

fn same_literal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn is_constraint_keyword(key: &str, except: &[&str]) -> bool {
    !ANNOTATIONS.contains(&key) && !except.contains(&key)
}

impl Compiler {
    fn new(mode: CompileMode) -> Self {
        Self {
            nodes: vec![
                Node::Any,
                Node::Never,
                Node::String {
                    min_len: 0,
                    max_len: None,
                },
                Node::Array {
                    items: ANY,
                    min_items: 0,
                    max_items: None,
                },
                Node::Object {
                    properties: Vec::new(),
                    required: Vec::new(),
                    additional: ANY,
                },
            ],
            mode,
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn union(&mut self, mut alts: Vec<NodeId>) -> NodeId {
        alts.retain(|&a| a != NEVER);
        match alts.len() {
            0 => NEVER,
            1 => alts[0],
            _ if alts.contains(&ANY) => ANY,
            _ => self.push(Node::Union(alts)),
        }
    }

    fn compile(&mut self, schema: &Value, path: &str) -> Result<NodeId, SchemaRejected> {
        match schema {
            Value::Bool(true) => Ok(ANY),
            Value::Bool(false) => Ok(NEVER),
            Value::Object(obj) => self.compile_object(obj, path),
            other => Err(reject(
                path,
                format!("schema must be an object or boolean, found {}", json_kind(other)),
            )),
        }
    }

    fn compile_object(&mut self, obj: &Map<String, Value>, path: &str) -> Result<NodeId, SchemaRejected> {
        for key in obj.keys() {
            let known = ANNOTATIONS.contains(&key.as_str()) || SUPPORTED.contains(&key.as_str());
            if !known && self.mode == CompileMode::Strict {
                return Err(reject(path, format!("unsupported keyword {key:?}")));
            }
        }
        if obj.contains_key("$ref") {
            // lenient: the reference target is unknown, so anything goes
            return Ok(ANY);
        }

        if let Some(all_of) = obj.get("allOf") {
            let parts = all_of
                .as_array()
                .ok_or_else(|| reject(path, "allOf must be an array"))?;
            let alone = !obj.keys().any(|k| is_constraint_keyword(k, &["allOf"]));
            if parts.len() == 1 && alone {
                return self.compile(&parts[0], &format!("{path}/allOf/0"));
            }
            if self.mode == CompileMode::Strict {
                return Err(reject(path, "allOf is only supported with a single subschema"));
            }
        }

        let any_of = match (obj.get("anyOf"), obj.get("oneOf")) {
            (Some(_), Some(_)) if self.mode == CompileMode::Strict => {
                return Err(reject(path, "anyOf and oneOf together are unsupported"));
            }
            (Some(a), _) => Some(("anyOf", a)),
            (None, Some(o)) => Some(("oneOf", o)),
            (None, None) => None,
        };
        if let Some((keyword, alts)) = any_of {
            let alts = alts
                .as_array()
                .ok_or_else(|| reject(path, format!("{keyword} must be an array")))?;
            if alts.is_empty() {
                return Err(reject(path, format!("{keyword} must not be empty")));
            }
            let siblings = obj
                .keys()
                .any(|k| is_constraint_keyword(k, &["anyOf", "oneOf", "allOf"]));
            if siblings && self.mode == CompileMode::Strict {
                return Err(reject(path, format!("{keyword} combined with sibling keywords")));
            }
            let mut ids = Vec::with_capacity(alts.len());
            for (i, alt) in alts.iter().enumerate() {
                ids.push(self.compile(alt, &format!("{path}/{keyword}/{i}"))?);
            }
            return Ok(self.union(ids));
        }

        let types = self.types(obj, path)?;

        if obj.contains_key("const") || obj.contains_key("enum") {
            return self.compile_literals(obj, &types, path);
        }

        let unconstrained = types.len() == TYPE_NAMES.len()
            && !obj.keys().any(|k| SUPPORTED.contains(&k.as_str()) && k != "type");
        if unconstrained {
            return Ok(ANY);
        }

        let mut ids = Vec::with_capacity(types.len());
        for ty in &types {
            ids.push(self.compile_typed(ty, obj, path)?);
        }
        Ok(self.union(ids))
    }

    fn types(&self, obj: &Map<String, Value>, path: &str) -> Result<Vec<&'static str>, SchemaRejected> {
        let names: Vec<&str> = match obj.get("type") {
            None => return Ok(TYPE_NAMES.to_vec()),
            Some(Value::String(name)) => vec![name.as_str()],
            Some(Value::Array(list)) => {
                let mut names = Vec::with_capacity(list.len());
                for entry in list {
                    names.push(
                        entry
                            .as_str()
                            .ok_or_else(|| reject(path, "type list entries must be strings"))?,
                    );
                }
                names
            }
            Some(other) => {
                return Err(reject(
                    path,
                    format!("type must be a string or array, found {}", json_kind(other)),
                ))
            }
        };
        if names.is_empty() {
            return Err(reject(path, "type list must not be empty"));
        }
        let mut types = Vec::with_capacity(names.len());
        for name in names {
            let known = TYPE_NAMES
                .iter()
                .find(|&&t| t == name)
                .ok_or_else(|| reject(path, format!("unknown type {name:?}")))?;
            if !types.contains(known) {
                types.push(*known);
            }
        }
        if types.contains(&"number") {
            types.retain(|&t| t != "integer");
        }
        Ok(types)
    }

    fn compile_literals(
        &mut self,
        obj: &Map<String, Value>,
        types: &[&str],
        path: &str,
    ) -> Result<NodeId, SchemaRejected> {
        let type_ok = |v: &Value| {
            let kind = json_kind(v);
            types.contains(&kind)
                || (kind == "integer" && types.contains(&"number"))
                || (kind == "number" && integral(v).is_some() && types.contains(&"integer"))
        };
        let members: Vec<&Value> = match (obj.get("const"), obj.get("enum")) {
            (Some(c), Some(e)) => {
                let list = e.as_array().ok_or_else(|| reject(path, "enum must be an array"))?;
                if list.iter().any(|m| same_literal(m, c)) {
                    vec![c]
                } else {
                    Vec::new()
                }
            }
            (Some(c), None) => vec![c],
            (None, Some(e)) => {
                let list = e.as_array().ok_or_else(|| reject(path, "enum must be an array"))?;
                if list.is_empty() {
                    return Err(reject(path, "enum must not be empty"));
                }
                list.iter().collect()
            }
            (None, None) => Vec::new(),
        };
        let mut ids = Vec::with_capacity(members.len());
        for member in members.into_iter().filter(|m| type_ok(m)) {
            for form in literal_forms(member) {
                ids.push(self.push(Node::Literal(form)));
            }
        }
        Ok(self.union(ids))
    }

    fn compile_typed(
        &mut self,
        ty: &str,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<NodeId, SchemaRejected> {
        let node = match ty {
            "null" => Node::Null,
            "boolean" => Node::Boolean,
            "integer" => Node::Integer,
            "number" => Node::Number,
            "string" => {
                let min_len = count(obj, "minLength", path)?.unwrap_or(0);
                let max_len = count(obj, "maxLength", path)?;
                if min_len == 0 && max_len.is_none() {
                    return Ok(ANY_STRING);
                }
                if max_len.is_some_and(|max| max < min_len) {
                    return Ok(NEVER);
                }
                Node::String { min_len, max_len }
            }
            "array" => {
                let items = match obj.get("items") {
                    None => ANY,
                    Some(Value::Array(_)) if self.mode == CompileMode::Lenient => ANY,
                    Some(Value::Array(_)) => {
                        return Err(reject(path, "tuple-form items are unsupported"));
                    }
                    Some(schema) => self.compile(schema, &format!("{path}/items"))?,
                };
                let min_items = count(obj, "minItems", path)?.unwrap_or(0);
                let max_items = count(obj, "maxItems", path)?;
                if max_items.is_some_and(|max| max < min_items) {
                    return Ok(NEVER);
                }
                if items == NEVER {
                    if min_items > 0 {
                        return Ok(NEVER);
                    }
                    return Ok(self.push(Node::Array {
                        items,
                        min_items: 0,
                        max_items: Some(0),
                    }));
                }
                if items == ANY && min_items == 0 && max_items.is_none() {
                    return Ok(ANY_ARRAY);
                }
                Node::Array {
                    items,
                    min_items,
                    max_items,
                }
            }
            "object" => return self.compile_object_shape(obj, path),
            _ => return Err(reject(path, format!("unknown type {ty:?}"))),
        };
        Ok(self.push(node))
    }

    fn compile_object_shape(
        &mut self,
        obj: &Map<String, Value>,
        path: &str,
    ) -> Result<NodeId, SchemaRejected> {
        let mut properties = Vec::new();
        if let Some(props) = obj.get("properties") {
            let props = props
                .as_object()
                .ok_or_else(|| reject(path, "properties must be an object"))?;
            for (name, schema) in props {
                let id = self.compile(schema, &format!("{path}/properties/{name}"))?;
                properties.push((escaped_name(name), id));
            }
        }

        let mut required: Vec<Vec<u8>> = Vec::new();
        if let Some(req) = obj.get("required") {
            let req = req
                .as_array()
                .ok_or_else(|| reject(path, "required must be an array"))?;
            for name in req {
                let name = name
                    .as_str()
                    .ok_or_else(|| reject(path, "required entries must be strings"))?;
                let escaped = escaped_name(name);
                if !required.contains(&escaped) {
                    required.push(escaped);
                }
            }
        }
        if required.len() > MAX_REQUIRED {
            return Err(reject(
                path,
                format!("{} required properties exceed the limit of {MAX_REQUIRED}", required.len()),
            ));
        }

        let additional = match obj.get("additionalProperties") {
            None => ANY,
            Some(schema) => self.compile(schema, &format!("{path}/additionalProperties"))?,
        };

        // a required property that can never be present makes the object unsatisfiable
        for name in &required {
            let node = properties
                .iter()
                .find(|(p, _)| p == name)
                .map_or(additional, |(_, id)| *id);
            if node == NEVER {
                return Ok(NEVER);
            }
        }

        if properties.is_empty() && required.is_empty() && additional == ANY {
            return Ok(ANY_OBJECT);
        }
        Ok(self.push(Node::Object {
            properties,
            required,
            additional,
        }))
    }
}

fn count(obj: &Map<String, Value>, key: &str, path: &str) -> Result<Option<usize>, SchemaRejected> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| reject(path, format!("{key} must be a non-negative integer"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strict(schema: Value) -> Result<Grammar, SchemaRejected> {
        Grammar::compile(&schema, CompileMode::Strict)
    }

    fn lenient(schema: Value) -> Result<Grammar, SchemaRejected> {
        Grammar::compile(&schema, CompileMode::Lenient)
    }

    #[test]
    fn test_boolean_schemas() {
        assert_eq!(strict(json!(true)).unwrap().root(), ANY);
        assert_eq!(strict(json!(false)).unwrap().root(), NEVER);
        assert_eq!(strict(json!({})).unwrap().root(), ANY);
    }

    #[test]
    fn test_non_schema_rejected() {
        let err = strict(json!(3)).unwrap_err();
        assert!(err.detail.contains("object or boolean"));
    }

    #[test]
    fn test_unknown_type_rejected_in_both_modes() {
        assert!(strict(json!({"type": "bogus"})).unwrap_err().detail.contains("bogus"));
        assert!(lenient(json!({"type": "bogus"})).is_err());
    }

    #[test]
    fn test_unsupported_keyword_strict_vs_lenient() {
        let schema = json!({"type": "integer", "minimum": 3});
        let err = strict(schema.clone()).unwrap_err();
        assert_eq!(err.detail, "#: unsupported keyword \"minimum\"");
        let grammar = lenient(schema).unwrap();
        assert_eq!(grammar.node(grammar.root()), &Node::Integer);
    }

    #[test]
    fn test_annotations_are_ignored() {
        let grammar = strict(json!({"title": "t", "description": "d", "type": "null"})).unwrap();
        assert_eq!(grammar.node(grammar.root()), &Node::Null);
    }

    #[test]
    fn test_ref_is_any_when_lenient() {
        assert!(strict(json!({"$ref": "#/$defs/a"})).is_err());
        assert_eq!(lenient(json!({"$ref": "#/$defs/a"})).unwrap().root(), ANY);
    }

    #[test]
    fn test_type_list_becomes_union() {
        let grammar = strict(json!({"type": ["string", "null"]})).unwrap();
        match grammar.node(grammar.root()) {
            Node::Union(alts) => {
                assert_eq!(alts.len(), 2);
                assert!(alts.contains(&ANY_STRING));
            }
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn test_number_absorbs_integer() {
        let grammar = strict(json!({"type": ["integer", "number"]})).unwrap();
        assert_eq!(grammar.node(grammar.root()), &Node::Number);
    }

    #[test]
    fn test_enum_filtered_by_type() {
        let grammar = strict(json!({"type": "string", "enum": ["a", 1, null]})).unwrap();
        assert_eq!(grammar.node(grammar.root()), &Node::Literal(b"\"a\"".to_vec()));
    }

    #[test]
    fn test_integral_literal_has_both_spellings() {
        let grammar = strict(json!({"const": 2})).unwrap();
        match grammar.node(grammar.root()) {
            Node::Union(alts) => {
                let has = |text: &[u8]| alts.iter().any(|&a| grammar.node(a) == &Node::Literal(text.to_vec()));
                assert!(has(b"2"));
                assert!(has(b"2.0"));
            }
            other => panic!("expected union, got {other:?}"),
        }
        let grammar = strict(json!({"const": 2.5})).unwrap();
        assert_eq!(grammar.node(grammar.root()), &Node::Literal(b"2.5".to_vec()));
    }

    #[test]
    fn test_const_matches_numerically_equal_enum_member() {
        assert_ne!(strict(json!({"const": 1, "enum": [1.0]})).unwrap().root(), NEVER);
        assert_ne!(strict(json!({"type": "integer", "const": 3.0})).unwrap().root(), NEVER);
    }

    #[test]
    fn test_empty_enum_rejected() {
        assert!(strict(json!({"enum": []})).is_err());
    }

    #[test]
    fn test_const_outside_enum_is_never() {
        assert_eq!(strict(json!({"const": 1, "enum": [2, 3]})).unwrap().root(), NEVER);
    }

    #[test]
    fn test_object_shape() {
        let grammar = strict(json!({
            "type": "object",
            "properties": {"a\"b": {"type": "integer"}},
            "required": ["a\"b"],
            "additionalProperties": false
        }))
        .unwrap();
        match grammar.node(grammar.root()) {
            Node::Object {
                properties,
                required,
                additional,
            } => {
                assert_eq!(properties[0].0, b"a\\\"b".to_vec());
                assert_eq!(required.len(), 1);
                assert_eq!(*additional, NEVER);
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn test_required_but_forbidden_is_never() {
        let grammar = strict(json!({
            "type": "object",
            "required": ["x"],
            "additionalProperties": false
        }))
        .unwrap();
        assert_eq!(grammar.root(), NEVER);
    }

    #[test]
    fn test_anyof_with_siblings() {
        let schema = json!({"anyOf": [{"type": "null"}], "type": "string"});
        assert!(strict(schema.clone()).is_err());
        let grammar = lenient(schema).unwrap();
        assert_eq!(grammar.node(grammar.root()), &Node::Null);
    }

    #[test]
    fn test_single_allof_inlined() {
        let grammar = strict(json!({"allOf": [{"type": "boolean"}]})).unwrap();
        assert_eq!(grammar.node(grammar.root()), &Node::Boolean);
        assert!(strict(json!({"allOf": [{"type": "boolean"}, {"type": "null"}]})).is_err());
    }

    #[test]
    fn test_bad_counts_rejected() {
        assert!(strict(json!({"type": "string", "minLength": -1})).is_err());
        assert!(strict(json!({"type": "array", "maxItems": "3"})).is_err());
    }

    #[test]
    fn test_tuple_items() {
        let schema = json!({"type": "array", "items": [{"type": "null"}]});
        assert!(strict(schema.clone()).is_err());
        assert_eq!(lenient(schema).unwrap().root(), ANY_ARRAY);
    }

    #[test]
    fn test_properties_only_schema_keeps_other_types() {
        let grammar = strict(json!({"properties": {"a": {"type": "null"}}})).unwrap();
        match grammar.node(grammar.root()) {
            Node::Union(alts) => assert_eq!(alts.len(), 6),
            other => panic!("expected union, got {other:?}"),
        }
    }
}
