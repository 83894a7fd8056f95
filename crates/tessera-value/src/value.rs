//! The dynamic [`Value`] sum type and typed objects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::map::OrderedMap;

/// An instance of a named object type: a type name plus its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedObject {
    /// Name of the object type (e.g. `Host`).
    #[serde(rename = "type")]
    pub type_name: String,
    /// Attribute values keyed by attribute name.
    #[serde(default)]
    pub attributes: OrderedMap,
}

impl TypedObject {
    pub fn new(type_name: impl Into<String>, attributes: OrderedMap) -> Self {
        Self {
            type_name: type_name.into(),
            attributes,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Copy of this object with the named attributes removed.
    pub fn without(&self, names: &[&str]) -> TypedObject {
        let attributes = self
            .attributes
            .iter()
            .filter(|(k, _)| !names.contains(k))
            .map(|(k, v)| (k, v.clone()))
            .collect();
        TypedObject::new(self.type_name.clone(), attributes)
    }

    pub fn into_map(self) -> OrderedMap {
        self.attributes
    }
}

/// A dynamic value.
///
/// The JSON encoding is adjacently tagged: `{"t": "str", "v": "x"}`. Maps keep
/// their insertion order on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(OrderedMap),
    Object(TypedObject),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&OrderedMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&TypedObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Consume the value as a map. Objects yield their attributes.
    pub fn into_map(self) -> Option<OrderedMap> {
        match self {
            Value::Map(map) => Some(map),
            Value::Object(obj) => Some(obj.attributes),
            _ => None,
        }
    }

    /// Look up a key on a map or an attribute on an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            Value::Object(obj) => obj.get(key),
            _ => None,
        }
    }

    /// Short lowercase name of the value's kind, used in error messages.
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "binary",
            Value::List(_) => "array",
            Value::Map(_) => "hash",
            Value::Object(_) => "object",
        }
    }

    /// Truthiness used by activity guards: everything except `Null`,
    /// `false` and empty strings, lists, maps and byte strings.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Int(_) | Value::Float(_) | Value::Object(_) => true,
        }
    }

    pub(crate) fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_nested(f)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => write!(f, "{map}"),
            Value::Object(obj) => write!(f, "{}{}", obj.type_name, obj.attributes),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<OrderedMap> for Value {
    fn from(map: OrderedMap) -> Self {
        Value::Map(map)
    }
}

impl From<TypedObject> for Value {
    fn from(obj: TypedObject) -> Self {
        Value::Object(obj)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, ip: &str) -> TypedObject {
        TypedObject::new(
            "Host",
            OrderedMap::from([("name", Value::from(name)), ("ip", Value::from(ip))]),
        )
    }

    #[test]
    fn test_numeric_equality() {
        assert_eq!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::Float(3.0), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Float(3.5));
        assert_ne!(Value::Int(1), Value::Bool(true));
        assert_ne!(Value::Str("1".into()), Value::Int(1));
    }

    #[test]
    fn test_object_equality_ignores_attribute_order() {
        let a = host("a", "1.1.1.1");
        let b = TypedObject::new(
            "Host",
            OrderedMap::from([("ip", Value::from("1.1.1.1")), ("name", Value::from("a"))]),
        );
        assert_eq!(Value::from(a.clone()), Value::from(b));

        let other_type = TypedObject::new("Guest", a.attributes.clone());
        assert_ne!(Value::from(a), Value::from(other_type));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Map(OrderedMap::new()).is_truthy());
        assert!(Value::from(0).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::from(host("a", "b")).is_truthy());
    }

    #[test]
    fn test_get_on_map_and_object() {
        let obj = Value::from(host("a", "1.1.1.1"));
        assert_eq!(obj.get("ip"), Some(&Value::from("1.1.1.1")));
        assert_eq!(obj.get("mac"), None);
        assert_eq!(Value::from(1).get("ip"), None);

        let map = obj.clone().into_map().unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_without() {
        let obj = TypedObject::new(
            "Host",
            OrderedMap::from([
                ("name", Value::from("a")),
                ("id", Value::from("H1")),
                ("ip", Value::from("1.1.1.1")),
            ]),
        );
        let stripped = obj.without(&["id"]);
        assert_eq!(stripped.attributes.keys().collect::<Vec<_>>(), vec!["name", "ip"]);
        assert_eq!(stripped.type_name, "Host");
    }

    #[test]
    fn test_wire_encoding() {
        let json = serde_json::to_value(Value::from("x")).unwrap();
        assert_eq!(json, serde_json::json!({"t": "str", "v": "x"}));

        let json = serde_json::to_value(Value::Null).unwrap();
        assert_eq!(json, serde_json::json!({"t": "null"}));

        let json = serde_json::to_value(Value::from(host("a", "1.1.1.1"))).unwrap();
        assert_eq!(json["t"], "object");
        assert_eq!(json["v"]["type"], "Host");
        assert_eq!(json["v"]["attributes"]["name"], serde_json::json!({"t": "str", "v": "a"}));

        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::from(host("a", "1.1.1.1")));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("plain").to_string(), "plain");
        assert_eq!(
            Value::List(vec![Value::from("a"), Value::from(2)]).to_string(),
            r#"["a", 2]"#
        );
        assert_eq!(
            Value::from(host("a", "b")).to_string(),
            r#"Host{"name": "a", "ip": "b"}"#
        );
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<&str>), Value::Null);
        assert_eq!(Value::from(Some(5)), Value::Int(5));
    }
}
