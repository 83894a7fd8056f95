//! Type expressions and object schemas.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValueError};
use crate::map::OrderedMap;
use crate::value::{TypedObject, Value};

/// Annotation key marking an object type as a managed resource.
pub const RESOURCE_ANNOTATION: &str = "Resource";

/// Entry of the resource annotation listing handler-produced attributes.
pub const PROVIDED_ATTRIBUTES: &str = "providedAttributes";

/// A type expression such as `String`, `Optional[Integer]` or `Host`.
///
/// Serialized as its textual form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Type {
    #[default]
    Any,
    Boolean,
    Integer,
    Float,
    String,
    Binary,
    Array(Box<Type>),
    Hash(Box<Type>),
    Optional(Box<Type>),
    /// Reference to a named object type.
    Named(String),
}

impl Type {
    /// Parse a type expression.
    pub fn parse(text: &str) -> Result<Type> {
        let text = text.trim();
        if let Some(open) = text.find('[') {
            let Some(inner) = text[open + 1..].strip_suffix(']') else {
                return Err(ValueError::InvalidType(text.to_string()));
            };
            let inner = Box::new(Type::parse(inner)?);
            return match &text[..open] {
                "Array" => Ok(Type::Array(inner)),
                "Hash" => Ok(Type::Hash(inner)),
                "Optional" => Ok(Type::Optional(inner)),
                _ => Err(ValueError::InvalidType(text.to_string())),
            };
        }

        let valid_name = !text.is_empty()
            && text
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
        if !valid_name {
            return Err(ValueError::InvalidType(text.to_string()));
        }

        Ok(match text {
            "Any" => Type::Any,
            "Boolean" => Type::Boolean,
            "Integer" => Type::Integer,
            "Float" => Type::Float,
            "String" => Type::String,
            "Binary" => Type::Binary,
            name => Type::Named(name.to_string()),
        })
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Optional(_))
    }

    /// Whether `value` is an instance of this type.
    ///
    /// Named types accept objects of that name and plain maps (which are
    /// coerced by [`ObjectType::assert_instance`]).
    pub fn is_instance(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Any, _) => true,
            (Type::Optional(_), Value::Null) => true,
            (Type::Optional(inner), v) => inner.is_instance(v),
            (Type::Boolean, Value::Bool(_)) => true,
            (Type::Integer, Value::Int(_)) => true,
            (Type::Float, Value::Float(_) | Value::Int(_)) => true,
            (Type::String, Value::Str(_)) => true,
            (Type::Binary, Value::Bytes(_)) => true,
            (Type::Array(inner), Value::List(items)) => items.iter().all(|v| inner.is_instance(v)),
            (Type::Hash(inner), Value::Map(map)) => map.values().all(|v| inner.is_instance(v)),
            (Type::Named(name), Value::Object(obj)) => obj.type_name == *name,
            (Type::Named(_), Value::Map(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("Any"),
            Type::Boolean => f.write_str("Boolean"),
            Type::Integer => f.write_str("Integer"),
            Type::Float => f.write_str("Float"),
            Type::String => f.write_str("String"),
            Type::Binary => f.write_str("Binary"),
            Type::Array(inner) => write!(f, "Array[{inner}]"),
            Type::Hash(inner) => write!(f, "Hash[{inner}]"),
            Type::Optional(inner) => write!(f, "Optional[{inner}]"),
            Type::Named(name) => f.write_str(name),
        }
    }
}

impl FromStr for Type {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self> {
        Type::parse(s)
    }
}

impl TryFrom<String> for Type {
    type Error = ValueError;

    fn try_from(s: String) -> Result<Self> {
        Type::parse(&s)
    }
}

impl From<Type> for String {
    fn from(ty: Type) -> Self {
        ty.to_string()
    }
}

/// A declared attribute of an [`ObjectType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: Type,
    /// Default value used when the attribute is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            value: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn is_required(&self) -> bool {
        !self.ty.is_optional() && self.value.is_none()
    }
}

/// Schema of a named object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectType {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub annotations: OrderedMap,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            annotations: OrderedMap::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Mark the listed attributes as produced by the resource handler.
    pub fn with_provided_attributes(mut self, names: &[&str]) -> Self {
        let provided = names.iter().map(|n| Value::from(*n)).collect::<Vec<_>>();
        self.annotations.insert(
            RESOURCE_ANNOTATION,
            Value::Map(OrderedMap::from([(PROVIDED_ATTRIBUTES, Value::List(provided))])),
        );
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes listed under the resource annotation's `providedAttributes`.
    pub fn provided_attributes(&self) -> Vec<&str> {
        self.annotations
            .get(RESOURCE_ANNOTATION)
            .and_then(|ann| ann.get(PROVIDED_ATTRIBUTES))
            .and_then(Value::as_list)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_provided(&self, name: &str) -> bool {
        self.provided_attributes().contains(&name)
    }

    /// Assert that `value` is an instance of this type, coercing maps to
    /// objects. Missing optional attributes are filled with their default or
    /// `Null`; the result lists attributes in declaration order.
    pub fn assert_instance(&self, label: &str, value: &Value) -> Result<TypedObject> {
        let attrs = match value {
            Value::Object(obj) if obj.type_name == self.name => &obj.attributes,
            Value::Map(map) => map,
            other => {
                let actual = match other {
                    Value::Object(obj) => obj.type_name.clone(),
                    v => v.type_label().to_string(),
                };
                return Err(ValueError::mismatch(label, self.name.clone(), actual));
            }
        };

        if let Some(unknown) = attrs.keys().find(|k| self.attribute(k).is_none()) {
            return Err(ValueError::NoSuchAttribute {
                type_name: self.name.clone(),
                name: unknown.to_string(),
            });
        }

        let mut out = OrderedMap::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            match attrs.get(&attr.name) {
                Some(v) if attr.ty.is_instance(v) => {
                    out.insert(attr.name.clone(), v.clone());
                }
                Some(v) => {
                    return Err(ValueError::mismatch(
                        format!("{label}.{}", attr.name),
                        attr.ty.to_string(),
                        v.type_label(),
                    ));
                }
                None if attr.is_required() => {
                    return Err(ValueError::MissingAttribute {
                        type_name: self.name.clone(),
                        name: attr.name.clone(),
                    });
                }
                None => {
                    out.insert(attr.name.clone(), attr.value.clone().unwrap_or_default());
                }
            }
        }
        Ok(TypedObject::new(self.name.clone(), out))
    }

    /// Materialize a desired-state object from a map of attribute values.
    ///
    /// Provided attributes are never part of a desired state and are skipped.
    pub fn new_instance(&self, values: &OrderedMap) -> Result<TypedObject> {
        let provided = self.provided_attributes();
        if let Some(unknown) = values
            .keys()
            .find(|k| self.attribute(k).is_none() && !provided.contains(k))
        {
            return Err(ValueError::NoSuchAttribute {
                type_name: self.name.clone(),
                name: unknown.to_string(),
            });
        }

        let mut out = OrderedMap::with_capacity(self.attributes.len());
        for attr in self.attributes.iter().filter(|a| !provided.contains(&a.name.as_str())) {
            let value = match (values.get(&attr.name), &attr.value) {
                (Some(v), _) if !v.is_null() || !attr.is_required() => v.clone(),
                (_, Some(default)) => default.clone(),
                _ if attr.ty.is_optional() => Value::Null,
                _ => {
                    return Err(ValueError::MissingAttribute {
                        type_name: self.name.clone(),
                        name: attr.name.clone(),
                    });
                }
            };
            if !attr.ty.is_instance(&value) {
                return Err(ValueError::mismatch(
                    format!("{}.{}", self.name, attr.name),
                    attr.ty.to_string(),
                    value.type_label(),
                ));
            }
            out.insert(attr.name.clone(), value);
        }
        Ok(TypedObject::new(self.name.clone(), out))
    }
}

/// A service or handler interface: a name and the methods it exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl Interface {
    pub fn new<I, S>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}
