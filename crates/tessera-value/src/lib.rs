//! Typed dynamic value model for Tessera.
//!
//! Everything that crosses the boundary between the workflow engine and a
//! plugin is a [`Value`]: activity inputs and outputs, handler results, and
//! the payload of every streaming RPC message. Object schemas are described
//! by [`ObjectType`] and carried alongside values so the engine can assert
//! that a handler returned what it promised.
//!
//! # Equality
//!
//! Comparison is *semantic*: maps and object attributes compare as key sets
//! regardless of insertion order, and an integer equals a float with the same
//! numeric value. The reconciler relies on this when deciding whether a
//! resource needs an update.
//!
//! ```rust,ignore
//! use tessera_value::{OrderedMap, Value};
//!
//! let a = Value::Map(OrderedMap::from([("x", Value::from(1)), ("y", Value::from("b"))]));
//! let b = Value::Map(OrderedMap::from([("y", Value::from("b")), ("x", Value::from(1.0))]));
//! assert_eq!(a, b);
//! ```

pub mod error;
pub mod map;
pub mod param;
pub mod types;
pub mod value;

pub use error::{Result, ValueError};
pub use map::OrderedMap;
pub use param::Parameter;
pub use types::{
    Attribute, Interface, ObjectType, PROVIDED_ATTRIBUTES, RESOURCE_ANNOTATION, Type,
};
pub use value::{TypedObject, Value};
