//! # Cepline Core
//!
//! Foundational types shared by the cepline event processing crates.
//!
//! - **Values**: the dynamic attribute representation carried by events
//! - **Fields**: flat names or nested paths used to address attributes
//!
//! ## Quick Start
//!
//! ```rust
//! use cepline_core::{Field, PathSegment, Value};
//!
//! let reading = Value::map([("celsius", Value::Float(21.5))]);
//! let field = Field::path([PathSegment::key("reading"), PathSegment::key("celsius")]);
//!
//! let resolved = field.resolve_in(|name| (name == "reading").then_some(&reading));
//! assert_eq!(resolved.and_then(Value::as_float), Some(21.5));
//! ```
//!
//! ## See Also
//!
//! - [`cepline_runtime`](../cepline_runtime): events, windows and pattern operators

pub mod field;
pub mod value;

pub use field::{Field, PathSegment};
pub use value::Value;
