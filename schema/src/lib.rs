//! "Plain old data" representations of array structures: schema,
//! domain, dimension, and attribute.
//!
//! "Plain old data" is used to describe types which have no
//! constructors, destructors, or virtual member functions; values of
//! these types can be duplicated by copying bits. There is no direct
//! analogue in Rust, but the structures in this crate aim to capture
//! the spirit of it: they can be constructed, inspected, and
//! (de)serialized without touching any fragment's storage.
//!
//! ## Features
//!
//! * `proptest-strategies`: provides `proptest::arbitrary::Arbitrary`
//!   implementations for the structures in this crate.
//! * `serde`: provides `serde::Deserialize`/`serde::Serialize`
//!   implementations for the structures in this crate.

pub mod array;
