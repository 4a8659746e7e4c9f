//!
//! ```text
//!  recordset 0          recordset 1
//! |id|name|city|      |parent_id|value|
//! |--|----|----|      |---------|-----|
//!   |    |    \          |         |
//!   v    v     v         v         v
//! Person{..,address}--children: Vec<Line>
//! ```
//!
//! Binding of tabular recordsets to object graphs: sub-objects split off a
//! single row, children correlated across recordsets, self references
//! resolved within one, all through cached binding plans.
//!

extern crate self as rowgraph;

pub use rowgraph_macros::Record;
pub use record::Record;

pub mod cache;
pub mod children;
pub mod database;
pub mod graph;
pub mod identity;
pub mod mapping;
pub mod params;
pub mod plan;
pub mod prelude;
pub mod query;
pub mod record;
pub mod recordset;
pub mod source;
pub mod split;
pub mod value;

#[derive(thiserror::Error, Debug, Clone)]
pub enum RowGraphError {
    #[error("Ambiguous identity for {ty}: candidates {candidates:?}")]
    AmbiguousIdentity {
        ty: &'static str,
        candidates: Vec<&'static str>,
    },

    #[error("No identity member found for {ty}")]
    MissingIdentity { ty: &'static str },

    #[error("No parent reference member found for {ty}")]
    MissingParentReference { ty: &'static str },

    #[error("{ty} has no member named {name}")]
    UnknownMember { ty: &'static str, name: String },

    #[error("Member {member} of {ty} is read-only")]
    ReadOnlyMember {
        ty: &'static str,
        member: &'static str,
    },

    #[error("None of {holders:?} can hold a {target}")]
    MissingLink {
        target: &'static str,
        holders: Vec<&'static str>,
    },

    #[error("{ty} has no collection of {child}")]
    MissingCollection {
        ty: &'static str,
        child: &'static str,
    },

    #[error("{ty} has several collections of {child}: {candidates:?}")]
    AmbiguousCollection {
        ty: &'static str,
        child: &'static str,
        candidates: Vec<&'static str>,
    },

    #[error("Expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Cannot convert {value} into {ty}.{member}")]
    Conversion {
        ty: &'static str,
        member: &'static str,
        value: String,
    },

    #[error("{ty} with key {key} matches no parent")]
    UnmatchedChild { ty: &'static str, key: String },

    #[error("No preceding recordset of {ty} to attach children to")]
    MissingParentSet { ty: &'static str },

    #[error("Recordset {index} is declared twice")]
    DuplicateRecordset { index: usize },

    #[error("Result set {index} is missing or already taken")]
    MissingResultSet { index: usize },

    #[error("Source error: {0}")]
    Source(String),
}

pub type RowGraphResult<T> = Result<T, RowGraphError>;
