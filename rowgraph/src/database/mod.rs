//!
//! Adapters turning driver rows into recordsets.
//!

#[cfg(feature = "postgres")]
pub mod postgres;
