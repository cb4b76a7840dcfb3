//! # Ranger Core - Shared Foundations for the Ranger Lakehouse Service
//!
//! This crate provides the cross-cutting vocabulary used by every Ranger
//! component: structured errors with validated codes, recovery strategies,
//! per-request diagnostics, the logical type system, and the query
//! context/result types that flow between the protocol gateway, the query
//! engine, and the storage layer.
//!
//! ## Key Components
//!
//! - **Structured Errors**: `RangerError` values carrying a validated code,
//!   context map, suggestions, recovery actions, and a captured stack
//! - **Recovery**: per-component retry strategies with capped exponential
//!   backoff and jitter
//! - **Diagnostics**: per-request operation collectors with JSON reports
//! - **Type System**: primitive and composite logical types with strict
//!   validation and round-trippable rendering
//! - **Component Seam**: the `Component` trait implemented by every
//!   long-lived server component managed by the loader

pub mod codes;
pub mod component;
pub mod diagnostics;
pub mod error;
pub mod query;
pub mod recovery;
pub mod schema;
pub mod types;

pub use component::Component;
pub use error::{ContextValue, ErrorCode, IntoStructured, RangerError, RecoveryAction};
pub use query::{QueryContext, QueryResult};
pub use schema::{ColumnSpec, TableSchema};
pub use types::DataType;

/// Result alias used throughout the Ranger crates.
pub type Result<T> = std::result::Result<T, RangerError>;

/// Database name substituted when a query context carries an empty one.
pub const DEFAULT_DATABASE: &str = "default";

/// Synthetic read-only database exposing registry-backed tables.
pub const SYSTEM_DATABASE: &str = "system";
