//! statute-core: rule specification model and value semantics.
//!
//! Provides the immutable data model a rule evaluation runs against:
//!
//! - [`Value`] -- runtime values, with the comparison and navigation rules
//!   shared by the engine and the tabular sources
//! - [`RuleSpec`] and its parts ([`Action`], [`ActionValue`], [`Condition`],
//!   [`Requirement`], [`PropertySpec`], ...) parsed from rule JSON
//! - [`RuleSpecRegistry`] -- selects the spec in force for a law on a date
//! - [`CoreError`] -- parsing, comparison and lookup errors

pub mod error;
pub mod registry;
pub mod spec;
pub mod value;

// ── Convenience re-exports ───────────────────────────────────────────

pub use error::CoreError;
pub use registry::RuleSpecRegistry;
pub use spec::{
    Action, ActionRequirement, ActionValue, Condition, OperationKind, OutputSpec, ParameterSpec,
    PropertyOrigin, PropertySpec, Requirement, RuleSpec, SelectOn, ServiceParameter,
    ServiceReference, SourceReference, Temporal, TypeSpec,
};
pub use value::{format_date, parse_date, RecordField, Value};
