//! statute-eval: evaluates rule specifications.
//!
//! A [`RulesEngine`] evaluates one [`RuleSpec`](statute_core::RuleSpec)
//! per call against a [`ServiceProvider`], which supplies other services'
//! outputs, claims, case events and source tables. [`Services`] is the
//! in-process provider; it caches one engine per (service, law, date) and
//! can route services to remote engines.
//!
//! ```text
//! Services::evaluate(request)
//!   -> RulesEngine::evaluate
//!        claims -> requirements -> required actions -> coercion
//!        $references -> claims | locals | definitions | parameters
//!                       | outputs | overwrite | source | service
//! ```
//!
//! Every call returns its evaluation [`PathNode`] tree alongside the
//! outputs.

pub mod adapter;
pub mod claims;
pub mod context;
pub mod deps;
pub mod engine;
pub mod error;
pub mod numeric;
mod operation;
pub mod path;
mod resolve;
pub mod service;
mod source;

pub use claims::{
    CaseAccessor, Claim, ClaimAccessor, ClaimStatus, Event, InMemoryCases, InMemoryClaims,
};
pub use context::{Overwrite, RuleContext};
pub use engine::{EvaluateRequest, EvaluateResult, OutputValue, RulesEngine};
pub use error::EvalError;
pub use path::{value_tree, NodeKind, PathNode, ResolveType, ValueTreeEntry};
pub use service::{RuleResult, RuleService, ServiceProvider, ServiceRequest, Services, ServicesBuilder};
