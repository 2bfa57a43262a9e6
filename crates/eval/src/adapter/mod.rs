//! Remote [`RuleService`](crate::RuleService) implementations.
//!
//! Register one with [`ServicesBuilder::remote`](crate::ServicesBuilder::remote)
//! to route a service's evaluations off-process.

#[cfg(feature = "http")]
pub mod http;
