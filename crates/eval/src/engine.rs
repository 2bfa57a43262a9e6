//! The rules engine: one rule specification, evaluated per call.
//!
//! An evaluation runs in four steps:
//!
//! 1. claims for the `BSN` parameter are loaded into the call's context;
//! 2. requirements are checked, short-circuiting on the first decisive
//!    member or as soon as a required value is missing;
//! 3. if they hold, the required actions are evaluated in order and each
//!    result is coerced to its declared output shape;
//! 4. if a required value was missing at any point, every output is
//!    discarded and `requirements_met` is forced to false.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use statute_core::{
    parse_date, ActionRequirement, Requirement, RuleSpec, Temporal, TypeSpec, Value,
};
use tracing::{debug, warn};

use crate::context::{Overwrite, RuleContext};
use crate::deps::required_actions;
use crate::error::EvalError;
use crate::numeric::coerce;
use crate::path::{NodeKind, PathNode, Trace};
use crate::service::{RuleResult, ServiceProvider, ServiceRequest};

// ──────────────────────────────────────────────
// Request and result
// ──────────────────────────────────────────────

/// Inputs of one evaluation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluateRequest {
    pub parameters: BTreeMap<String, Value>,
    /// `YYYY-MM-DD`.
    pub reference_date: String,
    pub overwrite: Overwrite,
    pub requested_output: Option<String>,
    pub approved: bool,
}

impl EvaluateRequest {
    pub fn new(reference_date: &str) -> Self {
        EvaluateRequest {
            reference_date: reference_date.to_string(),
            ..EvaluateRequest::default()
        }
    }

    pub fn parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn overwrite(mut self, service: &str, field: &str, value: impl Into<Value>) -> Self {
        self.overwrite
            .entry(service.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
        self
    }

    pub fn requested(mut self, output: &str) -> Self {
        self.requested_output = Some(output.to_string());
        self
    }

    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }
}

impl From<ServiceRequest> for EvaluateRequest {
    fn from(r: ServiceRequest) -> Self {
        EvaluateRequest {
            parameters: r.parameters,
            reference_date: r.reference_date,
            overwrite: r.overwrite,
            requested_output: r.requested_output,
            approved: r.approved,
        }
    }
}

/// A computed output with its declared metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputValue {
    pub value: Value,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub type_spec: TypeSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<Temporal>,
}

/// Outcome of one evaluation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluateResult {
    /// Every `$` reference resolved during the call.
    pub input: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, OutputValue>,
    pub requirements_met: bool,
    pub path: PathNode,
    pub missing_required: bool,
}

impl EvaluateResult {
    /// Raw output values.
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.outputs
            .iter()
            .map(|(k, o)| (k.clone(), o.value.clone()))
            .collect()
    }

    pub fn into_rule_result(self, rule_spec_uuid: Option<String>) -> RuleResult {
        RuleResult {
            outputs: self.values(),
            input: self.input,
            requirements_met: self.requirements_met,
            missing_required: self.missing_required,
            path: Some(self.path),
            rule_spec_uuid,
        }
    }
}

// ──────────────────────────────────────────────
// Engine
// ──────────────────────────────────────────────

/// Evaluates one immutable rule specification. Cheap to share: all
/// per-call state lives in the call.
#[derive(Debug, Clone)]
pub struct RulesEngine {
    spec: Arc<RuleSpec>,
}

impl RulesEngine {
    pub fn new(spec: Arc<RuleSpec>) -> Self {
        RulesEngine { spec }
    }

    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    pub fn evaluate(
        &self,
        provider: &dyn ServiceProvider,
        request: EvaluateRequest,
    ) -> Result<EvaluateResult, EvalError> {
        let spec: &RuleSpec = &self.spec;
        let date = parse_date(&request.reference_date)
            .filter(|_| request.reference_date.len() == 10)
            .ok_or_else(|| EvalError::InvalidReferenceDate {
                value: request.reference_date.clone(),
            })?;

        for param in spec.parameters.iter().filter(|p| p.required) {
            if !request.parameters.contains_key(&param.name) {
                warn!(parameter = %param.name, law = %spec.law, "required parameter not provided");
            }
        }
        debug!(
            service = %spec.service,
            law = %spec.law,
            date = %request.reference_date,
            requested = request.requested_output.as_deref().unwrap_or(""),
            "evaluating rules"
        );

        let ctx = RuleContext::new(
            &spec.definitions,
            request.parameters,
            request.overwrite,
            date,
            request.approved,
        );
        let mut eval = Evaluation {
            spec,
            provider,
            ctx,
            trace: Trace::new(PathNode::new(NodeKind::Root, "evaluation")),
        };
        eval.load_claims();

        let requirements_met = eval.check_requirements()?;

        let mut outputs = BTreeMap::new();
        if requirements_met {
            let actions = required_actions(request.requested_output.as_deref(), &spec.actions)?;
            for action in actions {
                let Some(name) = action.output.as_deref() else {
                    continue;
                };
                let value = eval.evaluate_output(name, action)?;
                eval.ctx.outputs.insert(name.to_string(), value.clone());
                outputs.insert(name.to_string(), output_value(spec, name, value));
                if eval.ctx.missing_required {
                    warn!(output = name, "missing required values, stopping");
                    break;
                }
            }
        }

        let Evaluation { ctx, trace, .. } = eval;
        let mut requirements_met = requirements_met;
        if ctx.missing_required {
            warn!(law = %spec.law, "missing required values, discarding outputs");
            outputs.clear();
            requirements_met = false;
        }
        if outputs.is_empty() {
            debug!(law = %spec.law, "no output values computed");
        }

        Ok(EvaluateResult {
            input: ctx.resolved,
            outputs,
            requirements_met,
            path: trace.finish(),
            missing_required: ctx.missing_required,
        })
    }
}

fn output_value(spec: &RuleSpec, name: &str, value: Value) -> OutputValue {
    match spec.output(name) {
        Some(out) => OutputValue {
            value,
            type_name: out.type_name.clone().unwrap_or_else(|| "unknown".to_string()),
            description: out.description.clone(),
            type_spec: out.type_spec.clone(),
            temporal: out.temporal.clone(),
        },
        None => OutputValue {
            value,
            type_name: "unknown".to_string(),
            description: None,
            type_spec: TypeSpec::default(),
            temporal: None,
        },
    }
}

// ──────────────────────────────────────────────
// Per-call evaluation
// ──────────────────────────────────────────────

/// State of one evaluation call: the spec being evaluated, where to find
/// other services and data, the context and the trace being built.
pub(crate) struct Evaluation<'a> {
    pub(crate) spec: &'a RuleSpec,
    pub(crate) provider: &'a dyn ServiceProvider,
    pub(crate) ctx: RuleContext<'a>,
    pub(crate) trace: Trace,
}

impl<'a> Evaluation<'a> {
    /// Load claims for the `BSN` parameter: identity-wide claims first,
    /// then service/law claims replacing same-key entries.
    fn load_claims(&mut self) {
        let bsn = match self.ctx.parameters.get("BSN").and_then(Value::as_str) {
            Some(bsn) => bsn.to_string(),
            None => return,
        };
        let Some(claims) = self.provider.claims() else {
            return;
        };
        let only_approved = self.ctx.approved;

        match claims.claims_for_identity(&bsn, only_approved, true) {
            Ok(list) => {
                for claim in list {
                    self.ctx.claims.insert(claim.key.clone(), claim);
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to load claims");
                return;
            }
        }
        match claims.claims_for_service_law(&bsn, &self.spec.service, &self.spec.law, only_approved, true) {
            Ok(by_key) => self.ctx.claims.extend(by_key),
            Err(e) => warn!(error = %e, "failed to load service claims"),
        }
        debug!(count = self.ctx.claims.len(), "claims loaded");
    }

    fn check_requirements(&mut self) -> Result<bool, EvalError> {
        let spec = self.spec;
        self.trace
            .enter(PathNode::new(NodeKind::Requirements, "Check all requirements"));
        let mut met = true;
        for requirement in &spec.requirements {
            if !self.requirement(requirement)? {
                met = false;
                break;
            }
        }
        self.trace.current().result = Value::Bool(met);
        self.trace.exit();
        Ok(met)
    }

    fn requirement(&mut self, requirement: &Requirement) -> Result<bool, EvalError> {
        let (name, members, all) = match requirement {
            Requirement::AllOf(m) => ("Check ALL conditions", m, true),
            Requirement::AnyOf(m) => ("Check OR conditions", m, false),
        };
        self.trace.enter(PathNode::new(NodeKind::Requirement, name));

        let mut result = all;
        for member in members {
            let value = match member {
                ActionRequirement::Requirement(nested) => self.requirement(nested)?,
                ActionRequirement::Action(action) => {
                    self.trace
                        .enter(PathNode::new(NodeKind::Requirement, "Test condition"));
                    let value = self.evaluate_action(action)?.is_truthy();
                    self.trace.current().result = Value::Bool(value);
                    self.trace.exit();
                    value
                }
            };
            if value != all {
                result = value;
                break;
            }
            if self.ctx.missing_required {
                warn!("missing required values, stopping requirement check");
                break;
            }
        }

        self.trace.current().result = Value::Bool(result);
        self.trace.exit();
        Ok(result)
    }

    /// Evaluate one top-level action, honouring an overwrite of the output
    /// for this service, and coerce the result.
    fn evaluate_output(&mut self, name: &str, action: &statute_core::Action) -> Result<Value, EvalError> {
        let spec = self.spec;
        self.trace.enter(PathNode::new(
            NodeKind::Action,
            format!("Evaluate action for {}", name),
        ));

        let overwritten = self
            .ctx
            .overwrite
            .get(&spec.service)
            .and_then(|fields| fields.get(name))
            .filter(|v| !v.is_null())
            .cloned();
        let raw = match overwritten {
            Some(value) => {
                debug!(service = %spec.service, output = name, "using overwritten output");
                value
            }
            None => self.evaluate_action(action)?,
        };

        let value = match spec.output(name) {
            Some(out) => coerce(raw, &out.type_spec),
            None => raw,
        };
        debug!(output = name, value = %value, "computed output");
        self.trace.current().result = value.clone();
        self.trace.exit();
        Ok(value)
    }
}
