//! `$reference` resolution.
//!
//! A reference is looked up, in order, among the calculation-date pseudo
//! values, dotted paths into resolved values, claims, loop locals,
//! definitions, parameters, computed outputs and finally declared
//! properties (overwrite, source table, or another service). The first hit
//! wins; a reference nothing resolves is null.

use statute_core::{format_date, ActionValue, PropertyOrigin, PropertySpec, ServiceReference, Value};
use tracing::{debug, warn};

use crate::context::RuleContext;
use crate::engine::Evaluation;
use crate::error::EvalError;
use crate::path::{NodeKind, PathNode, ResolveType};
use crate::service::ServiceRequest;

impl Evaluation<'_> {
    /// Resolve a `$name` or `$name.segment...` reference.
    pub(crate) fn resolve_reference(&mut self, reference: &str) -> Result<Value, EvalError> {
        let path = reference.strip_prefix('$').unwrap_or(reference);
        self.trace.enter(
            PathNode::new(NodeKind::Resolve, format!("Resolving value: {}", reference))
                .with_detail("path", reference),
        );
        let (value, resolve_type) = self.resolve_path(path)?;

        let node = self.trace.current();
        node.result = value.clone();
        node.resolve_type = Some(resolve_type);
        self.trace.exit();

        self.ctx.resolved.insert(path.to_string(), value.clone());
        Ok(value)
    }

    fn resolve_path(&mut self, path: &str) -> Result<(Value, ResolveType), EvalError> {
        if let Some(value) = self.ctx.date_value(path) {
            return Ok((value, ResolveType::Definition));
        }

        if let Some((root, rest)) = path.split_once('.') {
            let base = self.resolve_reference(&format!("${}", root))?;
            let resolve_type = self
                .trace
                .current()
                .children
                .last()
                .and_then(|child| child.resolve_type)
                .unwrap_or(ResolveType::None);
            let value = rest
                .split('.')
                .try_fold(base, |value, segment| match value {
                    Value::Null => None,
                    value => Some(value.navigate(segment)),
                })
                .unwrap_or(Value::Null);
            return Ok((value, resolve_type));
        }

        let spec = self.spec;
        let property = spec.property(path);
        if let Some(property) = property {
            self.describe(property);
        }

        if let Some(claim) = self.ctx.claims.get(path) {
            debug!(path, claim = %claim.id, "resolved from claim");
            return Ok((claim.new_value.clone(), ResolveType::Claim));
        }
        if let Some(value) = self.ctx.local.get(path) {
            return Ok((value.clone(), ResolveType::Local));
        }
        if let Some(value) = self.ctx.definitions.get(path) {
            return Ok((value.clone(), ResolveType::Definition));
        }
        if let Some(value) = self.ctx.parameters.get(path) {
            return Ok((value.clone(), ResolveType::Parameter));
        }
        if let Some(value) = self.ctx.outputs.get(path) {
            return Ok((value.clone(), ResolveType::Output));
        }

        let Some(property) = property else {
            warn!(path, law = %spec.law, "no definition found for reference");
            return Ok((Value::Null, ResolveType::None));
        };

        if let Some(reference) = property.service_reference() {
            let overwritten = self
                .ctx
                .overwrite
                .get(&reference.service)
                .and_then(|fields| fields.get(&reference.field))
                .cloned();
            if let Some(value) = overwritten {
                debug!(path, service = %reference.service, "resolved from overwrite");
                return Ok((value, ResolveType::Overwrite));
            }
        }

        match &property.origin {
            PropertyOrigin::Source(source) => {
                if let Some(value) = self.resolve_source(source)? {
                    return Ok((value, ResolveType::Source));
                }
            }
            PropertyOrigin::Service(reference) => {
                let value = self.resolve_service(path, property, reference)?;
                return Ok((value, ResolveType::Service));
            }
            PropertyOrigin::None => {}
        }

        if property.required {
            self.ctx.missing_required = true;
            self.trace.current().required = true;
        }
        warn!(path, required = property.required, "no value found for property");
        Ok((Value::Null, ResolveType::None))
    }

    fn describe(&mut self, property: &PropertySpec) {
        let node = self.trace.current();
        if let Some(type_name) = &property.type_name {
            node.details.insert("type".to_string(), type_name.as_str().into());
        }
        if let Some(type_spec) = &property.type_spec {
            if let Ok(json) = serde_json::to_value(type_spec) {
                node.details.insert("type_spec".to_string(), json);
            }
        }
        node.required = property.required;
    }

    // ── Cross-service ────────────────────────────────────────────

    /// Ask another service for one of its outputs. Results are memoized for
    /// the rest of the call; a null answer still counts as resolved.
    fn resolve_service(
        &mut self,
        path: &str,
        property: &PropertySpec,
        reference: &ServiceReference,
    ) -> Result<Value, EvalError> {
        let mut parameters = self.ctx.parameters.clone();
        for param in &reference.parameters {
            let value = self.evaluate_value(&ActionValue::text(&param.reference))?;
            parameters.insert(param.name.clone(), value);
        }

        let temporal_reference = property.temporal.as_ref().and_then(|t| t.reference.as_deref());
        let reference_date = match temporal_reference {
            Some(r) => self.evaluate_value(&ActionValue::text(r))?.as_date(),
            None => None,
        }
        .map(format_date)
        .unwrap_or_else(|| format_date(self.ctx.calculation_date));

        let key = RuleContext::cache_key(path, &parameters, &reference_date);
        if let Some(value) = self.ctx.cache.get(&key) {
            debug!(key = %key, "cross-service result from cache");
            return Ok(value.clone());
        }

        self.trace.enter(
            PathNode::new(
                NodeKind::ServiceEvaluation,
                format!("Service call: {}.{}", reference.service, reference.law),
            )
            .with_detail("service", reference.service.as_str())
            .with_detail("law", reference.law.as_str())
            .with_detail("field", reference.field.as_str())
            .with_detail("reference_date", reference_date.as_str())
            .with_detail("parameters", Value::Map(parameters.clone()).to_json())
            .with_detail("path", format!("${}", path)),
        );

        let request = ServiceRequest {
            service: reference.service.clone(),
            law: reference.law.clone(),
            parameters,
            reference_date,
            overwrite: self.ctx.overwrite.clone(),
            requested_output: Some(reference.field.clone()),
            approved: self.ctx.approved,
        };
        debug!(service = %request.service, law = %request.law, field = %reference.field, "calling service");
        let result = self.provider.evaluate(&request)?;

        let value = result.outputs.get(&reference.field).cloned().unwrap_or(Value::Null);
        if result.missing_required {
            self.ctx.missing_required = true;
        }
        let node = self.trace.current();
        node.result = value.clone();
        if let Some(path) = result.path {
            self.trace.attach(path);
        }
        self.trace.exit();

        self.ctx.cache.insert(key, value.clone());
        Ok(value)
    }
}
