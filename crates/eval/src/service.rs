//! The cross-service evaluation contract and the local service registry.
//!
//! [`RuleService`] is what a rule engine calls to obtain another service's
//! output. [`Services`] implements it in-process on top of a
//! [`RuleSpecRegistry`]; [`crate::adapter::http::HttpRuleService`]
//! implements it over HTTP. The engine cannot tell them apart.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use statute_core::{parse_date, RuleSpecRegistry, Value};
use statute_storage::{Row, RowTable, SourceTables, Table};
use time::Date;
use tracing::debug;

use crate::claims::{CaseAccessor, ClaimAccessor};
use crate::context::Overwrite;
use crate::engine::{EvaluateRequest, EvaluateResult, RulesEngine};
use crate::error::EvalError;
use crate::path::PathNode;

// ──────────────────────────────────────────────
// Contract
// ──────────────────────────────────────────────

/// One request to evaluate a law as executed by a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub service: String,
    pub law: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    pub reference_date: String,
    #[serde(default)]
    pub overwrite: Overwrite,
    #[serde(default)]
    pub requested_output: Option<String>,
    #[serde(default)]
    pub approved: bool,
}

impl ServiceRequest {
    pub fn new(service: &str, law: &str, reference_date: &str) -> Self {
        ServiceRequest {
            service: service.to_string(),
            law: law.to_string(),
            parameters: BTreeMap::new(),
            reference_date: reference_date.to_string(),
            overwrite: Overwrite::new(),
            requested_output: None,
            approved: false,
        }
    }

    pub fn parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn requested(mut self, output: &str) -> Self {
        self.requested_output = Some(output.to_string());
        self
    }
}

/// What a rule service answers: raw output values plus the flags and
/// trace of the evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    #[serde(default)]
    pub input: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
    pub requirements_met: bool,
    #[serde(default)]
    pub missing_required: bool,
    #[serde(default)]
    pub path: Option<PathNode>,
    #[serde(default)]
    pub rule_spec_uuid: Option<String>,
}

/// Anything that can evaluate a law for a service.
pub trait RuleService: Send + Sync {
    fn evaluate(&self, request: &ServiceRequest) -> Result<RuleResult, EvalError>;
}

/// The environment a [`RulesEngine`] evaluates against: other services,
/// plus the data collaborators behind the resolution chain.
pub trait ServiceProvider: RuleService {
    fn claims(&self) -> Option<&dyn ClaimAccessor> {
        None
    }

    fn cases(&self) -> Option<&dyn CaseAccessor> {
        None
    }

    /// Rows of the virtual `laws` table.
    fn rules_table(&self) -> Vec<Row> {
        Vec::new()
    }

    /// A caller-provided source table of a service, if loaded.
    fn source_table(&self, _service: &str, _table: &str) -> Result<Option<Arc<dyn Table>>, EvalError> {
        Ok(None)
    }
}

// ──────────────────────────────────────────────
// Local registry
// ──────────────────────────────────────────────

type EngineKey = (String, String, Date);

/// In-process rule services backed by a spec registry.
///
/// Engines are cached per (service, law, reference date) and shared by
/// concurrent calls; every call gets its own evaluation state.
pub struct Services {
    registry: Arc<RuleSpecRegistry>,
    engines: RwLock<HashMap<EngineKey, Arc<RulesEngine>>>,
    sources: RwLock<HashMap<String, Arc<SourceTables>>>,
    remotes: HashMap<String, Box<dyn RuleService>>,
    claims: Option<Arc<dyn ClaimAccessor>>,
    cases: Option<Arc<dyn CaseAccessor>>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("specs", &self.registry.len())
            .field("remotes", &self.remotes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Services`].
pub struct ServicesBuilder {
    registry: Arc<RuleSpecRegistry>,
    remotes: HashMap<String, Box<dyn RuleService>>,
    claims: Option<Arc<dyn ClaimAccessor>>,
    cases: Option<Arc<dyn CaseAccessor>>,
}

impl ServicesBuilder {
    pub fn claims(mut self, claims: Arc<dyn ClaimAccessor>) -> Self {
        self.claims = Some(claims);
        self
    }

    pub fn cases(mut self, cases: Arc<dyn CaseAccessor>) -> Self {
        self.cases = Some(cases);
        self
    }

    /// Route every evaluation for `service` to `remote`.
    pub fn remote(mut self, service: &str, remote: Box<dyn RuleService>) -> Self {
        self.remotes.insert(service.to_string(), remote);
        self
    }

    pub fn build(self) -> Services {
        Services {
            registry: self.registry,
            engines: RwLock::new(HashMap::new()),
            sources: RwLock::new(HashMap::new()),
            remotes: self.remotes,
            claims: self.claims,
            cases: self.cases,
        }
    }
}

fn poisoned(what: &str) -> EvalError {
    EvalError::Accessor {
        message: format!("{} lock poisoned", what),
    }
}

impl Services {
    pub fn new(registry: RuleSpecRegistry) -> Self {
        Services::builder(registry).build()
    }

    pub fn builder(registry: RuleSpecRegistry) -> ServicesBuilder {
        ServicesBuilder {
            registry: Arc::new(registry),
            remotes: HashMap::new(),
            claims: None,
            cases: None,
        }
    }

    pub fn registry(&self) -> &RuleSpecRegistry {
        &self.registry
    }

    /// Evaluate locally, regardless of remote overrides.
    pub fn run(&self, request: &ServiceRequest) -> Result<EvaluateResult, EvalError> {
        let date = parse_date(&request.reference_date).ok_or_else(|| {
            EvalError::InvalidReferenceDate {
                value: request.reference_date.clone(),
            }
        })?;
        let engine = self.engine(&request.service, &request.law, date)?;
        engine.evaluate(self, EvaluateRequest::from(request.clone()))
    }

    /// The cached engine for a law as executed by a service on a date.
    pub fn engine(&self, service: &str, law: &str, date: Date) -> Result<Arc<RulesEngine>, EvalError> {
        let key = (service.to_string(), law.to_string(), date);
        if let Some(engine) = self.engines.read().map_err(|_| poisoned("engine"))?.get(&key) {
            return Ok(engine.clone());
        }

        let spec = self.registry.find(law, date, Some(service))?;
        debug!(service, law, uuid = %spec.uuid, "created rules engine");
        let engine = Arc::new(RulesEngine::new(spec));
        let mut engines = self.engines.write().map_err(|_| poisoned("engine"))?;
        Ok(engines.entry(key).or_insert(engine).clone())
    }

    /// Append rows to a service's source table, creating it if needed.
    pub fn set_source_table(&self, service: &str, table: &str, data: Box<dyn Table>) -> Result<(), EvalError> {
        let tables = {
            let mut sources = self.sources.write().map_err(|_| poisoned("source"))?;
            sources
                .entry(service.to_string())
                .or_insert_with(|| Arc::new(SourceTables::new()))
                .clone()
        };
        tables.insert(table, data)?;
        Ok(())
    }

    pub fn set_source_rows(&self, service: &str, table: &str, rows: Vec<Row>) -> Result<(), EvalError> {
        self.set_source_table(service, table, Box::new(RowTable::new(rows)))
    }

    pub fn reset_sources(&self) -> Result<(), EvalError> {
        self.sources.write().map_err(|_| poisoned("source"))?.clear();
        Ok(())
    }
}

impl RuleService for Services {
    fn evaluate(&self, request: &ServiceRequest) -> Result<RuleResult, EvalError> {
        if let Some(remote) = self.remotes.get(&request.service) {
            debug!(service = %request.service, law = %request.law, "routing to remote service");
            return remote.evaluate(request);
        }
        let date = parse_date(&request.reference_date).ok_or_else(|| {
            EvalError::InvalidReferenceDate {
                value: request.reference_date.clone(),
            }
        })?;
        let engine = self.engine(&request.service, &request.law, date)?;
        let uuid = engine.spec().uuid.clone();
        let result = engine.evaluate(self, EvaluateRequest::from(request.clone()))?;
        Ok(result.into_rule_result(Some(uuid)))
    }
}

impl ServiceProvider for Services {
    fn claims(&self) -> Option<&dyn ClaimAccessor> {
        self.claims.as_deref()
    }

    fn cases(&self) -> Option<&dyn CaseAccessor> {
        self.cases.as_deref()
    }

    fn rules_table(&self) -> Vec<Row> {
        self.registry.rules_table()
    }

    fn source_table(&self, service: &str, table: &str) -> Result<Option<Arc<dyn Table>>, EvalError> {
        let tables = match self.sources.read().map_err(|_| poisoned("source"))?.get(service) {
            Some(tables) => tables.clone(),
            None => return Ok(None),
        };
        Ok(tables.get(table)?)
    }
}
