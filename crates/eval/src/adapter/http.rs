//! HTTP rule service: evaluates laws on a remote engine.
//!
//! Posts `{"data": {...}}` to `{base_url}/v0/evaluate` and reads the rule
//! result from the `data` field of the answer. Uses `ureq` (sync); every
//! failure surfaces as [`EvalError::Transport`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statute_core::Value;
use tracing::debug;

use crate::context::Overwrite;
use crate::error::EvalError;
use crate::path::PathNode;
use crate::service::{RuleResult, RuleService, ServiceRequest};

/// A [`RuleService`] backed by a remote engine.
///
/// - `auth_token` from the constructor or `STATUTE_SERVICE_<NAME>_AUTH_TOKEN`
/// - The request's service name is sent as-is
pub struct HttpRuleService {
    service: String,
    base_url: String,
    auth_token: Option<String>,
    agent: ureq::Agent,
}

#[derive(Serialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct Response<T> {
    data: T,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateBody<'a> {
    service: &'a str,
    law: &'a str,
    date: &'a str,
    parameters: &'a BTreeMap<String, Value>,
    input: &'a Overwrite,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a str>,
    approved: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateAnswer {
    #[serde(default)]
    input: BTreeMap<String, Value>,
    #[serde(default)]
    output: BTreeMap<String, Value>,
    requirements_met: bool,
    #[serde(default)]
    missing_required: bool,
    #[serde(default)]
    path: Option<PathNode>,
    #[serde(default)]
    rulespec_id: Option<String>,
}

impl HttpRuleService {
    pub fn new(service: &str, base_url: &str) -> Self {
        let env_key = format!("STATUTE_SERVICE_{}_AUTH_TOKEN", service.to_uppercase());
        HttpRuleService {
            service: service.to_string(),
            base_url: base_url.to_string(),
            auth_token: std::env::var(env_key).ok(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }

    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    /// `http://host:8080/` → `http://host:8080/v0/evaluate`
    pub fn endpoint(&self) -> String {
        format!("{}/v0/evaluate", self.base_url.trim_end_matches('/'))
    }

    fn transport(&self, message: String) -> EvalError {
        EvalError::Transport {
            service: self.service.clone(),
            message,
        }
    }
}

impl RuleService for HttpRuleService {
    fn evaluate(&self, request: &ServiceRequest) -> Result<RuleResult, EvalError> {
        let body = Envelope {
            data: EvaluateBody {
                service: &request.service,
                law: &request.law,
                date: &request.reference_date,
                parameters: &request.parameters,
                input: &request.overwrite,
                output: request.requested_output.as_deref(),
                approved: request.approved,
            },
        };
        let url = self.endpoint();
        debug!(url = %url, law = %request.law, "sending evaluate");

        let mut call = self.agent.post(&url);
        if let Some(token) = &self.auth_token {
            call = call.header("Authorization", &format!("Bearer {}", token));
        }
        let response = call.send_json(&body).map_err(|e| self.transport(e.to_string()))?;

        let answer: Response<EvaluateAnswer> = response
            .into_body()
            .read_json()
            .map_err(|e| self.transport(format!("failed to parse response as JSON: {}", e)))?;
        let data = answer.data;

        Ok(RuleResult {
            input: data.input,
            outputs: data.output,
            requirements_met: data.requirements_met,
            missing_required: data.missing_required,
            path: data.path,
            rule_spec_uuid: data.rulespec_id,
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        let svc = HttpRuleService::new("RvIG", "http://localhost:8081/");
        assert_eq!(svc.endpoint(), "http://localhost:8081/v0/evaluate");
        let svc = HttpRuleService::new("RvIG", "http://localhost:8081");
        assert_eq!(svc.endpoint(), "http://localhost:8081/v0/evaluate");
    }

    #[test]
    fn explicit_auth_token() {
        let svc = HttpRuleService::new("RvIG", "http://localhost").with_auth_token("secret");
        assert_eq!(svc.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn request_body_uses_wire_names() {
        let request = ServiceRequest::new("RvIG", "wet_brp", "2025-01-01")
            .parameter("BSN", "999993653")
            .requested("leeftijd");
        let body = Envelope {
            data: EvaluateBody {
                service: &request.service,
                law: &request.law,
                date: &request.reference_date,
                parameters: &request.parameters,
                input: &request.overwrite,
                output: request.requested_output.as_deref(),
                approved: request.approved,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"]["date"], "2025-01-01");
        assert_eq!(json["data"]["output"], "leeftijd");
        assert_eq!(json["data"]["parameters"]["BSN"], "999993653");
        assert_eq!(json["data"]["approved"], false);
    }

    #[test]
    fn answer_parses_camel_case() {
        let answer: Response<EvaluateAnswer> = serde_json::from_value(serde_json::json!({
            "data": {
                "output": {"leeftijd": 42},
                "requirementsMet": true,
                "missingRequired": false,
                "rulespecId": "abc"
            }
        }))
        .unwrap();
        assert!(answer.data.requirements_met);
        assert_eq!(answer.data.output["leeftijd"], Value::Int(42));
        assert_eq!(answer.data.rulespec_id.as_deref(), Some("abc"));
    }

    #[test]
    fn answer_path_with_direct_value_nodes() {
        let answer: Response<EvaluateAnswer> = serde_json::from_value(serde_json::json!({
            "data": {
                "output": {"allowance": 100},
                "requirementsMet": true,
                "path": {
                    "type": "root",
                    "name": "evaluation",
                    "children": [{
                        "type": "action",
                        "name": "Evaluate action for allowance",
                        "children": [{
                            "type": "direct_value",
                            "name": "Direct value assignment",
                            "result": 100,
                            "details": {"raw_value": 100}
                        }]
                    }]
                }
            }
        }))
        .unwrap();
        let path = answer.data.path.unwrap();
        let leaf = &path.children[0].children[0];
        assert_eq!(leaf.kind, crate::path::NodeKind::DirectValue);
        assert_eq!(leaf.result, Value::Int(100));
    }

    #[test]
    fn unreachable_host_is_transport_error() {
        let svc = HttpRuleService::new("RvIG", "http://127.0.0.1:1");
        let request = ServiceRequest::new("RvIG", "wet_brp", "2025-01-01");
        match svc.evaluate(&request) {
            Err(EvalError::Transport { service, .. }) => assert_eq!(service, "RvIG"),
            other => panic!("expected transport error, got {:?}", other),
        }
    }
}
