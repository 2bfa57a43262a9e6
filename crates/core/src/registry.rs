//! Registry of loaded rule specifications.
//!
//! The registry is built once and handed to whatever evaluates rules; it
//! answers "which version of this law is in force on this date".

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use time::Date;
use tracing::debug;

use crate::error::CoreError;
use crate::spec::RuleSpec;
use crate::value::{format_date, Value};

/// Loaded rule specifications, ordered by `valid_from`.
#[derive(Debug, Clone, Default)]
pub struct RuleSpecRegistry {
    specs: Vec<Arc<RuleSpec>>,
}

impl RuleSpecRegistry {
    pub fn new(specs: impl IntoIterator<Item = RuleSpec>) -> Self {
        let mut specs: Vec<Arc<RuleSpec>> = specs.into_iter().map(Arc::new).collect();
        specs.sort_by(|a, b| a.valid_from.cmp(&b.valid_from));
        RuleSpecRegistry { specs }
    }

    /// Load every `*.json` file under `dir` (recursively) as a rule spec.
    pub fn load_dir(dir: &Path) -> Result<Self, CoreError> {
        let mut specs = Vec::new();
        collect_dir(dir, &mut specs)?;
        debug!(count = specs.len(), dir = %dir.display(), "loaded rule specifications");
        Ok(RuleSpecRegistry::new(specs))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[Arc<RuleSpec>] {
        &self.specs
    }

    /// The spec for `law` with the latest `valid_from` not after
    /// `reference_date`, optionally restricted to one service.
    pub fn find(
        &self,
        law: &str,
        reference_date: Date,
        service: Option<&str>,
    ) -> Result<Arc<RuleSpec>, CoreError> {
        self.specs
            .iter()
            .filter(|s| s.law == law)
            .filter(|s| service.map_or(true, |svc| s.service == svc))
            .filter(|s| s.valid_from <= reference_date)
            .max_by_key(|s| s.valid_from)
            .cloned()
            .ok_or_else(|| CoreError::NoRuleSpec {
                law: law.to_string(),
                service: service.unwrap_or("any").to_string(),
                date: format_date(reference_date),
            })
    }

    /// Service name to the laws it executes.
    pub fn service_laws(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for spec in &self.specs {
            index
                .entry(spec.service.clone())
                .or_default()
                .insert(spec.law.clone());
        }
        index
    }

    /// Like [`service_laws`](Self::service_laws), restricted to specs whose
    /// `discoverable` marker equals `kind` (e.g. `"CITIZEN"`).
    pub fn discoverable_laws(&self, kind: &str) -> BTreeMap<String, BTreeSet<String>> {
        let mut index: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for spec in self.specs.iter().filter(|s| s.discoverable.as_deref() == Some(kind)) {
            index
                .entry(spec.service.clone())
                .or_default()
                .insert(spec.law.clone());
        }
        index
    }

    /// Rows of the virtual "laws" table: one row of metadata per spec.
    pub fn rules_table(&self) -> Vec<BTreeMap<String, Value>> {
        self.specs
            .iter()
            .map(|spec| {
                let opt = |v: &Option<String>| v.clone().map(Value::Text).unwrap_or(Value::Null);
                BTreeMap::from([
                    ("uuid".to_string(), Value::Text(spec.uuid.clone())),
                    ("name".to_string(), Value::Text(spec.name.clone())),
                    ("law".to_string(), Value::Text(spec.law.clone())),
                    ("law_type".to_string(), opt(&spec.law_type)),
                    ("legal_character".to_string(), opt(&spec.legal_character)),
                    ("decision_type".to_string(), opt(&spec.decision_type)),
                    ("discoverable".to_string(), opt(&spec.discoverable)),
                    ("valid_from".to_string(), Value::Date(spec.valid_from)),
                    ("service".to_string(), Value::Text(spec.service.clone())),
                ])
            })
            .collect()
    }
}

fn collect_dir(dir: &Path, out: &mut Vec<RuleSpec>) -> Result<(), CoreError> {
    let io_err = |path: &Path, e: std::io::Error| CoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let mut entries = fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io_err(dir, e))?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_dir(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                CoreError::deserialize(format!("{}: {}", path.display(), e))
            })?;
            out.push(RuleSpec::from_json(&json)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    fn spec(law: &str, service: &str, valid_from: &str) -> RuleSpec {
        RuleSpec::from_json(&json!({
            "uuid": format!("{}-{}", law, valid_from),
            "law": law,
            "service": service,
            "valid_from": valid_from,
            "discoverable": "CITIZEN",
        }))
        .unwrap()
    }

    #[test]
    fn find_picks_latest_effective_version() {
        let registry = RuleSpecRegistry::new([
            spec("wet_a", "SVC", "2023-01-01"),
            spec("wet_a", "SVC", "2025-01-01"),
            spec("wet_a", "SVC", "2024-01-01"),
        ]);
        let found = registry.find("wet_a", date!(2024 - 06 - 30), None).unwrap();
        assert_eq!(found.valid_from, date!(2024 - 01 - 01));
        let found = registry.find("wet_a", date!(2025 - 01 - 01), Some("SVC")).unwrap();
        assert_eq!(found.valid_from, date!(2025 - 01 - 01));
    }

    #[test]
    fn find_before_first_version_fails() {
        let registry = RuleSpecRegistry::new([spec("wet_a", "SVC", "2024-01-01")]);
        let err = registry.find("wet_a", date!(2023 - 12 - 31), None).unwrap_err();
        assert!(matches!(err, CoreError::NoRuleSpec { .. }));
    }

    #[test]
    fn find_respects_service_filter() {
        let registry = RuleSpecRegistry::new([
            spec("wet_a", "ONE", "2024-01-01"),
            spec("wet_a", "TWO", "2024-01-01"),
        ]);
        let found = registry.find("wet_a", date!(2024 - 06 - 01), Some("TWO")).unwrap();
        assert_eq!(found.service, "TWO");
        assert!(registry.find("wet_a", date!(2024 - 06 - 01), Some("THREE")).is_err());
    }

    #[test]
    fn service_index_and_rules_table() {
        let registry = RuleSpecRegistry::new([
            spec("wet_a", "ONE", "2024-01-01"),
            spec("wet_b", "ONE", "2024-01-01"),
            spec("wet_c", "TWO", "2024-01-01"),
        ]);
        let index = registry.service_laws();
        assert_eq!(index["ONE"].len(), 2);
        assert_eq!(registry.discoverable_laws("CITIZEN")["TWO"].len(), 1);
        assert!(registry.discoverable_laws("BUSINESS").is_empty());

        let rows = registry.rules_table();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["law"], Value::Text("wet_c".into()));
        assert_eq!(rows[0]["law_type"], Value::Null);
    }

    #[test]
    fn load_dir_reads_nested_json() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("toeslagen");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            nested.join("wet.json"),
            json!({"law": "wet_a", "service": "SVC", "valid_from": "2024-01-01"}).to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let registry = RuleSpecRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
