//! Claims and case events consumed by the engine.
//!
//! A claim is an externally asserted correction to a value, scoped to a
//! citizen (BSN) and optionally to one service/law. Case events back the
//! virtual `events` source table.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use statute_core::Value;
use statute_storage::Row;

use crate::error::EvalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    /// Whether a claim in this status is selected by a lookup.
    pub fn selected(self, only_approved: bool, include_rejected: bool) -> bool {
        match self {
            ClaimStatus::Approved => true,
            ClaimStatus::Pending => !only_approved,
            ClaimStatus::Rejected => include_rejected,
        }
    }
}

/// An asserted value for one field of one citizen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    /// Field name the claim overrides, e.g. `income`.
    pub key: String,
    pub new_value: Value,
    #[serde(default)]
    pub old_value: Value,
    pub service: String,
    pub law: String,
    pub bsn: String,
    #[serde(default)]
    pub case_id: Option<String>,
    #[serde(default)]
    pub claimant: Option<String>,
    pub status: ClaimStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Read access to submitted claims.
pub trait ClaimAccessor: Send + Sync {
    /// Every selected claim for a citizen, across services.
    fn claims_for_identity(
        &self,
        bsn: &str,
        only_approved: bool,
        include_rejected: bool,
    ) -> Result<Vec<Claim>, EvalError>;

    /// Selected claims for one service/law, keyed by claim key. A later
    /// claim for the same key replaces an earlier one.
    fn claims_for_service_law(
        &self,
        bsn: &str,
        service: &str,
        law: &str,
        only_approved: bool,
        include_rejected: bool,
    ) -> Result<BTreeMap<String, Claim>, EvalError>;
}

/// A case event as exposed through the `events` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub case_id: String,
    pub event_type: String,
    pub timestamp: String,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl Event {
    pub fn to_row(&self) -> Row {
        BTreeMap::from([
            ("case_id".to_string(), Value::Text(self.case_id.clone())),
            ("event_type".to_string(), Value::Text(self.event_type.clone())),
            ("timestamp".to_string(), Value::Text(self.timestamp.clone())),
            ("data".to_string(), Value::Map(self.data.clone())),
        ])
    }
}

/// Read access to case history.
pub trait CaseAccessor: Send + Sync {
    /// Events of one case, or of every case when `case_id` is `None`.
    fn events_for_case(&self, case_id: Option<&str>) -> Result<Vec<Event>, EvalError>;
}

// ──────────────────────────────────────────────
// In-memory implementations
// ──────────────────────────────────────────────

fn poisoned() -> EvalError {
    EvalError::Accessor {
        message: "lock poisoned".to_string(),
    }
}

/// Claims held in memory, in submission order.
#[derive(Debug, Default)]
pub struct InMemoryClaims {
    claims: RwLock<Vec<Claim>>,
}

impl InMemoryClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claims(claims: Vec<Claim>) -> Self {
        InMemoryClaims {
            claims: RwLock::new(claims),
        }
    }

    pub fn submit(&self, claim: Claim) -> Result<(), EvalError> {
        self.claims.write().map_err(|_| poisoned())?.push(claim);
        Ok(())
    }

    /// Change the status of a claim by id. Returns whether it existed.
    pub fn set_status(&self, id: &str, status: ClaimStatus) -> Result<bool, EvalError> {
        let mut claims = self.claims.write().map_err(|_| poisoned())?;
        match claims.iter_mut().find(|c| c.id == id) {
            Some(claim) => {
                claim.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl ClaimAccessor for InMemoryClaims {
    fn claims_for_identity(
        &self,
        bsn: &str,
        only_approved: bool,
        include_rejected: bool,
    ) -> Result<Vec<Claim>, EvalError> {
        let claims = self.claims.read().map_err(|_| poisoned())?;
        Ok(claims
            .iter()
            .filter(|c| c.bsn == bsn && c.status.selected(only_approved, include_rejected))
            .cloned()
            .collect())
    }

    fn claims_for_service_law(
        &self,
        bsn: &str,
        service: &str,
        law: &str,
        only_approved: bool,
        include_rejected: bool,
    ) -> Result<BTreeMap<String, Claim>, EvalError> {
        let claims = self.claims.read().map_err(|_| poisoned())?;
        Ok(claims
            .iter()
            .filter(|c| c.bsn == bsn && c.service == service && c.law == law)
            .filter(|c| c.status.selected(only_approved, include_rejected))
            .map(|c| (c.key.clone(), c.clone()))
            .collect())
    }
}

/// Case events held in memory, in arrival order.
#[derive(Debug, Default)]
pub struct InMemoryCases {
    events: RwLock<Vec<Event>>,
}

impl InMemoryCases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        InMemoryCases {
            events: RwLock::new(events),
        }
    }

    pub fn record(&self, event: Event) -> Result<(), EvalError> {
        self.events.write().map_err(|_| poisoned())?.push(event);
        Ok(())
    }
}

impl CaseAccessor for InMemoryCases {
    fn events_for_case(&self, case_id: Option<&str>) -> Result<Vec<Event>, EvalError> {
        let events = self.events.read().map_err(|_| poisoned())?;
        Ok(events
            .iter()
            .filter(|e| case_id.map_or(true, |id| e.case_id == id))
            .cloned()
            .collect())
    }
}
