//! Rule specification model, parsed from rule JSON.
//!
//! A [`RuleSpec`] is immutable once loaded and shared by every evaluation
//! of its law. The "either this or that" shapes of the rule language
//! (operands, requirement members, property origins) are modelled as enums
//! and resolved once, at parse time.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

use crate::error::CoreError;
use crate::value::{parse_date, Value};

// ──────────────────────────────────────────────
// Rule specification
// ──────────────────────────────────────────────

/// A versioned rule specification for one law as executed by one service.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub uuid: String,
    pub name: String,
    pub law: String,
    pub law_type: Option<String>,
    pub legal_character: Option<String>,
    pub decision_type: Option<String>,
    pub discoverable: Option<String>,
    pub valid_from: Date,
    pub service: String,
    pub description: Option<String>,
    pub references: Vec<Value>,
    pub parameters: Vec<ParameterSpec>,
    /// Declared tabular sources, followed by declared inputs.
    pub properties: Vec<PropertySpec>,
    pub outputs: Vec<OutputSpec>,
    pub definitions: BTreeMap<String, Value>,
    pub requirements: Vec<Requirement>,
    pub actions: Vec<Action>,
}

impl RuleSpec {
    /// Parse a rule specification from its JSON form.
    pub fn from_json(v: &serde_json::Value) -> Result<RuleSpec, CoreError> {
        let valid_from_text = get_str(v, "valid_from")?;
        let valid_from = parse_date(&valid_from_text).ok_or_else(|| {
            CoreError::deserialize(format!("invalid valid_from date '{}'", valid_from_text))
        })?;

        let empty = serde_json::Value::Null;
        let props = v.get("properties").unwrap_or(&empty);

        let parameters = list(props, "parameters")
            .iter()
            .map(ParameterSpec::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        let mut properties = Vec::new();
        for section in ["sources", "input"] {
            for p in list(props, section) {
                properties.push(PropertySpec::from_json(p)?);
            }
        }

        let outputs = list(props, "output")
            .iter()
            .map(OutputSpec::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        let definitions = props
            .get("definitions")
            .or_else(|| v.get("definitions"))
            .and_then(|d| d.as_object())
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect()
            })
            .unwrap_or_default();

        let requirements = list(v, "requirements")
            .iter()
            .map(parse_top_level_requirement)
            .collect::<Result<Vec<_>, _>>()?;

        let actions = list(v, "actions")
            .iter()
            .map(Action::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RuleSpec {
            uuid: opt_str(v, "uuid").unwrap_or_default(),
            name: opt_str(v, "name").unwrap_or_default(),
            law: get_str(v, "law")?,
            law_type: opt_str(v, "law_type"),
            legal_character: opt_str(v, "legal_character"),
            decision_type: opt_str(v, "decision_type"),
            discoverable: opt_str(v, "discoverable"),
            valid_from,
            service: get_str(v, "service")?,
            description: opt_str(v, "description"),
            references: list(v, "references").iter().map(Value::from_json).collect(),
            parameters,
            properties,
            outputs,
            definitions,
            requirements,
            actions,
        })
    }

    /// Look up a declared source or input by name.
    pub fn property(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a declared output by name.
    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

// ──────────────────────────────────────────────
// Declarations
// ──────────────────────────────────────────────

/// A declared call parameter, e.g. `BSN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub type_name: Option<String>,
    pub description: Option<String>,
    pub required: bool,
}

impl ParameterSpec {
    pub fn from_json(v: &serde_json::Value) -> Result<ParameterSpec, CoreError> {
        Ok(ParameterSpec {
            name: get_str(v, "name")?,
            type_name: opt_str(v, "type"),
            description: opt_str(v, "description"),
            required: opt_bool(v, "required"),
        })
    }
}

/// Where a declared property's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyOrigin {
    Source(SourceReference),
    Service(ServiceReference),
    None,
}

/// A referenceable name declared under `sources` or `input`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    pub name: String,
    pub description: Option<String>,
    pub type_name: Option<String>,
    pub type_spec: Option<TypeSpec>,
    pub required: bool,
    pub temporal: Option<Temporal>,
    pub origin: PropertyOrigin,
}

impl PropertySpec {
    /// A property declaring both a source and a service reference is
    /// treated as a source.
    pub fn from_json(v: &serde_json::Value) -> Result<PropertySpec, CoreError> {
        let origin = if let Some(src) = v.get("source_reference").filter(|s| !s.is_null()) {
            PropertyOrigin::Source(SourceReference::from_json(src)?)
        } else if let Some(svc) = v.get("service_reference").filter(|s| !s.is_null()) {
            PropertyOrigin::Service(ServiceReference::from_json(svc)?)
        } else {
            PropertyOrigin::None
        };
        Ok(PropertySpec {
            name: get_str(v, "name")?,
            description: opt_str(v, "description"),
            type_name: opt_str(v, "type"),
            type_spec: v
                .get("type_spec")
                .filter(|t| t.is_object())
                .map(TypeSpec::from_json)
                .transpose()?,
            required: opt_bool(v, "required"),
            temporal: v
                .get("temporal")
                .filter(|t| t.is_object())
                .map(Temporal::from_json),
            origin,
        })
    }

    /// The cross-service reference, if the property is served by one.
    pub fn service_reference(&self) -> Option<&ServiceReference> {
        match &self.origin {
            PropertyOrigin::Service(r) => Some(r),
            _ => None,
        }
    }
}

/// A declared output with the shape its computed value is coerced to.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub description: Option<String>,
    pub type_name: Option<String>,
    pub type_spec: TypeSpec,
    pub temporal: Option<Temporal>,
    pub citizen_relevance: Option<String>,
}

impl OutputSpec {
    pub fn from_json(v: &serde_json::Value) -> Result<OutputSpec, CoreError> {
        let type_name = opt_str(v, "type");
        let mut type_spec = match v.get("type_spec").filter(|t| t.is_object()) {
            Some(t) => TypeSpec::from_json(t)?,
            None => TypeSpec::default(),
        };
        if type_spec.type_name.is_none() {
            type_spec.type_name = type_name.clone();
        }
        Ok(OutputSpec {
            name: get_str(v, "name")?,
            description: opt_str(v, "description"),
            type_name,
            type_spec,
            temporal: v
                .get("temporal")
                .filter(|t| t.is_object())
                .map(Temporal::from_json),
            citizen_relevance: opt_str(v, "citizen_relevance"),
        })
    }
}

/// Numeric or textual shape applied to a computed value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeSpec {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
}

impl TypeSpec {
    pub fn from_json(v: &serde_json::Value) -> Result<TypeSpec, CoreError> {
        let precision = match v.get("precision") {
            None | Some(serde_json::Value::Null) => None,
            Some(p) => Some(p.as_u64().and_then(|p| u32::try_from(p).ok()).ok_or_else(
                || CoreError::deserialize(format!("invalid precision '{}'", p)),
            )?),
        };
        Ok(TypeSpec {
            type_name: opt_str(v, "type"),
            unit: opt_str(v, "unit"),
            precision,
            min: opt_decimal(v, "min")?,
            max: opt_decimal(v, "max")?,
        })
    }
}

/// Temporal metadata. `reference` names the date (usually a `$` pseudo-value)
/// a cross-service call is evaluated on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Temporal {
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub period_type: Option<String>,
    pub reference: Option<String>,
    pub immutable_after: Option<String>,
}

impl Temporal {
    pub fn from_json(v: &serde_json::Value) -> Temporal {
        Temporal {
            type_name: opt_str(v, "type"),
            period_type: opt_str(v, "period_type"),
            reference: opt_str(v, "reference"),
            immutable_after: opt_str(v, "immutable_after"),
        }
    }
}

/// A reference into a tabular source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReference {
    /// `"laws"`, `"events"`, or anything else for a named table.
    pub source_type: Option<String>,
    pub table: Option<String>,
    pub field: Option<String>,
    pub fields: Option<Vec<String>>,
    pub select_on: Vec<SelectOn>,
}

impl SourceReference {
    pub fn from_json(v: &serde_json::Value) -> Result<SourceReference, CoreError> {
        let fields = v.get("fields").and_then(|f| f.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        });
        Ok(SourceReference {
            source_type: opt_str(v, "source_type"),
            table: opt_str(v, "table"),
            field: opt_str(v, "field"),
            fields,
            select_on: list(v, "select_on")
                .iter()
                .map(SelectOn::from_json)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

/// A row filter on a source reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOn {
    pub name: String,
    pub description: Option<String>,
    pub type_name: Option<String>,
    pub value: ActionValue,
}

impl SelectOn {
    pub fn from_json(v: &serde_json::Value) -> Result<SelectOn, CoreError> {
        let value = v
            .get("value")
            .ok_or_else(|| CoreError::deserialize("select_on missing 'value'"))?;
        Ok(SelectOn {
            name: get_str(v, "name")?,
            description: opt_str(v, "description"),
            type_name: opt_str(v, "type"),
            value: ActionValue::from_json(value)?,
        })
    }
}

/// A reference to an output of another service's rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReference {
    pub service: String,
    pub field: String,
    pub law: String,
    pub parameters: Vec<ServiceParameter>,
}

/// An extra parameter passed on a cross-service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceParameter {
    pub name: String,
    pub reference: String,
}

impl ServiceReference {
    pub fn from_json(v: &serde_json::Value) -> Result<ServiceReference, CoreError> {
        let parameters = list(v, "parameters")
            .iter()
            .map(|p| {
                Ok(ServiceParameter {
                    name: get_str(p, "name")?,
                    reference: get_str(p, "reference")?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;
        Ok(ServiceReference {
            service: get_str(v, "service")?,
            field: get_str(v, "field")?,
            law: get_str(v, "law")?,
            parameters,
        })
    }
}

// ──────────────────────────────────────────────
// Operations and actions
// ──────────────────────────────────────────────

/// Operation kind tag of an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    If,
    Foreach,
    In,
    NotIn,
    NotNull,
    IsNull,
    And,
    Or,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Get,
    Min,
    Max,
    Add,
    Concat,
    Multiply,
    Subtract,
    Divide,
    SubtractDate,
    /// A tag this engine does not know; evaluates to null.
    Other(String),
}

impl OperationKind {
    pub fn from_tag(tag: &str) -> OperationKind {
        match tag {
            "IF" => OperationKind::If,
            "FOREACH" => OperationKind::Foreach,
            "IN" => OperationKind::In,
            "NOT_IN" => OperationKind::NotIn,
            "NOT_NULL" => OperationKind::NotNull,
            "IS_NULL" => OperationKind::IsNull,
            "AND" => OperationKind::And,
            "OR" => OperationKind::Or,
            "EQUALS" => OperationKind::Equals,
            "NOT_EQUALS" => OperationKind::NotEquals,
            "GREATER_THAN" => OperationKind::GreaterThan,
            "LESS_THAN" => OperationKind::LessThan,
            "GREATER_OR_EQUAL" => OperationKind::GreaterOrEqual,
            "LESS_OR_EQUAL" => OperationKind::LessOrEqual,
            "GET" => OperationKind::Get,
            "MIN" => OperationKind::Min,
            "MAX" => OperationKind::Max,
            "ADD" => OperationKind::Add,
            "CONCAT" => OperationKind::Concat,
            "MULTIPLY" => OperationKind::Multiply,
            "SUBTRACT" => OperationKind::Subtract,
            "DIVIDE" => OperationKind::Divide,
            "SUBTRACT_DATE" => OperationKind::SubtractDate,
            other => OperationKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::If => "IF",
            OperationKind::Foreach => "FOREACH",
            OperationKind::In => "IN",
            OperationKind::NotIn => "NOT_IN",
            OperationKind::NotNull => "NOT_NULL",
            OperationKind::IsNull => "IS_NULL",
            OperationKind::And => "AND",
            OperationKind::Or => "OR",
            OperationKind::Equals => "EQUALS",
            OperationKind::NotEquals => "NOT_EQUALS",
            OperationKind::GreaterThan => "GREATER_THAN",
            OperationKind::LessThan => "LESS_THAN",
            OperationKind::GreaterOrEqual => "GREATER_OR_EQUAL",
            OperationKind::LessOrEqual => "LESS_OR_EQUAL",
            OperationKind::Get => "GET",
            OperationKind::Min => "MIN",
            OperationKind::Max => "MAX",
            OperationKind::Add => "ADD",
            OperationKind::Concat => "CONCAT",
            OperationKind::Multiply => "MULTIPLY",
            OperationKind::Subtract => "SUBTRACT",
            OperationKind::Divide => "DIVIDE",
            OperationKind::SubtractDate => "SUBTRACT_DATE",
            OperationKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named computation (top level) or an operand expression (nested).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Action {
    /// Output name; absent on nested actions.
    pub output: Option<String>,
    pub value: Option<ActionValue>,
    pub operation: Option<OperationKind>,
    pub subject: Option<ActionValue>,
    pub unit: Option<String>,
    pub combine: Option<OperationKind>,
    pub values: Vec<ActionValue>,
    pub conditions: Vec<Condition>,
}

impl Action {
    pub fn from_json(v: &serde_json::Value) -> Result<Action, CoreError> {
        if !v.is_object() {
            return Err(CoreError::deserialize(format!(
                "action must be an object, got {}",
                v
            )));
        }
        let values = match v.get("values") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(ActionValue::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            Some(single) => vec![ActionValue::from_json(single)?],
        };
        Ok(Action {
            output: opt_str(v, "output"),
            value: opt_action_value(v, "value")?,
            operation: opt_str(v, "operation").map(|t| OperationKind::from_tag(&t)),
            subject: opt_action_value(v, "subject")?,
            unit: opt_str(v, "unit"),
            combine: opt_str(v, "combine").map(|t| OperationKind::from_tag(&t)),
            values,
            conditions: list(v, "conditions")
                .iter()
                .map(Condition::from_json)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    /// Convenience constructor for an operation over operand values.
    pub fn operation(kind: OperationKind, values: Vec<ActionValue>) -> Action {
        Action {
            operation: Some(kind),
            values,
            ..Action::default()
        }
    }

    /// Display name used in traces: the output name, else the operation tag.
    pub fn label(&self) -> String {
        match (&self.output, &self.operation) {
            (Some(o), _) => o.clone(),
            (None, Some(op)) => op.to_string(),
            (None, None) => "value".to_string(),
        }
    }
}

/// An operand: a literal (possibly a `$reference`) or a nested action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionValue {
    Literal(Value),
    Action(Box<Action>),
}

impl ActionValue {
    /// Objects carrying an `operation` key are nested actions, as is a list
    /// whose first element is one. Everything else is a literal.
    pub fn from_json(v: &serde_json::Value) -> Result<ActionValue, CoreError> {
        if is_operation(v) {
            return Ok(ActionValue::Action(Box::new(Action::from_json(v)?)));
        }
        if let Some(first) = v.as_array().and_then(|items| items.first()) {
            if is_operation(first) {
                return Ok(ActionValue::Action(Box::new(Action::from_json(first)?)));
            }
        }
        Ok(ActionValue::Literal(Value::from_json(v)))
    }

    /// A literal reference or text operand, e.g. `ActionValue::text("$age")`.
    pub fn text(s: &str) -> ActionValue {
        ActionValue::Literal(Value::Text(s.to_string()))
    }
}

impl From<Value> for ActionValue {
    fn from(v: Value) -> Self {
        ActionValue::Literal(v)
    }
}

impl From<Action> for ActionValue {
    fn from(a: Action) -> Self {
        ActionValue::Action(Box::new(a))
    }
}

/// One branch of an IF operation. An `else`-only entry has no test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    pub test: Option<Action>,
    pub then: Option<ActionValue>,
    pub otherwise: Option<ActionValue>,
}

impl Condition {
    pub fn from_json(v: &serde_json::Value) -> Result<Condition, CoreError> {
        Ok(Condition {
            test: v
                .get("test")
                .filter(|t| !t.is_null())
                .map(Action::from_json)
                .transpose()?,
            then: opt_action_value(v, "then")?,
            otherwise: opt_action_value(v, "else")?,
        })
    }
}

// ──────────────────────────────────────────────
// Requirements
// ──────────────────────────────────────────────

/// Boolean gate evaluated before any action runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    AllOf(Vec<ActionRequirement>),
    AnyOf(Vec<ActionRequirement>),
}

/// Member of a requirement: a nested requirement or a test action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequirement {
    Requirement(Requirement),
    Action(Action),
}

impl Requirement {
    pub fn from_json(v: &serde_json::Value) -> Result<Requirement, CoreError> {
        if let Some(all) = v.get("all") {
            return Ok(Requirement::AllOf(parse_members(all)?));
        }
        if let Some(any) = v.get("or") {
            return Ok(Requirement::AnyOf(parse_members(any)?));
        }
        Err(CoreError::deserialize(format!(
            "requirement must have 'all' or 'or', got {}",
            v
        )))
    }
}

impl ActionRequirement {
    pub fn from_json(v: &serde_json::Value) -> Result<ActionRequirement, CoreError> {
        if v.get("all").is_some() || v.get("or").is_some() {
            Ok(ActionRequirement::Requirement(Requirement::from_json(v)?))
        } else {
            Ok(ActionRequirement::Action(Action::from_json(v)?))
        }
    }
}

fn parse_members(v: &serde_json::Value) -> Result<Vec<ActionRequirement>, CoreError> {
    v.as_array()
        .ok_or_else(|| CoreError::deserialize("requirement members must be a list"))?
        .iter()
        .map(ActionRequirement::from_json)
        .collect()
}

fn parse_top_level_requirement(v: &serde_json::Value) -> Result<Requirement, CoreError> {
    match ActionRequirement::from_json(v)? {
        ActionRequirement::Requirement(r) => Ok(r),
        action => Ok(Requirement::AllOf(vec![action])),
    }
}

// ──────────────────────────────────────────────
// JSON helpers
// ──────────────────────────────────────────────

fn is_operation(v: &serde_json::Value) -> bool {
    v.as_object().is_some_and(|o| o.contains_key("operation"))
}

fn get_str(obj: &serde_json::Value, field: &str) -> Result<String, CoreError> {
    obj.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::deserialize(format!("missing string field '{}'", field)))
}

fn opt_str(obj: &serde_json::Value, field: &str) -> Option<String> {
    obj.get(field).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn opt_bool(obj: &serde_json::Value, field: &str) -> bool {
    obj.get(field).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn list<'a>(obj: &'a serde_json::Value, field: &str) -> &'a [serde_json::Value] {
    obj.get(field)
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn opt_action_value(obj: &serde_json::Value, field: &str) -> Result<Option<ActionValue>, CoreError> {
    obj.get(field)
        .filter(|v| !v.is_null())
        .map(ActionValue::from_json)
        .transpose()
}

fn opt_decimal(obj: &serde_json::Value, field: &str) -> Result<Option<Decimal>, CoreError> {
    match obj.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => match Value::from_json(v) {
            Value::Int(i) => Ok(Some(Decimal::from(i))),
            Value::Number(d) => Ok(Some(d)),
            Value::Text(s) => s
                .parse::<Decimal>()
                .map(Some)
                .map_err(|e| CoreError::deserialize(format!("invalid {} '{}': {}", field, s, e))),
            other => Err(CoreError::deserialize(format!(
                "invalid {}: expected number, got {}",
                field,
                other.type_name()
            ))),
        },
    }
}
