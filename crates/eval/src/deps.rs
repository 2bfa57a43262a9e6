//! Dependency analysis over a rule's actions.
//!
//! A reference `$name` whose name is entirely lowercase, digits and
//! underscores is an inter-action dependency. Capitalised names are
//! loop-bound or parameter names and never count.

use std::collections::{BTreeMap, BTreeSet};

use statute_core::{Action, ActionValue, Value};

use crate::error::EvalError;

/// Every lowercase `$reference` reachable from the action's operand tree.
pub fn dependencies_of(action: &Action) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    collect_action(action, &mut deps);
    deps
}

fn collect_action(action: &Action, deps: &mut BTreeSet<String>) {
    if let Some(v) = &action.value {
        collect_value(v, deps);
    }
    if let Some(s) = &action.subject {
        collect_value(s, deps);
    }
    if let Some(unit) = &action.unit {
        collect_text(unit, deps);
    }
    for v in &action.values {
        collect_value(v, deps);
    }
    for cond in &action.conditions {
        if let Some(test) = &cond.test {
            collect_action(test, deps);
        }
        if let Some(then) = &cond.then {
            collect_value(then, deps);
        }
        if let Some(otherwise) = &cond.otherwise {
            collect_value(otherwise, deps);
        }
    }
}

fn collect_value(value: &ActionValue, deps: &mut BTreeSet<String>) {
    match value {
        ActionValue::Action(a) => collect_action(a, deps),
        ActionValue::Literal(v) => collect_literal(v, deps),
    }
}

fn collect_literal(value: &Value, deps: &mut BTreeSet<String>) {
    match value {
        Value::Text(s) => collect_text(s, deps),
        Value::List(items) => items.iter().for_each(|i| collect_literal(i, deps)),
        Value::Map(entries) => entries.values().for_each(|v| collect_literal(v, deps)),
        _ => {}
    }
}

fn collect_text(s: &str, deps: &mut BTreeSet<String>) {
    if let Some(name) = s.strip_prefix('$') {
        let lowercase = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_lowercase() || c.is_ascii_digit() || c == '_');
        if lowercase {
            deps.insert(name.to_string());
        }
    }
}

/// The actions to evaluate, in evaluation order.
///
/// Without a requested output every action is returned in declaration
/// order. With one, the minimal closure of actions it depends on is
/// returned in topological order; a cycle within that closure is fatal.
pub fn required_actions<'a>(
    requested: Option<&str>,
    actions: &'a [Action],
) -> Result<Vec<&'a Action>, EvalError> {
    let requested = match requested {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(actions.iter().collect()),
    };

    let by_name: BTreeMap<&str, &Action> = actions
        .iter()
        .filter_map(|a| a.output.as_deref().map(|o| (o, a)))
        .collect();
    let graph: BTreeMap<&str, BTreeSet<String>> = by_name
        .iter()
        .map(|(name, a)| (*name, dependencies_of(a)))
        .collect();

    // Closure walk from the requested output.
    let mut needed: BTreeSet<String> = BTreeSet::new();
    let mut pending = vec![requested.to_string()];
    while let Some(name) = pending.pop() {
        if !needed.insert(name.clone()) {
            continue;
        }
        if let Some(deps) = graph.get(name.as_str()) {
            pending.extend(deps.iter().filter(|d| !needed.contains(*d)).cloned());
        }
    }

    // Declared actions first, in declaration order, for a stable result.
    let mut remaining: Vec<&str> = Vec::new();
    for name in actions.iter().filter_map(|a| a.output.as_deref()) {
        if needed.contains(name) && !remaining.contains(&name) {
            remaining.push(name);
        }
    }

    let mut done: BTreeSet<&str> = BTreeSet::new();
    let mut order: Vec<&str> = Vec::new();
    loop {
        let ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|name| {
                graph.get(name).map_or(true, |deps| {
                    deps.iter()
                        .filter(|d| by_name.contains_key(d.as_str()) && needed.contains(*d))
                        .all(|d| done.contains(d.as_str()))
                })
            })
            .collect();
        if ready.is_empty() {
            break;
        }
        for name in ready {
            done.insert(name);
            order.push(name);
        }
        remaining.retain(|name| !done.contains(name));
    }

    if !remaining.is_empty() {
        return Err(EvalError::CircularDependency {
            involved: remaining.iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(order
        .into_iter()
        .filter_map(|name| by_name.get(name).copied())
        .collect())
}
