use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use statute_core::{RuleSpecRegistry, Value};
use statute_eval::adapter::http::HttpRuleService;
use statute_eval::{
    value_tree, Claim, Event, EvaluateResult, InMemoryCases, InMemoryClaims, ServiceRequest,
    Services, ValueTreeEntry,
};
use statute_storage::rows_from_json;
use tracing::info;

use crate::config::Config;
use crate::error::{read_json, CliError, Result};
use crate::OutputFormat;

/// Arguments of `statute eval`.
pub(crate) struct EvalArgs {
    pub service: String,
    pub law: String,
    pub date: Option<String>,
    pub params: Vec<String>,
    pub params_file: Option<PathBuf>,
    pub sources: Vec<String>,
    pub claims: Option<PathBuf>,
    pub events: Option<PathBuf>,
    pub overwrites: Vec<String>,
    pub requested: Option<String>,
    pub approved: bool,
    pub explain: bool,
}

pub(crate) fn cmd_eval(args: &EvalArgs, config: &Config, output: OutputFormat, quiet: bool) -> Result<()> {
    let services = build_services(args, config)?;
    let request = build_request(args, config)?;
    info!(service = %request.service, law = %request.law, date = %request.reference_date, "evaluating");

    let result = services.run(&request)?;
    if quiet {
        return Ok(());
    }
    match output {
        OutputFormat::Json => {
            let mut json = serde_json::json!({
                "service": request.service,
                "law": request.law,
                "reference_date": request.reference_date,
                "requirements_met": result.requirements_met,
                "missing_required": result.missing_required,
                "outputs": result.outputs,
            });
            if args.explain {
                json["explain"] = serde_json::to_value(value_tree(&result.path))?;
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => print_text(&request, &result, args.explain),
    }
    Ok(())
}

fn build_services(args: &EvalArgs, config: &Config) -> Result<Services> {
    let registry = RuleSpecRegistry::load_dir(&config.rules_dir)?;
    let mut builder = Services::builder(registry);

    if let Some(path) = &args.claims {
        let claims: Vec<Claim> = serde_json::from_value(read_json(path)?)?;
        builder = builder.claims(Arc::new(InMemoryClaims::with_claims(claims)));
    }
    if let Some(path) = &args.events {
        let events: Vec<Event> = serde_json::from_value(read_json(path)?)?;
        builder = builder.cases(Arc::new(InMemoryCases::with_events(events)));
    }
    for (service, url) in &config.remote {
        builder = builder.remote(service, Box::new(HttpRuleService::new(service, url)));
    }
    let services = builder.build();

    for source in &args.sources {
        let (service, table, path) = parse_source(source)?;
        let rows = rows_from_json(&read_json(&path)?)?;
        services.set_source_rows(&service, &table, rows)?;
    }
    Ok(services)
}

fn build_request(args: &EvalArgs, config: &Config) -> Result<ServiceRequest> {
    let date = args.date.clone().unwrap_or_else(|| config.reference_date());
    let mut request = ServiceRequest::new(&args.service, &args.law, &date);
    request.requested_output = args.requested.clone();
    request.approved = args.approved;

    if let Some(path) = &args.params_file {
        match read_json(path)? {
            serde_json::Value::Object(entries) => {
                for (name, value) in entries {
                    request.parameters.insert(name, Value::from_json(&value));
                }
            }
            _ => {
                return Err(CliError::InvalidArgument(format!(
                    "{} must hold a JSON object",
                    path.display()
                )))
            }
        }
    }
    for param in &args.params {
        let (name, value) = parse_assignment(param)?;
        request.parameters.insert(name, value);
    }
    for overwrite in &args.overwrites {
        let (target, value) = parse_assignment(overwrite)?;
        let (service, field) = target.split_once('.').ok_or_else(|| {
            CliError::InvalidArgument(format!("overwrite '{}' must be SERVICE.FIELD=VALUE", overwrite))
        })?;
        request
            .overwrite
            .entry(service.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }
    Ok(request)
}

// ──────────────────────────────────────────────
// Argument parsing
// ──────────────────────────────────────────────

/// `NAME=VALUE`; the value is read as JSON when it parses, else as text.
fn parse_assignment(arg: &str) -> Result<(String, Value)> {
    let (name, raw) = arg
        .split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| CliError::InvalidArgument(format!("expected NAME=VALUE, got '{}'", arg)))?;
    Ok((name.to_string(), parse_value(raw)))
}

fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(&json),
        Err(_) => Value::Text(raw.to_string()),
    }
}

/// `SERVICE:TABLE=FILE`
fn parse_source(arg: &str) -> Result<(String, String, PathBuf)> {
    let invalid = || CliError::InvalidArgument(format!("source '{}' must be SERVICE:TABLE=FILE", arg));
    let (target, file) = arg.split_once('=').ok_or_else(invalid)?;
    let (service, table) = target.split_once(':').ok_or_else(invalid)?;
    if service.is_empty() || table.is_empty() || file.is_empty() {
        return Err(invalid());
    }
    Ok((service.to_string(), table.to_string(), PathBuf::from(file)))
}

// ──────────────────────────────────────────────
// Text output
// ──────────────────────────────────────────────

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn print_text(request: &ServiceRequest, result: &EvaluateResult, explain: bool) {
    println!("{} / {} @ {}", request.service, request.law, request.reference_date);
    println!("requirements met: {}", yes_no(result.requirements_met));
    println!("missing required: {}", yes_no(result.missing_required));
    if result.outputs.is_empty() {
        println!("no outputs");
    } else {
        println!("outputs:");
        for (name, out) in &result.outputs {
            println!("  {} = {}", name, out.value);
        }
    }
    if explain {
        println!("values used:");
        print_tree(&value_tree(&result.path), 1);
    }
}

fn print_tree(tree: &BTreeMap<String, ValueTreeEntry>, depth: usize) {
    let indent = "  ".repeat(depth);
    for (name, entry) in tree {
        let origin = match (&entry.service, &entry.law) {
            (Some(service), Some(law)) => format!("{}.{}", service, law),
            _ => entry
                .resolve_type
                .and_then(|rt| serde_json::to_value(rt).ok())
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
        };
        let required = if entry.required { ", required" } else { "" };
        println!("{}{} = {} ({}{})", indent, name, entry.value, origin, required);
        print_tree(&entry.children, depth + 1);
    }
}
