//! Structured output: JSON, YAML or tables, with optional JMESPath filtering

use anyhow::{Context, Result};
use comfy_table::Table;
use jpx_core::Runtime;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::cli;

static JMESPATH_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// JMESPath runtime with the extended function library
pub fn get_jmespath_runtime() -> &'static Runtime {
    JMESPATH_RUNTIME.get_or_init(|| Runtime::builder().with_all_extensions().build())
}

/// Quote bare backtick literals so `` `Paused` `` reads as `` `"Paused"` ``.
///
/// JMESPath allows elided quotes inside backticks but the runtime only accepts
/// JSON there. Content that already parses as JSON is left alone.
fn normalize_backtick_literals(query: &str) -> String {
    static BACKTICK_RE: OnceLock<Regex> = OnceLock::new();
    let re = BACKTICK_RE.get_or_init(|| {
        Regex::new(r"`([^`\\]*(?:\\.[^`\\]*)*)`").expect("backtick pattern is valid")
    });

    re.replace_all(query, |caps: &regex::Captures| {
        let content = &caps[1];
        let trimmed = content.trim();
        if serde_json::from_str::<Value>(trimmed).is_ok() {
            format!("`{}`", content)
        } else {
            let escaped = trimmed.replace('\\', "\\\\").replace('"', "\\\"");
            format!("`\"{}\"`", escaped)
        }
    })
    .into_owned()
}

pub fn compile_jmespath(
    query: &str,
) -> Result<jpx_core::Expression<'static>, jpx_core::JmespathError> {
    get_jmespath_runtime().compile(&normalize_backtick_literals(query))
}

/// Run `query` against `value`
pub fn apply_query(value: Value, query: &str) -> Result<Value> {
    let expr = compile_jmespath(query)
        .with_context(|| format!("Invalid JMESPath expression: {}", query))?;
    Ok(expr.search(&value).context("JMESPath query failed")?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Table,
}

impl OutputFormat {
    /// Resolve the command-line choice; `auto` becomes `fallback`
    pub fn resolve(requested: cli::OutputFormat, fallback: OutputFormat) -> Self {
        match requested {
            cli::OutputFormat::Auto => fallback,
            cli::OutputFormat::Json => OutputFormat::Json,
            cli::OutputFormat::Yaml => OutputFormat::Yaml,
            cli::OutputFormat::Table => OutputFormat::Table,
        }
    }
}

pub fn print_output<T: Serialize>(
    data: T,
    format: OutputFormat,
    query: Option<&str>,
) -> Result<()> {
    let mut json_value = serde_json::to_value(data)?;
    if let Some(query) = query {
        json_value = apply_query(json_value, query)?;
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json_value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&json_value)?),
        OutputFormat::Table => println!("{}", value_table(&json_value)),
    }
    Ok(())
}

/// Generic table for arbitrary JSON: arrays of objects get one column per key
fn value_table(value: &Value) -> String {
    match value {
        Value::Array(items) if !items.is_empty() => {
            let mut table = Table::new();
            if let Value::Object(first) = &items[0] {
                let headers: Vec<String> = first.keys().cloned().collect();
                table.set_header(&headers);
                for item in items {
                    if let Value::Object(obj) = item {
                        table.add_row(
                            headers
                                .iter()
                                .map(|h| format_value(obj.get(h).unwrap_or(&Value::Null)))
                                .collect::<Vec<_>>(),
                        );
                    }
                }
            } else {
                table.set_header(vec!["Value"]);
                for item in items {
                    table.add_row(vec![format_value(item)]);
                }
            }
            table.to_string()
        }
        Value::Object(obj) => {
            let mut table = Table::new();
            table.set_header(vec!["Key", "Value"]);
            for (key, val) in obj {
                table.add_row(vec![key.clone(), format_value(val)]);
            }
            table.to_string()
        }
        other => format_value(other),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}
