use serde::Serialize;
use serde_json::{Map, Value};

use crate::cli::OutputFormat;
use crate::ui;

pub mod table;

/// Columns shown first, in this order, when present.
const LEADING_COLUMNS: &[&str] = &[
    "id",
    "email",
    "name",
    "display_name",
    "role",
    "resource",
    "action",
    "status",
    "state",
];

/// Render a serializable response to a string in the requested format.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Table => render_table(&serde_json::to_value(value)?),
        OutputFormat::Raw => Ok(serde_json::to_string(value)?),
    }
}

/// Print a serializable response in the requested format.
pub fn output<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = render(value, format)?;
    println!("{rendered}");
    Ok(())
}

fn table_options() -> table::TableOptions {
    let prefs = ui::prefs();
    table::TableOptions {
        max_width: prefs.term_width,
        color: prefs.table_color,
    }
}

fn render_table(value: &Value) -> anyhow::Result<String> {
    let options = table_options();
    match value {
        Value::Array(items) if items.is_empty() => Ok(String::from("(no rows)")),
        Value::Array(items) if items.iter().all(Value::is_object) => {
            let flat = items
                .iter()
                .filter_map(Value::as_object)
                .map(flatten)
                .collect::<Vec<_>>();
            let headers = column_order(&flat);
            let header_refs = headers.iter().map(String::as_str).collect::<Vec<_>>();
            let rows = flat
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .map(|header| row.get(header).map_or_else(|| String::from("-"), value_to_cell))
                        .collect()
                })
                .collect::<Vec<_>>();
            Ok(table::render_entity_table(&header_refs, &rows, options))
        }
        Value::Array(items) => {
            let rows = items.iter().map(|item| vec![value_to_cell(item)]).collect::<Vec<_>>();
            Ok(table::render_entity_table(&["value"], &rows, options))
        }
        Value::Object(map) => {
            let flat = flatten(map);
            let rows = column_order(std::slice::from_ref(&flat))
                .into_iter()
                .map(|key| {
                    let cell = flat.get(&key).map_or_else(String::new, value_to_cell);
                    vec![key, cell]
                })
                .collect::<Vec<_>>();
            Ok(table::render_entity_table(&["key", "value"], &rows, options))
        }
        scalar => Ok(table::render_entity_table(
            &["value"],
            &[vec![value_to_cell(scalar)]],
            options,
        )),
    }
}

/// Nested objects become dotted columns (`user.email`), so responses such as
/// `{ user, api_token }` stay readable in a table.
fn flatten(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                for (inner_key, inner_value) in flatten(inner) {
                    out.insert(format!("{key}.{inner_key}"), inner_value);
                }
            }
            other => {
                out.insert(key.clone(), other.clone());
            }
        }
    }
    out
}

fn column_order(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut headers = Vec::<String>::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    headers.sort_by_key(|header| {
        let leaf = header.rsplit('.').next().unwrap_or(header);
        let rank = LEADING_COLUMNS
            .iter()
            .position(|lead| *lead == leaf)
            .unwrap_or(LEADING_COLUMNS.len());
        (header.contains('.'), rank, header.clone())
    });
    headers
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::from("-"),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        Value::Array(items) => items.iter().map(value_to_cell).collect::<Vec<_>>().join(","),
        other => serde_json::to_string(other).unwrap_or_else(|_| String::from("<invalid-json>")),
    }
}
