//! Command output: `--query` filtering and json/text/csv/md rendering

use crate::error::{M365Error, Result};
use clap::ValueEnum;
use serde_json::Value;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Pretty-printed JSON (default)
    #[default]
    Json,
    /// Human-readable tables and key/value lines
    Text,
    /// Comma-separated values
    Csv,
    /// Markdown tables
    Md,
    /// Suppress output
    None,
}

impl OutputFormat {
    pub const ALL: &'static [&'static str] = &["json", "text", "csv", "md", "none"];

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            "csv" => Ok(OutputFormat::Csv),
            "md" => Ok(OutputFormat::Md),
            "none" => Ok(OutputFormat::None),
            _ => Err(M365Error::ValidationError(format!(
                "'{}' is not a valid output type. Allowed values are {}",
                value,
                Self::ALL.join(", ")
            ))),
        }
    }
}

/// Where command output goes; tests capture it in a buffer
#[derive(Debug, Clone, Default)]
pub enum OutputSink {
    #[default]
    Stdout,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl OutputSink {
    pub fn buffer() -> Self {
        OutputSink::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn write(&self, text: &str) -> Result<()> {
        match self {
            OutputSink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            OutputSink::Buffer(buffer) => {
                let mut buffer = buffer.lock().unwrap_or_else(|e| e.into_inner());
                buffer.extend_from_slice(text.as_bytes());
            }
        }
        Ok(())
    }

    /// Captured output (empty for stdout)
    pub fn contents(&self) -> String {
        match self {
            OutputSink::Stdout => String::new(),
            OutputSink::Buffer(buffer) => {
                let buffer = buffer.lock().unwrap_or_else(|e| e.into_inner());
                String::from_utf8_lossy(&buffer).into_owned()
            }
        }
    }
}

/// Run a JMESPath expression against a command result
pub fn apply_query(value: &Value, query: &str) -> Result<Value> {
    let expression = jmespath::compile(query).map_err(|e| M365Error::QueryError(e.to_string()))?;
    let result = expression
        .search(value)
        .map_err(|e| M365Error::QueryError(e.to_string()))?;
    Ok(serde_json::to_value(&*result)?)
}

/// Render a command result; `None` means nothing should be printed
///
/// `default_properties` restricts the columns of list output in text/csv/md.
/// It is ignored when a query was given, since the query decides the shape.
pub fn render(
    value: &Value,
    format: OutputFormat,
    query: Option<&str>,
    default_properties: &[&str],
) -> Result<Option<String>> {
    let queried;
    let (value, default_properties) = match query {
        Some(query) => {
            queried = apply_query(value, query)?;
            (&queried, &[][..])
        }
        None => (value, default_properties),
    };

    // An empty list is a header row when columns are known, otherwise nothing
    let empty_list = value.as_array().is_some_and(Vec::is_empty);
    if empty_list && default_properties.is_empty() && format != OutputFormat::Json {
        return Ok(None);
    }

    let text = match format {
        OutputFormat::None => return Ok(None),
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Text => render_text(value, default_properties),
        OutputFormat::Csv => render_csv(value, default_properties)?,
        OutputFormat::Md => render_md(value, default_properties),
    };

    Ok(Some(if text.ends_with('\n') {
        text
    } else {
        format!("{}\n", text)
    }))
}

/// Scalars as-is, strings unquoted, nested values as compact JSON
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Items to show as a table; an empty list qualifies only when default columns exist
fn table_items<'a>(value: &'a Value, default_properties: &[&str]) -> Option<&'a Vec<Value>> {
    value.as_array().filter(|items| {
        (!items.is_empty() || !default_properties.is_empty())
            && items.iter().all(Value::is_object)
    })
}

/// Columns for tabular output: the defaults if given, else every key in first-seen order
fn columns(items: &[Value], default_properties: &[&str], scalars_only: bool) -> Vec<String> {
    if !default_properties.is_empty() {
        return default_properties.iter().map(|p| p.to_string()).collect();
    }

    let mut columns: Vec<String> = Vec::new();
    for item in items {
        if let Some(map) = item.as_object() {
            for (key, value) in map {
                if scalars_only && (value.is_object() || value.is_array()) {
                    continue;
                }
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns
}

fn rows(items: &[Value], columns: &[String]) -> Vec<Vec<String>> {
    items
        .iter()
        .map(|item| columns.iter().map(|c| cell(&item[c.as_str()])).collect())
        .collect()
}

fn render_text(value: &Value, default_properties: &[&str]) -> String {
    if let Some(items) = table_items(value, default_properties) {
        let columns = columns(items, default_properties, true);
        let rows = rows(items, &columns);

        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                rows.iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(c.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<width$}", c, width = *w))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = vec![line(&columns)];
        out.push(
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("  "),
        );
        out.extend(rows.iter().map(|r| line(r)));
        return out.join("\n");
    }

    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, cell(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join("\n"),
        other => cell(other),
    }
}

fn render_csv(value: &Value, default_properties: &[&str]) -> Result<String> {
    let single;
    let items: &[Value] = match value {
        Value::Array(items) => items,
        Value::Object(_) => {
            single = [value.clone()];
            &single
        }
        other => return Ok(cell(other)),
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    if items.iter().all(Value::is_object) {
        let columns = columns(items, default_properties, false);
        if columns.is_empty() {
            return Ok(String::new());
        }
        writer.write_record(&columns)?;
        for row in rows(items, &columns) {
            writer.write_record(&row)?;
        }
    } else {
        for item in items {
            writer.write_record([cell(item)])?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| M365Error::IoError(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn md_escape(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn render_md(value: &Value, default_properties: &[&str]) -> String {
    if let Some(items) = table_items(value, default_properties) {
        let columns = columns(items, default_properties, false);
        let mut out = vec![
            format!("| {} |", columns.join(" | ")),
            format!("|{}|", vec![" --- "; columns.len()].join("|")),
        ];
        for row in rows(items, &columns) {
            let row: Vec<String> = row.iter().map(|c| md_escape(c)).collect();
            out.push(format!("| {} |", row.join(" | ")));
        }
        return out.join("\n");
    }

    match value {
        Value::Object(map) => {
            let mut out = vec!["Property | Value".to_string(), "---------|-------".to_string()];
            out.extend(
                map.iter()
                    .map(|(k, v)| format!("{} | {}", k, md_escape(&cell(v)))),
            );
            out.join("\n")
        }
        Value::Array(items) => items
            .iter()
            .map(|i| format!("- {}", md_escape(&cell(i))))
            .collect::<Vec<_>>()
            .join("\n"),
        other => md_escape(&cell(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> Value {
        json!([
            {"id": "1", "displayName": "Adele Vance", "accountEnabled": true, "manager": {"id": "9"}},
            {"id": "2", "displayName": "Alex Wilber", "accountEnabled": false}
        ])
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!(OutputFormat::parse("JSON").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("md").unwrap(), OutputFormat::Md);
        assert!(OutputFormat::parse("xml").is_err());
    }

    #[test]
    fn test_query_filters_result() {
        let value = apply_query(&users(), "[?accountEnabled].displayName").unwrap();
        assert_eq!(value, json!(["Adele Vance"]));

        assert!(matches!(
            apply_query(&users(), "[?"),
            Err(M365Error::QueryError(_))
        ));
    }

    #[test]
    fn test_text_table_uses_default_properties() {
        let text = render(&users(), OutputFormat::Text, None, &["id", "displayName"])
            .unwrap()
            .unwrap();
        assert_eq!(
            text,
            "id  displayName\n--  -----------\n1   Adele Vance\n2   Alex Wilber\n"
        );
    }

    #[test]
    fn test_text_table_skips_nested_values_without_defaults() {
        let text = render(&users(), OutputFormat::Text, None, &[]).unwrap().unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.contains("accountEnabled"));
        assert!(!header.contains("manager"));
    }

    #[test]
    fn test_text_object_as_key_value_lines() {
        let text = render(
            &json!({"Title": "Marketing", "Id": 7}),
            OutputFormat::Text,
            None,
            &[],
        )
        .unwrap()
        .unwrap();
        assert!(text.contains("Title: Marketing\n"));
        assert!(text.contains("Id: 7"));
    }

    #[test]
    fn test_csv_output() {
        let text = render(&users(), OutputFormat::Csv, None, &["id", "displayName"])
            .unwrap()
            .unwrap();
        assert_eq!(text, "id,displayName\n1,Adele Vance\n2,Alex Wilber\n");
    }

    #[test]
    fn test_md_output_escapes_pipes() {
        let text = render(
            &json!([{"name": "a|b"}]),
            OutputFormat::Md,
            None,
            &[],
        )
        .unwrap()
        .unwrap();
        assert_eq!(text, "| name |\n| --- |\n| a\\|b |\n");
    }

    #[test]
    fn test_query_overrides_default_properties() {
        let text = render(
            &users(),
            OutputFormat::Csv,
            Some("[].{name: displayName}"),
            &["id", "displayName"],
        )
        .unwrap()
        .unwrap();
        assert_eq!(text, "name\nAdele Vance\nAlex Wilber\n");
    }

    #[test]
    fn test_empty_list_prints_header_or_nothing() {
        let empty = json!([]);
        assert_eq!(render(&empty, OutputFormat::Text, None, &[]).unwrap(), None);
        assert_eq!(render(&empty, OutputFormat::Md, None, &[]).unwrap(), None);
        assert_eq!(render(&empty, OutputFormat::Csv, None, &[]).unwrap(), None);
        assert_eq!(
            render(&empty, OutputFormat::Json, None, &[]).unwrap().as_deref(),
            Some("[]\n")
        );

        assert_eq!(
            render(&empty, OutputFormat::Text, None, &["id", "displayName"])
                .unwrap()
                .as_deref(),
            Some("id  displayName\n--  -----------\n")
        );
        assert_eq!(
            render(&empty, OutputFormat::Csv, None, &["id", "displayName"])
                .unwrap()
                .as_deref(),
            Some("id,displayName\n")
        );
        assert_eq!(
            render(&empty, OutputFormat::Md, None, &["id"])
                .unwrap()
                .as_deref(),
            Some("| id |\n| --- |\n")
        );
    }

    #[test]
    fn test_none_prints_nothing() {
        assert!(
            render(&users(), OutputFormat::None, None, &[])
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_buffer_sink_captures_output() {
        let sink = OutputSink::buffer();
        sink.write("hello\n").unwrap();
        assert_eq!(sink.contents(), "hello\n");
    }
}
