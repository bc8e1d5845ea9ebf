/// Display of normalized results as pretty JSON or a table
use crate::core::record::{NormalizedResult, NormalizedValue};
use crate::error::DbmuxResult;
use crate::utils::truncate_chars;
use comfy_table::{Cell, Table};
use std::collections::BTreeSet;
use std::io::Write;

/// Default characters kept per table cell
pub const DEFAULT_FIELD_LIMIT: usize = 25;

/// How a result is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// One pretty-printed document per element
    Json,
    /// One row per element, cells cut to `field_limit` characters
    Table { field_limit: usize },
}

/// Write `result` to `out` in the given mode.
pub fn render<W: Write>(
    result: &NormalizedResult,
    mode: DisplayMode,
    out: &mut W,
) -> DbmuxResult<()> {
    match mode {
        DisplayMode::Json => render_json(result, out),
        DisplayMode::Table { field_limit } => render_table(result, field_limit, out),
    }
}

pub fn render_json<W: Write>(result: &NormalizedResult, out: &mut W) -> DbmuxResult<()> {
    for element in result.elements() {
        serde_json::to_writer_pretty(&mut *out, element).map_err(std::io::Error::from)?;
        writeln!(out)?;
    }
    Ok(())
}

pub fn render_table<W: Write>(
    result: &NormalizedResult,
    field_limit: usize,
    out: &mut W,
) -> DbmuxResult<()> {
    let elements = result.elements();
    if elements.is_empty() {
        return Ok(());
    }

    writeln!(out, "{}", build_table(&elements, field_limit))?;
    Ok(())
}

fn build_table(elements: &[&NormalizedResult], field_limit: usize) -> Table {
    let has_records = elements.iter().any(|e| e.as_record().is_some());
    let has_values = elements.iter().any(|e| e.as_record().is_none());

    let properties: BTreeSet<&str> = elements
        .iter()
        .filter_map(|e| e.as_record())
        .flat_map(|record| record.storage.keys().map(String::as_str))
        .collect();

    let mut header = Vec::new();
    if has_records {
        header.extend(["class", "rid", "version"].iter().map(|s| s.to_string()));
        header.extend(properties.iter().map(|s| s.to_string()));
    }
    if has_values {
        header.push("value".to_string());
    }

    let mut table = Table::new();
    table.set_header(header);

    for element in elements {
        let mut row = Vec::new();
        match element.as_record() {
            Some(record) => {
                row.push(record.class.clone());
                row.push(record.rid.clone());
                row.push(record.version.to_string());
                for property in &properties {
                    row.push(
                        record
                            .storage
                            .get(*property)
                            .map(NormalizedValue::to_cell_text)
                            .unwrap_or_default(),
                    );
                }
                if has_values {
                    row.push(String::new());
                }
            }
            None => {
                if has_records {
                    row.extend(std::iter::repeat(String::new()).take(3 + properties.len()));
                }
                row.push(value_text(element));
            }
        }

        table.add_row(
            row.iter()
                .map(|cell| Cell::new(truncate_chars(cell, field_limit)))
                .collect::<Vec<_>>(),
        );
    }

    table
}

fn value_text(element: &NormalizedResult) -> String {
    match element {
        NormalizedResult::Scalar(value) => value.to_cell_text(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::NormalizedRecord;
    use std::collections::BTreeMap;

    fn person(rid: &str, name: &str) -> NormalizedResult {
        let mut storage = BTreeMap::new();
        storage.insert("name".to_string(), NormalizedValue::String(name.to_string()));
        NormalizedResult::Record(NormalizedRecord {
            class: "Person".to_string(),
            rid: rid.to_string(),
            version: 1,
            storage,
        })
    }

    fn rendered(result: &NormalizedResult, mode: DisplayMode) -> String {
        let mut out = Vec::new();
        render(result, mode, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_json_one_document_per_element() {
        let result =
            NormalizedResult::Sequence(vec![person("#9:0", "alice"), person("#9:1", "bob")]);
        let text = rendered(&result, DisplayMode::Json);

        let documents: Vec<serde_json::Value> = serde_json::Deserializer::from_str(&text)
            .into_iter::<serde_json::Value>()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1]["storage"]["name"], "bob");
        assert!(text.contains("\n  \"class\""));
    }

    #[test]
    fn test_table_columns_and_truncation() {
        let long = "a".repeat(40);
        let result = NormalizedResult::Sequence(vec![person("#9:0", &long)]);

        let text = rendered(&result, DisplayMode::Table { field_limit: 25 });
        for column in ["class", "rid", "version", "name"] {
            assert!(text.contains(column));
        }
        assert!(text.contains(&"a".repeat(25)));
        assert!(!text.contains(&"a".repeat(26)));

        let text = rendered(&result, DisplayMode::Table { field_limit: 100 });
        assert!(text.contains(&long));
    }

    #[test]
    fn test_table_scalars_use_value_column() {
        let result = NormalizedResult::Sequence(vec![
            NormalizedResult::Scalar(NormalizedValue::String("mydb".to_string())),
            NormalizedResult::Scalar(NormalizedValue::String("other".to_string())),
        ]);

        let text = rendered(&result, DisplayMode::Table { field_limit: 25 });
        assert!(text.contains("value"));
        assert!(text.contains("mydb"));
        assert!(text.contains("other"));
        assert!(!text.contains("rid"));
    }

    #[test]
    fn test_table_nested_values_as_json() {
        let mut storage = BTreeMap::new();
        storage.insert(
            "tags".to_string(),
            NormalizedValue::List(vec![
                NormalizedValue::String("x".to_string()),
                NormalizedValue::Reference("#1:2".to_string()),
            ]),
        );
        let result = NormalizedResult::Record(NormalizedRecord {
            class: "V".to_string(),
            rid: "#9:0".to_string(),
            version: 2,
            storage,
        });

        let text = rendered(&result, DisplayMode::Table { field_limit: 25 });
        assert!(text.contains(r##"["x","#1:2"]"##));
    }

    #[test]
    fn test_empty_result_renders_nothing() {
        let result = NormalizedResult::Sequence(Vec::new());
        assert!(rendered(&result, DisplayMode::Table { field_limit: 25 }).is_empty());
        assert!(rendered(&result, DisplayMode::Json).is_empty());
    }
}
