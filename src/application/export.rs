//! # Export Pipeline
//!
//! Turns records into a styled sheet and writes it under the dataset
//! directory. Steps, in order: sanitize control characters, flatten into a
//! table, style header and stripes while sizing columns, encode, persist.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::crawling::clock::{Clock, RunStamp};
use crate::domain::{BaselineDataset, CatalogSnapshot, PRODUCT_COLUMNS};
use crate::error::ExportError;
use crate::infrastructure::config::{ExportConfig, OutputConfig, SheetStyle};
use crate::infrastructure::spreadsheet::{CellStyle, CellValue, SheetEncoder, StyledSheet};

/// Characters the sheet format rejects
const FORBIDDEN_CHARS: [char; 3] = ['\u{0}', '\u{b}', '\u{c}'];

/// Separator for array values flattened into one cell
const ARRAY_SEPARATOR: &str = ";\n";

/// Strip characters the sheet format rejects from every string, recursively.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) if s.contains(FORBIDDEN_CHARS) => {
            Value::String(s.replace(FORBIDDEN_CHARS, ""))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect())
        }
        other => other,
    }
}

/// Plain table: header names and one cell per column per row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Flatten JSON objects into a table, keeping record order.
///
/// Columns are `seed_columns` first, then every other key in the order it is
/// first seen. Nested objects become `parent.child` columns.
pub fn tabulate(records: &[Value], seed_columns: &[&str]) -> Result<Table, ExportError> {
    let mut columns: Vec<String> = seed_columns.iter().map(|c| (*c).to_string()).collect();
    let mut flat_rows = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let Value::Object(map) = record else {
            return Err(ExportError::Tabulate(format!(
                "record {index} is not an object"
            )));
        };
        let mut flat = Map::new();
        flatten_into(&mut flat, "", map);
        for key in flat.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
        flat_rows.push(flat);
    }

    let rows = flat_rows
        .iter()
        .map(|flat| {
            columns
                .iter()
                .map(|column| flat.get(column).map_or(CellValue::Empty, to_cell))
                .collect()
        })
        .collect();

    Ok(Table { columns, rows })
}

fn flatten_into(out: &mut Map<String, Value>, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(out, &name, nested),
            other => {
                out.insert(name, other.clone());
            }
        }
    }
}

fn to_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map(CellValue::Integer)
            .or_else(|| n.as_f64().map(CellValue::Float))
            .unwrap_or_else(|| CellValue::Text(n.to_string())),
        Value::String(s) => CellValue::Text(s.clone()),
        Value::Array(items) => CellValue::Text(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(ARRAY_SEPARATOR),
        ),
        Value::Object(_) => CellValue::Text(value.to_string()),
    }
}

pub fn header_style(style: &SheetStyle) -> CellStyle {
    CellStyle {
        fill: Some(style.header_fill),
        font_color: Some(style.header_font_color),
        bold: true,
        border_color: Some(style.header_border_color),
    }
}

/// Body row styles: even offsets are striped, odd offsets plain.
pub fn stripe_styles(style: &SheetStyle, rows: usize) -> Vec<CellStyle> {
    let stripe = CellStyle {
        fill: Some(style.stripe_fill),
        font_color: Some(style.stripe_font_color),
        bold: false,
        border_color: Some(style.stripe_border_color),
    };
    (0..rows)
        .map(|offset| {
            if offset % 2 == 0 {
                stripe
            } else {
                CellStyle::default()
            }
        })
        .collect()
}

/// `(longest rendered cell + padding) * scale` per column, header included.
pub fn column_widths(table: &Table, style: &SheetStyle) -> Vec<f64> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let longest = table
                .rows
                .iter()
                .filter_map(|row| row.get(col))
                .map(CellValue::rendered_width)
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0);
            (longest + style.width_padding) as f64 * style.width_scale
        })
        .collect()
}

/// Style a table; widths and stripes are computed concurrently.
pub async fn style_table(table: Table, sheet_name: &str, style: &SheetStyle) -> StyledSheet {
    let (column_widths, row_styles) = tokio::join!(
        async { column_widths(&table, style) },
        async { stripe_styles(style, table.rows.len()) },
    );

    StyledSheet {
        name: sheet_name.to_string(),
        columns: table.columns,
        rows: table.rows,
        header_style: header_style(style),
        row_styles,
        column_widths,
    }
}

pub struct ExportPipeline {
    encoder: Arc<dyn SheetEncoder>,
    output: OutputConfig,
    config: ExportConfig,
    clock: Arc<dyn Clock>,
}

impl ExportPipeline {
    pub fn new(
        encoder: Arc<dyn SheetEncoder>,
        output: OutputConfig,
        config: ExportConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            encoder,
            output,
            config,
            clock,
        }
    }

    /// Export a fresh scrape under the catalog dataset name.
    pub async fn export_snapshot(&self, snapshot: &CatalogSnapshot) -> Result<PathBuf, ExportError> {
        let rows = snapshot
            .to_rows()
            .map_err(|e| self.fail(ExportError::Tabulate(e.to_string())))?;
        self.export(&self.config.catalog_dataset, rows, PRODUCT_COLUMNS)
            .await
    }

    /// Export a reconciled baseline, keeping its column order.
    pub async fn export_baseline(&self, baseline: &BaselineDataset) -> Result<PathBuf, ExportError> {
        let seeds: Vec<&str> = baseline.columns().iter().map(String::as_str).collect();
        self.export(&self.config.reconciled_dataset, baseline.to_rows(), &seeds)
            .await
    }

    /// Write `records` to `<root>/<excel>/<dataset>/<dataset>_<minute>.xlsx`.
    pub async fn export(
        &self,
        dataset: &str,
        records: Vec<Value>,
        seed_columns: &[&str],
    ) -> Result<PathBuf, ExportError> {
        let records: Vec<Value> = records.into_iter().map(sanitize).collect();
        let table = tabulate(&records, seed_columns).map_err(|e| self.fail(e))?;
        let row_count = table.rows.len();
        let sheet = style_table(table, &self.config.sheet_name, &self.config.style).await;

        let encoder = Arc::clone(&self.encoder);
        let extension = encoder.extension();
        let bytes = tokio::task::spawn_blocking(move || encoder.encode(&sheet))
            .await
            .map_err(|e| self.fail(ExportError::Worker(e.to_string())))?
            .map_err(|e| self.fail(e))?;

        let dir = self.output.dataset_dir(dataset);
        tokio::fs::create_dir_all(&dir).await.map_err(|source| {
            self.fail(ExportError::CreateDir {
                path: dir.clone(),
                source,
            })
        })?;

        let stamp = RunStamp::from_clock(self.clock.as_ref());
        let path = dir.join(format!("{dataset}_{}{extension}", stamp.minute()));
        tokio::fs::write(&path, bytes).await.map_err(|source| {
            self.fail(ExportError::Write {
                path: path.clone(),
                source,
            })
        })?;

        info!("📄 Exported {} rows to {}", row_count, path.display());
        Ok(path)
    }

    fn fail(&self, error: ExportError) -> ExportError {
        error!("Export failed: {}", error);
        error
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::crawling::clock::FakeClock;
    use crate::infrastructure::spreadsheet::XlsxEncoder;

    #[rstest]
    #[case("a\u{0}b", "ab")]
    #[case("\u{b}tab\u{c}", "tab")]
    #[case("숄더백 Locò", "숄더백 Locò")]
    #[case("line\nbreak\t", "line\nbreak\t")]
    fn sanitize_strips_only_forbidden(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize(json!(input)), json!(expected));
    }

    #[test]
    fn sanitize_recurses_into_nested_values() {
        let value = json!({"a": ["x\u{0}", {"b": "y\u{c}"}], "n": 3});
        assert_eq!(sanitize(value), json!({"a": ["x", {"b": "y"}], "n": 3}));
    }

    proptest! {
        #[test]
        fn sanitize_removes_exactly_forbidden_chars(
            s in prop::collection::vec(
                prop_oneof![Just('\u{0}'), Just('\u{b}'), Just('\u{c}'), any::<char>()],
                0..40,
            )
            .prop_map(|chars| chars.into_iter().collect::<String>())
        ) {
            let expected: String = s.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect();
            prop_assert_eq!(sanitize(Value::String(s)), Value::String(expected));
        }
    }

    #[test]
    fn tabulate_seeds_then_union_of_keys() {
        let records = vec![
            json!({"name": "Shoe", "extra": 1}),
            json!({"name": "Bag", "meta": {"color": "red"}, "tags": ["a", "b"]}),
        ];
        let table = tabulate(&records, &["product_no", "name"]).unwrap();

        assert_eq!(
            table.columns,
            ["product_no", "name", "extra", "meta.color", "tags"]
        );
        assert_eq!(table.rows[0][0], CellValue::Empty);
        assert_eq!(table.rows[0][2], CellValue::Integer(1));
        assert_eq!(table.rows[1][3], CellValue::Text("red".into()));
        assert_eq!(table.rows[1][4], CellValue::Text("a;\nb".into()));
    }

    #[test]
    fn tabulate_rejects_non_objects() {
        assert!(matches!(
            tabulate(&[json!(1)], &[]),
            Err(ExportError::Tabulate(_))
        ));
    }

    #[test]
    fn stripes_start_at_first_body_row() {
        let style = SheetStyle::default();
        let styles = stripe_styles(&style, 3);
        assert_eq!(styles[0].fill, Some(0x00D9_E1F2));
        assert_eq!(styles[1], CellStyle::default());
        assert_eq!(styles[2].border_color, Some(0x00B4_C6E7));
    }

    #[test]
    fn widths_cover_header_and_body() {
        let table = Table {
            columns: vec!["name".into(), "n".into()],
            rows: vec![vec![CellValue::Text("Locò bag".into()), CellValue::Integer(12345)]],
        };
        let widths = column_widths(&table, &SheetStyle::default());
        assert!((widths[0] - 12.0).abs() < 1e-9);
        assert!((widths[1] - 8.4).abs() < 1e-9);
    }

    fn pipeline(root: &std::path::Path) -> ExportPipeline {
        ExportPipeline::new(
            Arc::new(XlsxEncoder),
            OutputConfig {
                root: root.to_path_buf(),
                ..OutputConfig::default()
            },
            ExportConfig::default(),
            Arc::new(FakeClock::fixed()),
        )
    }

    #[tokio::test]
    async fn unwritable_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"").unwrap();

        let err = pipeline(&blocker)
            .export_snapshot(&CatalogSnapshot::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::CreateDir { ref path, .. } if path.starts_with(&blocker)));
    }

    #[tokio::test]
    async fn encoder_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ExportPipeline::new(
            Arc::new(crate::testing::FailingEncoder),
            OutputConfig {
                root: dir.path().to_path_buf(),
                ..OutputConfig::default()
            },
            ExportConfig::default(),
            Arc::new(FakeClock::fixed()),
        );

        let err = pipeline
            .export("catalog", vec![json!({"name": "Bag"})], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Encode(_)));
        assert!(!dir.path().join("excel").exists());
    }

    #[tokio::test]
    async fn empty_snapshot_exports_header_only_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = pipeline(dir.path())
            .export_snapshot(&CatalogSnapshot::new())
            .await
            .unwrap();

        assert_eq!(
            path,
            dir.path()
                .join("excel")
                .join("catalog")
                .join("catalog_2024-03-05_09_07.xlsx")
        );
        let table = crate::infrastructure::spreadsheet::read_table(&path, None).unwrap();
        assert_eq!(table.columns(), PRODUCT_COLUMNS);
        assert!(table.is_empty());
    }
}
