//! Spreadsheet sink and source
//!
//! - [`XlsxEncoder`] renders a [`StyledSheet`] into `.xlsx` bytes with `rust_xlsxwriter`
//! - [`read_table`] loads the first row as headers and the rest as rows with `calamine`

use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet};
use serde_json::{Map, Number, Value};

use crate::domain::BaselineDataset;
use crate::error::{BaselineError, ExportError};

/// One cell of a tabulated sheet
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl CellValue {
    /// Text as it appears in the sheet, used for column sizing.
    pub fn rendered(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(text) => text.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }

    pub fn rendered_width(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            other => other.rendered().chars().count(),
        }
    }
}

/// Fill, font and border of a cell; colors are `0xRRGGBB`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellStyle {
    pub fill: Option<u32>,
    pub font_color: Option<u32>,
    pub bold: bool,
    pub border_color: Option<u32>,
}

impl CellStyle {
    fn to_format(self) -> Format {
        let mut format = Format::new();
        if let Some(fill) = self.fill {
            format = format.set_background_color(Color::RGB(fill));
        }
        if let Some(color) = self.font_color {
            format = format.set_font_color(Color::RGB(color));
        }
        if self.bold {
            format = format.set_bold();
        }
        if let Some(color) = self.border_color {
            format = format
                .set_border(FormatBorder::Thin)
                .set_border_color(Color::RGB(color));
        }
        format
    }
}

/// A fully tabulated and styled sheet, ready to encode
#[derive(Debug, Clone, PartialEq)]
pub struct StyledSheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub header_style: CellStyle,
    /// Style of each body row, by offset
    pub row_styles: Vec<CellStyle>,
    pub column_widths: Vec<f64>,
}

pub trait SheetEncoder: Send + Sync {
    fn encode(&self, sheet: &StyledSheet) -> Result<Vec<u8>, ExportError>;

    /// File extension including the dot
    fn extension(&self) -> &'static str {
        ".xlsx"
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxEncoder;

impl SheetEncoder for XlsxEncoder {
    fn encode(&self, sheet: &StyledSheet) -> Result<Vec<u8>, ExportError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        let header_format = sheet.header_style.to_format();
        for (col, name) in sheet.columns.iter().enumerate() {
            worksheet.write_string_with_format(0, column_index(col)?, name, &header_format)?;
        }

        for (offset, row) in sheet.rows.iter().enumerate() {
            let format = sheet
                .row_styles
                .get(offset)
                .copied()
                .unwrap_or_default()
                .to_format();
            let row_index = u32::try_from(offset + 1)
                .map_err(|_| ExportError::Tabulate(format!("row {offset} out of range")))?;

            for (col, cell) in row.iter().enumerate() {
                write_cell(worksheet, row_index, column_index(col)?, cell, &format)?;
            }
        }

        for (col, width) in sheet.column_widths.iter().enumerate() {
            worksheet.set_column_width(column_index(col)?, *width)?;
        }

        Ok(workbook.save_to_buffer()?)
    }
}

fn column_index(col: usize) -> Result<u16, ExportError> {
    u16::try_from(col).map_err(|_| ExportError::Tabulate(format!("column {col} out of range")))
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    format: &Format,
) -> Result<(), ExportError> {
    match cell {
        CellValue::Empty => {
            worksheet.write_blank(row, col, format)?;
        }
        CellValue::Text(text) => {
            worksheet.write_string_with_format(row, col, text, format)?;
        }
        CellValue::Integer(n) => {
            worksheet.write_number_with_format(row, col, *n as f64, format)?;
        }
        CellValue::Float(f) => {
            worksheet.write_number_with_format(row, col, *f, format)?;
        }
        CellValue::Bool(b) => {
            worksheet.write_boolean_with_format(row, col, *b, format)?;
        }
    }
    Ok(())
}

/// Read one sheet (the first when `sheet` is `None`) into a table.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<BaselineDataset, BaselineError> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| {
        BaselineError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| BaselineError::SheetMissing("<first>".to_string()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|_| BaselineError::SheetMissing(sheet_name.clone()))?;

    let mut rows = range.rows();
    let header = rows.next().ok_or(BaselineError::NoHeader)?;
    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("column_{}", i + 1),
            other => other.to_string(),
        })
        .collect();

    let body = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), row.get(i).map_or(Value::Null, cell_to_json)))
                .collect::<Map<String, Value>>()
        })
        .collect();

    Ok(BaselineDataset::new(columns, body))
}

fn cell_to_json(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(n) => Value::Number((*n).into()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Number((*f as i64).into()),
        Data::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Data::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> StyledSheet {
        StyledSheet {
            name: "Sheet1".into(),
            columns: vec!["product_no".into(), "name".into(), "sale_price".into(), "sold_out".into()],
            rows: vec![
                vec![
                    CellValue::Integer(1),
                    CellValue::Text("Locò".into()),
                    CellValue::Integer(3_150_000),
                    CellValue::Empty,
                ],
                vec![
                    CellValue::Integer(2),
                    CellValue::Text("VLogo".into()),
                    CellValue::Float(99.5),
                    CellValue::Bool(false),
                ],
            ],
            header_style: CellStyle {
                fill: Some(0x44_72C4),
                font_color: Some(0xFF_FFFF),
                bold: true,
                border_color: Some(0x2E_5C99),
            },
            row_styles: vec![
                CellStyle {
                    fill: Some(0xD9_E1F2),
                    ..CellStyle::default()
                },
                CellStyle::default(),
            ],
            column_widths: vec![14.4, 9.6, 14.4, 12.0],
        }
    }

    #[test]
    fn encoded_sheet_reads_back() {
        let bytes = XlsxEncoder.encode(&sheet()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        std::fs::write(&path, bytes).unwrap();

        let table = read_table(&path, None).unwrap();
        assert_eq!(table.columns(), ["product_no", "name", "sale_price", "sold_out"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0]["name"], Value::String("Locò".into()));
        assert_eq!(table.rows()[0]["sale_price"], Value::from(3_150_000));
        assert_eq!(table.rows()[0]["sold_out"], Value::Null);
    }

    #[test]
    fn header_only_sheet_is_an_empty_table() {
        let mut empty = sheet();
        empty.rows.clear();
        empty.row_styles.clear();
        let bytes = XlsxEncoder.encode(&empty).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        std::fs::write(&path, bytes).unwrap();

        let table = read_table(&path, Some("Sheet1")).unwrap();
        assert_eq!(table.columns().len(), 4);
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_sheet_is_reported() {
        let bytes = XlsxEncoder.encode(&sheet()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_table(&path, Some("Missing")),
            Err(BaselineError::SheetMissing(name)) if name == "Missing"
        ));
    }

    #[test]
    fn missing_file_fails_to_open() {
        let err = read_table(Path::new("/nonexistent/baseline.xlsx"), None).unwrap_err();
        assert!(matches!(err, BaselineError::Open { .. }));
    }

    #[test]
    fn width_counts_characters_not_bytes() {
        assert_eq!(CellValue::Text("숄더백".into()).rendered_width(), 3);
        assert_eq!(CellValue::Integer(-1200).rendered_width(), 5);
        assert_eq!(CellValue::Empty.rendered_width(), 0);
    }
}
