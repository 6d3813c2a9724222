//! Baseline dataset: a previously exported catalog used as the reconciliation target

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::product::ProductLink;
use crate::domain::text::parse_price;
use crate::error::BaselineError;

/// Side columns appended by reconciliation, in the order they are added.
pub mod side_columns {
    pub const PRICE_DELTA: &str = "price_delta";
    pub const CHANGED_OPTION1: &str = "changed_option1";
    pub const CHANGED_OPTION2: &str = "changed_option2";
    pub const CHANGED_NAME: &str = "changed_name";
    pub const SOLD_OUT: &str = "sold_out";

    pub const ALL: [&str; 5] = [
        PRICE_DELTA,
        CHANGED_OPTION1,
        CHANGED_OPTION2,
        CHANGED_NAME,
        SOLD_OUT,
    ];
}

/// Names of the baseline columns reconciliation reads and writes.
///
/// The defaults are the headers written by a catalog export, so an exported
/// snapshot can be fed back as a baseline unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineColumns {
    pub site: String,
    pub category: String,
    pub link: String,
    pub name: String,
    pub price: String,
    pub option1: String,
    pub option2: String,
}

impl Default for BaselineColumns {
    fn default() -> Self {
        Self {
            site: "site".to_string(),
            category: "category".to_string(),
            link: "link".to_string(),
            name: "name".to_string(),
            price: "sale_price".to_string(),
            option1: "option1".to_string(),
            option2: "option2".to_string(),
        }
    }
}

impl BaselineColumns {
    pub fn required(&self) -> [&str; 7] {
        [
            self.site.as_str(),
            self.category.as_str(),
            self.link.as_str(),
            self.name.as_str(),
            self.price.as_str(),
            self.option1.as_str(),
            self.option2.as_str(),
        ]
    }
}

pub type BaselineRow = Map<String, Value>;

/// Links of one site, in baseline row order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteGroup {
    pub site: String,
    pub links: Vec<ProductLink>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaselineDataset {
    columns: Vec<String>,
    rows: Vec<BaselineRow>,
}

impl BaselineDataset {
    pub fn new(columns: Vec<String>, rows: Vec<BaselineRow>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[BaselineRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn require_columns(&self, columns: &BaselineColumns) -> Result<(), BaselineError> {
        let missing: Vec<String> = columns
            .required()
            .into_iter()
            .filter(|name| !self.columns.iter().any(|c| c == *name))
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BaselineError::MissingColumns(missing))
        }
    }

    /// Append `name` as an empty column unless it already exists.
    pub fn ensure_column(&mut self, name: &str) {
        if self.columns.iter().any(|c| c == name) {
            return;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.entry(name.to_string())
                .or_insert_with(|| Value::String(String::new()));
        }
    }

    /// Index of the first row whose `link_column` equals `link`.
    pub fn first_row_with_link(&self, link_column: &str, link: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(link_column).is_some_and(|v| cell_text(v) == link))
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut BaselineRow> {
        self.rows.get_mut(index)
    }

    /// Group `(category, link)` pairs by site, sites in order of first appearance.
    pub fn site_groups(&self, columns: &BaselineColumns) -> Vec<SiteGroup> {
        let mut groups: Vec<SiteGroup> = Vec::new();

        for row in &self.rows {
            let site = row.get(&columns.site).map(cell_text).unwrap_or_default();
            let link = row.get(&columns.link).map(cell_text).unwrap_or_default();
            if site.is_empty() || link.is_empty() {
                continue;
            }
            let category = row.get(&columns.category).map(cell_text).unwrap_or_default();
            let link = ProductLink::new(category, link);

            match groups.iter_mut().find(|g| g.site == site) {
                Some(group) => group.links.push(link),
                None => groups.push(SiteGroup {
                    site,
                    links: vec![link],
                }),
            }
        }

        groups
    }

    /// Rows as JSON objects with every column present, in column order.
    pub fn to_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut ordered = Map::with_capacity(self.columns.len());
                for column in &self.columns {
                    ordered.insert(
                        column.clone(),
                        row.get(column).cloned().unwrap_or(Value::Null),
                    );
                }
                Value::Object(ordered)
            })
            .collect()
    }
}

/// Render a cell the way it reads in the sheet.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read a price cell; numbers are taken as-is, text is parsed for digits.
pub fn cell_price(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => parse_price(s),
        _ => None,
    }
}
