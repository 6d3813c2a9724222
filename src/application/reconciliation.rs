//! Reconciliation of freshly scraped details against a baseline
//!
//! Rows are joined on the link column, first match wins. Name and option
//! changes are written to side columns and leave the canonical cell alone;
//! a price change overwrites the price cell and records the absolute delta.
//! `sold_out` is cleared on every matched row.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::baseline::{cell_price, cell_text};
use crate::domain::{BaselineColumns, BaselineDataset, ProductDetail, side_columns};

/// Counts of what one reconciliation pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub matched: usize,
    /// Fresh details whose link is not in the baseline; they are dropped
    pub unmatched: usize,
    pub names_changed: usize,
    pub options_changed: usize,
    pub prices_changed: usize,
    /// Baseline price cells that could not be read and were overwritten without a delta
    pub prices_unreadable: usize,
}

impl ReconcileReport {
    pub fn merge(&mut self, other: Self) {
        self.matched += other.matched;
        self.unmatched += other.unmatched;
        self.names_changed += other.names_changed;
        self.options_changed += other.options_changed;
        self.prices_changed += other.prices_changed;
        self.prices_unreadable += other.prices_unreadable;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    columns: BaselineColumns,
}

impl ReconciliationEngine {
    pub fn new(columns: BaselineColumns) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &BaselineColumns {
        &self.columns
    }

    /// Append the side columns the baseline does not have yet, empty.
    pub fn prepare(&self, baseline: &mut BaselineDataset) {
        for column in side_columns::ALL {
            baseline.ensure_column(column);
        }
    }

    /// Apply `fresh` to `baseline` in place.
    pub fn reconcile(&self, baseline: &mut BaselineDataset, fresh: &[ProductDetail]) -> ReconcileReport {
        self.prepare(baseline);

        let mut report = ReconcileReport::default();
        for detail in fresh {
            let Some(index) = baseline.first_row_with_link(&self.columns.link, &detail.link) else {
                debug!("No baseline row for {}, dropped", detail.link);
                report.unmatched += 1;
                continue;
            };
            let Some(row) = baseline.row_mut(index) else {
                continue;
            };
            report.matched += 1;

            let text_fields = [
                (&self.columns.name, side_columns::CHANGED_NAME, &detail.name),
                (&self.columns.option1, side_columns::CHANGED_OPTION1, &detail.option1),
                (&self.columns.option2, side_columns::CHANGED_OPTION2, &detail.option2),
            ];
            for (column, side, fresh_value) in text_fields {
                let current = row.get(column).map(cell_text).unwrap_or_default();
                if current != *fresh_value {
                    row.insert(side.to_string(), Value::String(fresh_value.clone()));
                    if side == side_columns::CHANGED_NAME {
                        report.names_changed += 1;
                    } else {
                        report.options_changed += 1;
                    }
                }
            }

            let fresh_price = detail.sale_price;
            match row.get(&self.columns.price).and_then(cell_price) {
                Some(old) if old == fresh_price => {}
                Some(old) => {
                    let delta = old.max(fresh_price) - old.min(fresh_price);
                    row.insert(side_columns::PRICE_DELTA.to_string(), Value::from(delta));
                    row.insert(self.columns.price.clone(), Value::from(fresh_price));
                    report.prices_changed += 1;
                }
                None => {
                    warn!(
                        "Baseline price for {} is unreadable, overwriting with {}",
                        detail.link, fresh_price
                    );
                    row.insert(self.columns.price.clone(), Value::from(fresh_price));
                    report.prices_unreadable += 1;
                }
            }

            row.insert(side_columns::SOLD_OUT.to_string(), Value::String(String::new()));
        }

        info!(
            "Reconciled {} rows ({} unmatched, {} price changes, {} name changes, {} option changes)",
            report.matched,
            report.unmatched,
            report.prices_changed,
            report.names_changed,
            report.options_changed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;

    fn baseline(rows: Vec<Value>) -> BaselineDataset {
        let columns = ["site", "category", "link", "name", "sale_price", "option1", "option2"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| row.as_object().cloned().unwrap_or_else(Map::new))
            .collect();
        BaselineDataset::new(columns, rows)
    }

    fn fresh(link: &str, name: &str, price: i64) -> ProductDetail {
        ProductDetail {
            site: "Shop".into(),
            category: "Shoes".into(),
            name: name.into(),
            sale_price: price,
            list_price: price,
            option1: "Black".into(),
            option2: "270".into(),
            link: link.into(),
            ..ProductDetail::default()
        }
    }

    fn shoe_row() -> Value {
        json!({"site": "Shop", "category": "Shoes", "link": "a", "name": "Shoe",
               "sale_price": 1000, "option1": "Black", "option2": "270"})
    }

    #[test]
    fn price_increase_overwrites_and_records_delta() {
        let mut data = baseline(vec![shoe_row()]);
        let report = ReconciliationEngine::default().reconcile(&mut data, &[fresh("a", "Shoe", 1200)]);

        let row = &data.rows()[0];
        assert_eq!(row["sale_price"], json!(1200));
        assert_eq!(row["price_delta"], json!(200));
        assert_eq!(row["changed_name"], json!(""));
        assert_eq!(report.prices_changed, 1);
        assert_eq!(report.names_changed, 0);
    }

    #[test]
    fn price_decrease_delta_is_absolute() {
        let mut data = baseline(vec![shoe_row()]);
        ReconciliationEngine::default().reconcile(&mut data, &[fresh("a", "Shoe", 700)]);

        assert_eq!(data.rows()[0]["price_delta"], json!(300));
        assert_eq!(data.rows()[0]["sale_price"], json!(700));
    }

    #[test]
    fn unchanged_record_writes_no_side_values() {
        let mut data = baseline(vec![shoe_row()]);
        let report = ReconciliationEngine::default().reconcile(&mut data, &[fresh("a", "Shoe", 1000)]);

        let row = &data.rows()[0];
        for side in side_columns::ALL {
            assert_eq!(row[side], json!(""), "{side}");
        }
        assert_eq!(report.matched, 1);
        assert_eq!(report.prices_changed + report.names_changed + report.options_changed, 0);
    }

    #[test]
    fn name_change_is_annotated_not_overwritten() {
        let mut data = baseline(vec![shoe_row()]);
        let mut detail = fresh("a", "Running shoe", 1000);
        detail.option2 = "280".into();
        ReconciliationEngine::default().reconcile(&mut data, &[detail]);

        let row = &data.rows()[0];
        assert_eq!(row["name"], json!("Shoe"));
        assert_eq!(row["changed_name"], json!("Running shoe"));
        assert_eq!(row["option2"], json!("270"));
        assert_eq!(row["changed_option2"], json!("280"));
        assert_eq!(row["changed_option1"], json!(""));
    }

    #[test]
    fn unmatched_record_adds_nothing() {
        let mut data = baseline(vec![shoe_row()]);
        let before = data.rows()[0].clone();
        let report = ReconciliationEngine::default().reconcile(&mut data, &[fresh("zzz", "Other", 5)]);

        assert_eq!(data.len(), 1);
        let mut expected = before;
        for side in side_columns::ALL {
            expected.insert(side.to_string(), json!(""));
        }
        assert_eq!(data.rows()[0], expected);
        assert_eq!(report.unmatched, 1);
    }

    #[test]
    fn only_first_duplicate_link_is_updated() {
        let mut data = baseline(vec![shoe_row(), shoe_row()]);
        ReconciliationEngine::default().reconcile(&mut data, &[fresh("a", "Shoe", 1500)]);

        assert_eq!(data.rows()[0]["sale_price"], json!(1500));
        assert_eq!(data.rows()[1]["sale_price"], json!(1000));
    }

    #[test]
    fn sold_out_is_cleared_on_matched_rows() {
        let mut row = shoe_row();
        row["sold_out"] = json!("O");
        let mut other = shoe_row();
        other["link"] = json!("b");
        other["sold_out"] = json!("O");
        let mut data = baseline(vec![row, other]);

        ReconciliationEngine::default().reconcile(&mut data, &[fresh("a", "Shoe", 1000)]);

        assert_eq!(data.rows()[0]["sold_out"], json!(""));
        assert_eq!(data.rows()[1]["sold_out"], json!("O"));
    }

    #[test]
    fn unreadable_baseline_price_is_overwritten_without_delta() {
        let mut row = shoe_row();
        row["sale_price"] = json!("ask in store");
        let mut data = baseline(vec![row]);

        let report = ReconciliationEngine::default().reconcile(&mut data, &[fresh("a", "Shoe", 900)]);

        assert_eq!(data.rows()[0]["sale_price"], json!(900));
        assert_eq!(data.rows()[0]["price_delta"], json!(""));
        assert_eq!(report.prices_unreadable, 1);
    }

    #[test]
    fn side_columns_follow_baseline_columns() {
        let mut data = baseline(vec![shoe_row()]);
        ReconciliationEngine::default().reconcile(&mut data, &[]);

        assert_eq!(
            &data.columns()[7..],
            ["price_delta", "changed_option1", "changed_option2", "changed_name", "sold_out"]
        );
    }
}
