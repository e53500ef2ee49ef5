use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

use super::KeyConflict;
use crate::constants;
use crate::domain::{Customer, Location, Order, RawRecord};

/// Rows of a natural-key table together with the conflicts seen while deduplicating it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub rows: Vec<T>,
    pub conflicts: Vec<KeyConflict>,
}

/// First-wins deduplication over a projection of the input.
///
/// Rows come out in first-seen key order. A later row whose projection
/// differs from the kept one is reported as a conflict, never merged.
pub(crate) fn dedupe_first_wins<T: PartialEq + Serialize>(
    records: &[RawRecord],
    table: &'static str,
    project: impl Fn(&RawRecord) -> T,
    key: fn(&T) -> &str,
) -> Extracted<T> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<T> = Vec::new();
    let mut conflicts = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let candidate = project(record);
        match index.get(key(&candidate)) {
            Some(&kept) => {
                if rows[kept] != candidate {
                    let (first, later) = differing_columns(&rows[kept], &candidate);
                    conflicts.push(KeyConflict {
                        table,
                        key: key(&candidate).to_string(),
                        row: i + 1,
                        first,
                        later,
                    });
                }
            }
            None => {
                index.insert(key(&candidate).to_string(), rows.len());
                rows.push(candidate);
            }
        }
    }

    Extracted { rows, conflicts }
}

type Columns = BTreeMap<String, String>;

/// Column values of two rows, restricted to the columns where they differ
fn differing_columns<T: Serialize>(kept: &T, later: &T) -> (Columns, Columns) {
    let (Ok(Value::Object(kept)), Ok(Value::Object(later))) =
        (serde_json::to_value(kept), serde_json::to_value(later))
    else {
        return (Columns::new(), Columns::new());
    };

    let mut first_values = Columns::new();
    let mut later_values = Columns::new();
    for (column, kept_value) in kept {
        let later_value = later.get(&column).cloned().unwrap_or(Value::Null);
        if kept_value != later_value {
            first_values.insert(column.clone(), render(kept_value));
            later_values.insert(column, render(later_value));
        }
    }
    (first_values, later_values)
}

fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Customers keyed by CustomerID
#[instrument(skip_all)]
pub fn extract_customers(records: &[RawRecord]) -> Extracted<Customer> {
    dedupe_first_wins(
        records,
        constants::CUSTOMERS,
        |r| Customer {
            customer_id: r.customer_id.clone(),
            customer_name: r.customer_name.clone(),
            segment: r.segment.clone(),
        },
        |c| c.customer_id.as_str(),
    )
}

/// Locations keyed by PostalCode
#[instrument(skip_all)]
pub fn extract_locations(records: &[RawRecord]) -> Extracted<Location> {
    dedupe_first_wins(
        records,
        constants::LOCATIONS,
        |r| Location {
            postal_code: r.postal_code.clone(),
            city: r.city.clone(),
            state: r.state.clone(),
            region: r.region.clone(),
        },
        |l| l.postal_code.as_str(),
    )
}

/// Orders keyed by OrderID, carrying the customer and shipping location of their first line item
#[instrument(skip_all)]
pub fn extract_orders(records: &[RawRecord]) -> Extracted<Order> {
    dedupe_first_wins(
        records,
        constants::ORDERS,
        |r| Order {
            order_id: r.order_id.clone(),
            order_date: r.order_date.clone(),
            ship_date: r.ship_date.clone(),
            ship_mode: r.ship_mode.clone(),
            customer_id: r.customer_id.clone(),
            postal_code: r.postal_code.clone(),
        },
        |o| o.order_id.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::normalize::test_support::record;

    #[test]
    fn test_customers_deduplicated_in_first_seen_order() {
        let records = vec![
            RawRecord {
                customer_id: "DV-13045".to_string(),
                customer_name: "Darrin Van Huff".to_string(),
                segment: "Corporate".to_string(),
                ..record("CA-1", "P-1")
            },
            record("CA-2", "P-2"),
            RawRecord {
                customer_id: "DV-13045".to_string(),
                customer_name: "Darrin Van Huff".to_string(),
                segment: "Corporate".to_string(),
                ..record("CA-3", "P-3")
            },
        ];

        let customers = extract_customers(&records);

        let ids: Vec<&str> = customers.rows.iter().map(|c| c.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["DV-13045", "CG-12520"]);
        assert!(customers.conflicts.is_empty());
    }

    #[test]
    fn test_locations_first_wins_on_conflict() {
        let records = vec![
            record("CA-1", "P-1"),
            RawRecord {
                city: "Bowling Green".to_string(),
                ..record("CA-2", "P-2")
            },
        ];

        let locations = extract_locations(&records);

        assert_eq!(locations.rows.len(), 1);
        assert_eq!(locations.rows[0].city, "Henderson");
        assert_eq!(locations.conflicts.len(), 1);
        assert_eq!(locations.conflicts[0].key, "42420");
        assert_eq!(locations.conflicts[0].row, 2);
        assert_eq!(
            locations.conflicts[0].first,
            BTreeMap::from([("City".to_string(), "Henderson".to_string())])
        );
        assert_eq!(
            locations.conflicts[0].later,
            BTreeMap::from([("City".to_string(), "Bowling Green".to_string())])
        );
    }

    #[test]
    fn test_orders_one_row_per_order_id() {
        let records = vec![
            record("CA-2016-152156", "FUR-BO-10001798"),
            record("CA-2016-152156", "FUR-CH-10000454"),
            record("CA-2016-138688", "OFF-LA-10000240"),
        ];

        let orders = extract_orders(&records);

        let ids: Vec<&str> = orders.rows.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["CA-2016-152156", "CA-2016-138688"]);
        assert_eq!(orders.rows[0].customer_id, "CG-12520");
        assert_eq!(orders.rows[0].postal_code, "42420");
        assert!(orders.conflicts.is_empty());
    }

    #[test]
    fn test_order_with_second_ship_mode_is_a_conflict() {
        let records = vec![
            record("CA-1", "P-1"),
            RawRecord {
                ship_mode: "Same Day".to_string(),
                ..record("CA-1", "P-2")
            },
        ];

        let orders = extract_orders(&records);

        assert_eq!(orders.rows.len(), 1);
        assert_eq!(orders.rows[0].ship_mode, "Second Class");
        assert_eq!(orders.conflicts[0].table, constants::ORDERS);
        let changed: Vec<&String> = orders.conflicts[0].later.keys().collect();
        assert_eq!(changed, vec!["ShipMode"]);
    }
}
