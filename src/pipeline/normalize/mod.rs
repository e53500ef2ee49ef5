//! Decomposition of the flat sales export into seven related tables.
//!
//! Extraction runs in dependency order: tables without foreign keys first,
//! then the category hierarchy, products, orders, and finally the
//! order-detail fact table. Later steps only read tables produced earlier in
//! the same run.

pub mod details;
pub mod entities;
pub mod hierarchy;
pub mod integrity;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument, warn};

use crate::constants;
use crate::domain::{
    Category, Customer, Location, Order, OrderDetail, Product, RawRecord, SubCategory,
};
use crate::error::{NormalizeError, Result};

pub use details::extract_order_details;
pub use entities::{extract_customers, extract_locations, extract_orders, Extracted};
pub use hierarchy::{extract_categories, extract_products, extract_subcategories};

/// A natural key that reappeared with attribute values differing from its first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyConflict {
    pub table: &'static str,
    pub key: String,
    /// 1-based position of the conflicting row among the input data rows
    pub row: usize,
    /// Kept values of the columns the later row disagrees on
    pub first: BTreeMap<String, String>,
    /// The later row's values for the same columns
    pub later: BTreeMap<String, String>,
}

/// Every natural-key conflict of a run, in table then input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DuplicateReport {
    pub conflicts: Vec<KeyConflict>,
}

impl DuplicateReport {
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn first(&self) -> Option<&KeyConflict> {
        self.conflicts.first()
    }

    /// Conflict counts per table, only for tables that had any
    pub fn per_table(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for conflict in &self.conflicts {
            *counts.entry(conflict.table).or_insert(0) += 1;
        }
        counts
    }
}

/// What to do when a natural key shows up with conflicting attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep the first occurrence, log and count the conflict
    #[default]
    Warn,
    /// Abort the run before anything is written
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(DuplicatePolicy::Warn),
            "reject" => Ok(DuplicatePolicy::Reject),
            other => Err(NormalizeError::Config(format!(
                "unknown duplicate policy '{other}' (expected 'warn' or 'reject')"
            ))),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicatePolicy::Warn => write!(f, "warn"),
            DuplicatePolicy::Reject => write!(f, "reject"),
        }
    }
}

/// The full output of one normalization run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTables {
    pub customers: Vec<Customer>,
    pub locations: Vec<Location>,
    pub categories: Vec<Category>,
    pub sub_categories: Vec<SubCategory>,
    pub products: Vec<Product>,
    pub orders: Vec<Order>,
    pub order_details: Vec<OrderDetail>,
    /// Natural-key conflicts absorbed by first-wins deduplication
    pub duplicates: DuplicateReport,
}

impl NormalizedTables {
    /// Row counts per table, in dependency order
    pub fn row_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            (constants::CUSTOMERS, self.customers.len()),
            (constants::LOCATIONS, self.locations.len()),
            (constants::CATEGORIES, self.categories.len()),
            (constants::SUB_CATEGORIES, self.sub_categories.len()),
            (constants::PRODUCTS, self.products.len()),
            (constants::ORDERS, self.orders.len()),
            (constants::ORDER_DETAILS, self.order_details.len()),
        ]
    }

    pub fn verify_integrity(&self) -> Result<()> {
        integrity::verify(self)
    }
}

/// Run every extraction step in dependency order and apply the duplicate policy.
#[instrument(skip(records), fields(rows = records.len()))]
pub fn normalize(records: &[RawRecord], policy: DuplicatePolicy) -> Result<NormalizedTables> {
    let customers = extract_customers(records);
    let locations = extract_locations(records);
    let categories = extract_categories(records);
    let sub_categories = extract_subcategories(records, &categories)?;
    let products = extract_products(records, &sub_categories)?;
    let orders = extract_orders(records);
    let order_details = extract_order_details(records);

    let mut duplicates = DuplicateReport::default();
    duplicates.conflicts.extend(customers.conflicts);
    duplicates.conflicts.extend(locations.conflicts);
    duplicates.conflicts.extend(products.conflicts);
    duplicates.conflicts.extend(orders.conflicts);

    if let Some(first) = duplicates.first() {
        match policy {
            DuplicatePolicy::Reject => {
                return Err(NormalizeError::PartialDuplicate {
                    table: first.table,
                    key: first.key.clone(),
                });
            }
            DuplicatePolicy::Warn => {
                for conflict in &duplicates.conflicts {
                    warn!(
                        table = conflict.table,
                        key = %conflict.key,
                        row = conflict.row,
                        first = ?conflict.first,
                        later = ?conflict.later,
                        "Conflicting duplicate key, keeping first occurrence"
                    );
                    crate::observability::metrics::normalize::key_conflict(conflict.table);
                }
            }
        }
    }

    let tables = NormalizedTables {
        customers: customers.rows,
        locations: locations.rows,
        categories,
        sub_categories,
        products: products.rows,
        orders: orders.rows,
        order_details,
        duplicates,
    };

    for (table, count) in tables.row_counts() {
        info!(table, rows = count, "Extracted table");
    }

    Ok(tables)
}


#[cfg(test)]
mod tests {
    use super::test_support::{categorized, record};
    use super::*;

    #[test]
    fn test_empty_input_yields_empty_tables() {
        let tables = normalize(&[], DuplicatePolicy::Warn).unwrap();
        assert_eq!(tables, NormalizedTables::default());
        assert!(tables.row_counts().iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_warn_policy_keeps_first_and_reports_conflict() {
        let first = record("CA-1", "P-1");
        let later = RawRecord {
            customer_name: "Someone Else".to_string(),
            ..record("CA-2", "P-2")
        };

        let tables = normalize(&[first, later], DuplicatePolicy::Warn).unwrap();

        assert_eq!(tables.customers.len(), 1);
        assert_eq!(tables.customers[0].customer_name, "Claire Gute");
        assert_eq!(
            tables.duplicates.conflicts,
            vec![KeyConflict {
                table: constants::CUSTOMERS,
                key: "CG-12520".to_string(),
                row: 2,
                first: BTreeMap::from([("CustomerName".to_string(), "Claire Gute".to_string())]),
                later: BTreeMap::from([("CustomerName".to_string(), "Someone Else".to_string())]),
            }]
        );
        assert_eq!(tables.duplicates.per_table(), BTreeMap::from([(constants::CUSTOMERS, 1)]));
    }

    #[test]
    fn test_reject_policy_aborts_on_conflict() {
        let first = record("CA-1", "P-1");
        let later = RawRecord {
            city: "Louisville".to_string(),
            ..record("CA-2", "P-2")
        };

        let err = normalize(&[first, later], DuplicatePolicy::Reject).unwrap_err();
        match err {
            NormalizeError::PartialDuplicate { table, key } => {
                assert_eq!(table, constants::LOCATIONS);
                assert_eq!(key, "42420");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reject_policy_accepts_identical_duplicates() {
        let records = vec![record("CA-1", "P-1"), record("CA-1", "P-1")];
        let tables = normalize(&records, DuplicatePolicy::Reject).unwrap();
        assert!(tables.duplicates.is_empty());
        assert_eq!(tables.order_details.len(), 1);
    }

    #[test]
    fn test_normalized_tables_pass_integrity_check() {
        let records = vec![
            categorized("CA-1", "FUR-1", "Furniture", "Chairs"),
            categorized("CA-1", "OFF-1", "Office Supplies", "Paper"),
            categorized("CA-2", "FUR-2", "Furniture", "Tables"),
        ];
        let tables = normalize(&records, DuplicatePolicy::Warn).unwrap();
        tables.verify_integrity().unwrap();
        assert_eq!(tables.products.len(), 3);
        assert_eq!(tables.orders.len(), 2);
    }

    #[test]
    fn test_duplicate_policy_parsing() {
        assert_eq!("warn".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Warn);
        assert_eq!(" Reject ".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Reject);
        assert!("merge".parse::<DuplicatePolicy>().is_err());
    }
}
