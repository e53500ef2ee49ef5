use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::app::ports::{RunContext, TableSink};
use crate::constants;
use crate::error::{NormalizeError, Result};
use crate::pipeline::normalize::NormalizedTables;

const DROP_TABLES: &str = r#"
DROP TABLE IF EXISTS order_details;
DROP TABLE IF EXISTS orders;
DROP TABLE IF EXISTS products;
DROP TABLE IF EXISTS sub_categories;
DROP TABLE IF EXISTS categories;
DROP TABLE IF EXISTS locations;
DROP TABLE IF EXISTS customers;
"#;

const CREATE_TABLES: &str = r#"
CREATE TABLE customers (
    CustomerID   TEXT PRIMARY KEY,
    CustomerName TEXT NOT NULL,
    Segment      TEXT NOT NULL
);
CREATE TABLE locations (
    PostalCode TEXT PRIMARY KEY,
    City       TEXT NOT NULL,
    State      TEXT NOT NULL,
    Region     TEXT NOT NULL
);
CREATE TABLE categories (
    CategoryID   INTEGER PRIMARY KEY,
    CategoryName TEXT NOT NULL UNIQUE
);
CREATE TABLE sub_categories (
    SubCategoryID   INTEGER PRIMARY KEY,
    SubCategoryName TEXT NOT NULL,
    CategoryID      INTEGER NOT NULL REFERENCES categories (CategoryID)
);
CREATE TABLE products (
    ProductID     TEXT PRIMARY KEY,
    ProductName   TEXT NOT NULL,
    SubCategoryID INTEGER NOT NULL REFERENCES sub_categories (SubCategoryID)
);
CREATE TABLE orders (
    OrderID    TEXT PRIMARY KEY,
    OrderDate  TEXT NOT NULL,
    ShipDate   TEXT NOT NULL,
    ShipMode   TEXT NOT NULL,
    CustomerID TEXT NOT NULL REFERENCES customers (CustomerID),
    PostalCode TEXT NOT NULL REFERENCES locations (PostalCode)
);
CREATE TABLE order_details (
    OrderID   TEXT NOT NULL REFERENCES orders (OrderID),
    ProductID TEXT NOT NULL REFERENCES products (ProductID),
    Sales     REAL NOT NULL,
    Quantity  INTEGER NOT NULL,
    Discount  REAL NOT NULL,
    Profit    REAL NOT NULL,
    PRIMARY KEY (OrderID, ProductID)
);
"#;

/// Headline figures of the sales overview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesOverview {
    pub total_sales: f64,
    pub total_profit: f64,
    pub total_orders: i64,
    /// Mean sales per order line; `None` when there are no lines
    pub average_sale: Option<f64>,
}

/// SQLite database holding the normalized tables with their keys enforced
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open a connection with foreign-key enforcement switched on
    pub fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Replace the seven tables in a single transaction
    pub fn replace_all(&self, tables: &NormalizedTables) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute_batch(DROP_TABLES)?;
        tx.execute_batch(CREATE_TABLES)?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO customers (CustomerID, CustomerName, Segment) VALUES (?1, ?2, ?3)",
            )?;
            for c in &tables.customers {
                stmt.execute(params![c.customer_id, c.customer_name, c.segment])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO locations (PostalCode, City, State, Region) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for l in &tables.locations {
                stmt.execute(params![l.postal_code, l.city, l.state, l.region])?;
            }
        }
        {
            let mut stmt =
                tx.prepare("INSERT INTO categories (CategoryID, CategoryName) VALUES (?1, ?2)")?;
            for c in &tables.categories {
                stmt.execute(params![c.category_id, c.category_name])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sub_categories (SubCategoryID, SubCategoryName, CategoryID)
                 VALUES (?1, ?2, ?3)",
            )?;
            for s in &tables.sub_categories {
                stmt.execute(params![s.sub_category_id, s.sub_category_name, s.category_id])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO products (ProductID, ProductName, SubCategoryID) VALUES (?1, ?2, ?3)",
            )?;
            for p in &tables.products {
                stmt.execute(params![p.product_id, p.product_name, p.sub_category_id])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO orders (OrderID, OrderDate, ShipDate, ShipMode, CustomerID, PostalCode)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for o in &tables.orders {
                stmt.execute(params![
                    o.order_id,
                    o.order_date,
                    o.ship_date,
                    o.ship_mode,
                    o.customer_id,
                    o.postal_code
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO order_details (OrderID, ProductID, Sales, Quantity, Discount, Profit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for d in &tables.order_details {
                stmt.execute(params![
                    d.order_id,
                    d.product_id,
                    d.sales,
                    d.quantity,
                    d.discount,
                    d.profit
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Total sales and profit, distinct orders, and mean line-item sale
    pub fn sales_overview(&self) -> Result<SalesOverview> {
        let conn = self.connect()?;
        let overview = conn.query_row(
            "SELECT
                COALESCE(SUM(od.Sales), 0.0),
                COALESCE(SUM(od.Profit), 0.0),
                COUNT(DISTINCT o.OrderID),
                AVG(od.Sales)
             FROM orders o
             JOIN order_details od ON o.OrderID = od.OrderID",
            [],
            |row| {
                Ok(SalesOverview {
                    total_sales: row.get(0)?,
                    total_profit: row.get(1)?,
                    total_orders: row.get(2)?,
                    average_sale: row.get(3)?,
                })
            },
        )?;
        Ok(overview)
    }

    /// Rows currently stored in one of the seven tables
    pub fn row_count(&self, table: &str) -> Result<i64> {
        if !constants::TABLES.contains(&table) {
            return Err(NormalizeError::UnknownTable(table.to_string()));
        }
        let conn = self.connect()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }
}

impl TableSink for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self, tables, run), fields(db = %self.path.display(), run_id = %run.run_id))]
    fn write_tables(&self, tables: &NormalizedTables, run: &RunContext) -> Result<()> {
        self.replace_all(tables)?;
        info!("Loaded {} tables into {}", tables.row_counts().len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawRecord;
    use crate::pipeline::normalize::test_support::record;
    use crate::pipeline::normalize::{normalize, DuplicatePolicy};
    use tempfile::tempdir;

    fn tables() -> NormalizedTables {
        let records = vec![
            RawRecord {
                sales: 100.0,
                profit: 10.0,
                ..record("CA-1", "P-1")
            },
            RawRecord {
                sales: 50.0,
                profit: -5.0,
                ..record("CA-1", "P-2")
            },
            RawRecord {
                sales: 30.0,
                profit: 3.0,
                ..record("CA-2", "P-1")
            },
        ];
        normalize(&records, DuplicatePolicy::Warn).unwrap()
    }

    #[test]
    fn test_load_and_overview() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("superstore.db"));

        store.replace_all(&tables()).unwrap();

        assert_eq!(store.row_count("order_details").unwrap(), 3);
        let overview = store.sales_overview().unwrap();
        assert_eq!(overview.total_orders, 2);
        assert!((overview.total_sales - 180.0).abs() < 1e-9);
        assert!((overview.total_profit - 8.0).abs() < 1e-9);
        assert!((overview.average_sale.unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_reload_replaces_previous_contents() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("superstore.db"));

        store.replace_all(&tables()).unwrap();
        store.replace_all(&tables()).unwrap();

        assert_eq!(store.row_count("products").unwrap(), 2);
        assert_eq!(store.row_count("customers").unwrap(), 1);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("superstore.db"));
        store.replace_all(&tables()).unwrap();

        let conn = store.connect().unwrap();
        let result = conn.execute(
            "INSERT INTO products (ProductID, ProductName, SubCategoryID)
             VALUES ('X-1', 'Orphan', 999)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_failed_load_rolls_back() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("superstore.db"));
        store.replace_all(&tables()).unwrap();

        let mut broken = tables();
        broken.products[0].sub_category_id = 999;
        let err = store.replace_all(&broken).unwrap_err();

        assert!(matches!(err, NormalizeError::Sqlite(_)));
        assert_eq!(store.row_count("products").unwrap(), 2);
        assert_eq!(store.row_count("order_details").unwrap(), 3);
    }

    #[test]
    fn test_row_count_rejects_unknown_table() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("superstore.db"));
        store.replace_all(&tables()).unwrap();

        let err = store.row_count("products; DROP TABLE orders").unwrap_err();

        assert!(matches!(err, NormalizeError::UnknownTable(_)));
        assert_eq!(store.row_count("orders").unwrap(), 2);
    }

    #[test]
    fn test_overview_of_empty_store() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("superstore.db"));
        store.replace_all(&NormalizedTables::default()).unwrap();

        let overview = store.sales_overview().unwrap();
        assert_eq!(overview.total_orders, 0);
        assert_eq!(overview.total_sales, 0.0);
        assert_eq!(overview.average_sale, None);
    }
}
