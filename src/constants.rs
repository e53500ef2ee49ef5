/// Table and file name constants shared by the sinks and the CLI.
/// Table names double as SQLite table names and CSV file stems.

pub const CUSTOMERS: &str = "customers";
pub const LOCATIONS: &str = "locations";
pub const CATEGORIES: &str = "categories";
pub const SUB_CATEGORIES: &str = "sub_categories";
pub const PRODUCTS: &str = "products";
pub const ORDERS: &str = "orders";
pub const ORDER_DETAILS: &str = "order_details";

/// All output tables in dependency order (referenced tables first)
pub const TABLES: [&str; 7] = [
    CUSTOMERS,
    LOCATIONS,
    CATEGORIES,
    SUB_CATEGORIES,
    PRODUCTS,
    ORDERS,
    ORDER_DETAILS,
];

// Output column headers, in CSV column order
pub const CUSTOMER_HEADERS: [&str; 3] = ["CustomerID", "CustomerName", "Segment"];
pub const LOCATION_HEADERS: [&str; 4] = ["PostalCode", "City", "State", "Region"];
pub const CATEGORY_HEADERS: [&str; 2] = ["CategoryID", "CategoryName"];
pub const SUB_CATEGORY_HEADERS: [&str; 3] = ["SubCategoryID", "SubCategoryName", "CategoryID"];
pub const PRODUCT_HEADERS: [&str; 3] = ["ProductID", "ProductName", "SubCategoryID"];
pub const ORDER_HEADERS: [&str; 6] = [
    "OrderID",
    "OrderDate",
    "ShipDate",
    "ShipMode",
    "CustomerID",
    "PostalCode",
];
pub const ORDER_DETAIL_HEADERS: [&str; 6] = [
    "OrderID",
    "ProductID",
    "Sales",
    "Quantity",
    "Discount",
    "Profit",
];

pub const MANIFEST_FILE: &str = "manifest.json";

// Defaults used when neither config file, environment nor CLI say otherwise
pub const DEFAULT_INPUT: &str = "Sample - Superstore.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "normalized_superstore_data";
pub const DEFAULT_ENCODING: &str = "windows-1252";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CONFIG_FILE: &str = "superstore.toml";

/// CSV file name for a table
pub fn table_file_name(table: &str) -> String {
    format!("{table}.csv")
}
