//! Row shapes for the flat input export and the seven normalized tables.
//!
//! Column names are mapped to fields once, here, through serde renames. The
//! rest of the crate only ever sees typed fields.

use serde::{Deserialize, Serialize};

/// One line item of the flat sales export: a single product within a single order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Order ID")]
    pub order_id: String,
    #[serde(rename = "Order Date")]
    pub order_date: String,
    #[serde(rename = "Ship Date")]
    pub ship_date: String,
    #[serde(rename = "Ship Mode")]
    pub ship_mode: String,
    #[serde(rename = "Customer ID")]
    pub customer_id: String,
    #[serde(rename = "Customer Name")]
    pub customer_name: String,
    #[serde(rename = "Segment")]
    pub segment: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Postal Code")]
    pub postal_code: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Product ID")]
    pub product_id: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Sub-Category")]
    pub sub_category: String,
    #[serde(rename = "Product Name")]
    pub product_name: String,
    #[serde(rename = "Sales")]
    pub sales: f64,
    #[serde(rename = "Quantity")]
    pub quantity: i64,
    #[serde(rename = "Discount")]
    pub discount: f64,
    #[serde(rename = "Profit")]
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    #[serde(rename = "CustomerName")]
    pub customer_name: String,
    #[serde(rename = "Segment")]
    pub segment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "PostalCode")]
    pub postal_code: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Region")]
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "CategoryID")]
    pub category_id: u32,
    #[serde(rename = "CategoryName")]
    pub category_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategory {
    #[serde(rename = "SubCategoryID")]
    pub sub_category_id: u32,
    #[serde(rename = "SubCategoryName")]
    pub sub_category_name: String,
    #[serde(rename = "CategoryID")]
    pub category_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "ProductID")]
    pub product_id: String,
    #[serde(rename = "ProductName")]
    pub product_name: String,
    #[serde(rename = "SubCategoryID")]
    pub sub_category_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "OrderID")]
    pub order_id: String,
    #[serde(rename = "OrderDate")]
    pub order_date: String,
    #[serde(rename = "ShipDate")]
    pub ship_date: String,
    #[serde(rename = "ShipMode")]
    pub ship_mode: String,
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    #[serde(rename = "PostalCode")]
    pub postal_code: String,
}

/// Fact row for one (order, product) pair, merged across duplicate line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(rename = "OrderID")]
    pub order_id: String,
    #[serde(rename = "ProductID")]
    pub product_id: String,
    #[serde(rename = "Sales")]
    pub sales: f64,
    #[serde(rename = "Quantity")]
    pub quantity: i64,
    #[serde(rename = "Discount")]
    pub discount: f64,
    #[serde(rename = "Profit")]
    pub profit: f64,
}
