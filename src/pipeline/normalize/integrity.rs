use std::collections::HashSet;

use super::NormalizedTables;
use crate::constants;
use crate::error::{NormalizeError, Result};

/// Check every foreign key in the produced tables against its referenced table.
pub fn verify(tables: &NormalizedTables) -> Result<()> {
    let category_ids: HashSet<u32> = tables.categories.iter().map(|c| c.category_id).collect();
    let sub_category_ids: HashSet<u32> =
        tables.sub_categories.iter().map(|s| s.sub_category_id).collect();
    let customer_ids: HashSet<&str> =
        tables.customers.iter().map(|c| c.customer_id.as_str()).collect();
    let postal_codes: HashSet<&str> =
        tables.locations.iter().map(|l| l.postal_code.as_str()).collect();
    let product_ids: HashSet<&str> =
        tables.products.iter().map(|p| p.product_id.as_str()).collect();
    let order_ids: HashSet<&str> = tables.orders.iter().map(|o| o.order_id.as_str()).collect();

    for sub_category in &tables.sub_categories {
        require(
            category_ids.contains(&sub_category.category_id),
            constants::SUB_CATEGORIES,
            "CategoryID",
            || sub_category.category_id.to_string(),
        )?;
    }
    for product in &tables.products {
        require(
            sub_category_ids.contains(&product.sub_category_id),
            constants::PRODUCTS,
            "SubCategoryID",
            || product.sub_category_id.to_string(),
        )?;
    }
    for order in &tables.orders {
        require(
            customer_ids.contains(order.customer_id.as_str()),
            constants::ORDERS,
            "CustomerID",
            || order.customer_id.clone(),
        )?;
        require(
            postal_codes.contains(order.postal_code.as_str()),
            constants::ORDERS,
            "PostalCode",
            || order.postal_code.clone(),
        )?;
    }
    for detail in &tables.order_details {
        require(
            order_ids.contains(detail.order_id.as_str()),
            constants::ORDER_DETAILS,
            "OrderID",
            || detail.order_id.clone(),
        )?;
        require(
            product_ids.contains(detail.product_id.as_str()),
            constants::ORDER_DETAILS,
            "ProductID",
            || detail.product_id.clone(),
        )?;
    }

    Ok(())
}

fn require(
    holds: bool,
    table: &'static str,
    column: &'static str,
    key: impl FnOnce() -> String,
) -> Result<()> {
    if holds {
        Ok(())
    } else {
        Err(NormalizeError::UnresolvedReference {
            table,
            column,
            key: key(),
        })
    }
}
