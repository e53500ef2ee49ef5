use std::collections::BTreeMap;
use tracing::instrument;

use crate::domain::{OrderDetail, RawRecord};

#[derive(Default)]
struct LineTotals {
    sales: f64,
    quantity: i64,
    discount_sum: f64,
    profit: f64,
    lines: u32,
}

/// One fact row per (OrderID, ProductID).
///
/// Repeated line items for the same pair are merged: sales, quantity and
/// profit are summed, discount is averaged. Output is ordered by the
/// composite key.
#[instrument(skip_all)]
pub fn extract_order_details(records: &[RawRecord]) -> Vec<OrderDetail> {
    let mut groups: BTreeMap<(&str, &str), LineTotals> = BTreeMap::new();

    for record in records {
        let totals = groups
            .entry((record.order_id.as_str(), record.product_id.as_str()))
            .or_default();
        totals.sales += record.sales;
        totals.quantity += record.quantity;
        totals.discount_sum += record.discount;
        totals.profit += record.profit;
        totals.lines += 1;
    }

    groups
        .into_iter()
        .map(|((order_id, product_id), totals)| OrderDetail {
            order_id: order_id.to_string(),
            product_id: product_id.to_string(),
            sales: totals.sales,
            quantity: totals.quantity,
            discount: totals.discount_sum / f64::from(totals.lines),
            profit: totals.profit,
        })
        .collect()
}
