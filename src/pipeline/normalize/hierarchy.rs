//! Category → sub-category → product extraction.
//!
//! Categories and sub-categories have no identifier in the export, so they
//! receive dense surrogate keys ranked by first appearance in the input.
//! Keys therefore depend on row order, not on name sort order.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

use super::entities::{dedupe_first_wins, Extracted};
use crate::constants;
use crate::domain::{Category, Product, RawRecord, SubCategory};
use crate::error::{NormalizeError, Result};

#[instrument(skip_all)]
pub fn extract_categories(records: &[RawRecord]) -> Vec<Category> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut categories = Vec::new();

    for record in records {
        if seen.insert(record.category.as_str()) {
            categories.push(Category {
                category_id: next_id(categories.len()),
                category_name: record.category.clone(),
            });
        }
    }

    categories
}

/// Distinct (category, sub-category) pairs, each linked to its parent's surrogate key.
#[instrument(skip_all)]
pub fn extract_subcategories(
    records: &[RawRecord],
    categories: &[Category],
) -> Result<Vec<SubCategory>> {
    let category_ids: HashMap<&str, u32> = categories
        .iter()
        .map(|c| (c.category_name.as_str(), c.category_id))
        .collect();

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut sub_categories = Vec::new();

    for record in records {
        if !seen.insert((record.category.as_str(), record.sub_category.as_str())) {
            continue;
        }
        let category_id = *category_ids
            .get(record.category.as_str())
            .ok_or_else(|| NormalizeError::UnresolvedReference {
                table: constants::SUB_CATEGORIES,
                column: "CategoryID",
                key: record.category.clone(),
            })?;
        sub_categories.push(SubCategory {
            sub_category_id: next_id(sub_categories.len()),
            sub_category_name: record.sub_category.clone(),
            category_id,
        });
    }

    Ok(sub_categories)
}

#[derive(Debug, PartialEq, Serialize)]
struct ProductCandidate {
    #[serde(rename = "ProductID")]
    product_id: String,
    #[serde(rename = "ProductName")]
    product_name: String,
    #[serde(rename = "Sub-Category")]
    sub_category_name: String,
}

/// Products keyed by ProductID, with the sub-category name resolved to its surrogate key.
///
/// A sub-category name shared by two categories cannot be resolved by name
/// alone and fails the run rather than picking one.
#[instrument(skip_all)]
pub fn extract_products(
    records: &[RawRecord],
    sub_categories: &[SubCategory],
) -> Result<Extracted<Product>> {
    let mut ids_by_name: HashMap<&str, Vec<u32>> = HashMap::new();
    for sub_category in sub_categories {
        ids_by_name
            .entry(sub_category.sub_category_name.as_str())
            .or_default()
            .push(sub_category.sub_category_id);
    }

    let candidates = dedupe_first_wins(
        records,
        constants::PRODUCTS,
        |r| ProductCandidate {
            product_id: r.product_id.clone(),
            product_name: r.product_name.clone(),
            sub_category_name: r.sub_category.clone(),
        },
        |p| p.product_id.as_str(),
    );

    let mut products = Vec::with_capacity(candidates.rows.len());
    for candidate in candidates.rows {
        let resolved = ids_by_name
            .get(candidate.sub_category_name.as_str())
            .map(Vec::as_slice);
        let sub_category_id = match resolved {
            Some([id]) => *id,
            Some(ids) if ids.len() > 1 => {
                return Err(NormalizeError::AmbiguousReference {
                    table: constants::PRODUCTS,
                    column: "SubCategoryID",
                    key: candidate.sub_category_name,
                    candidates: ids.to_vec(),
                });
            }
            _ => {
                return Err(NormalizeError::UnresolvedReference {
                    table: constants::PRODUCTS,
                    column: "SubCategoryID",
                    key: candidate.sub_category_name,
                });
            }
        };
        products.push(Product {
            product_id: candidate.product_id,
            product_name: candidate.product_name,
            sub_category_id,
        });
    }

    Ok(Extracted {
        rows: products,
        conflicts: candidates.conflicts,
    })
}

fn next_id(assigned: usize) -> u32 {
    assigned as u32 + 1
}
