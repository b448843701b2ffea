//! Listing queries over the `product_listings` read view.
//!
//! The view denormalizes product, variant, and shop data into one row per
//! product with a precomputed price summary and search vector. It is
//! provisioned outside this repository; queries here are read-only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use shopdex_core::filters::{
    normalize_labels, FilterCriteria, SortOrder, PRICE_DOMAIN_MAX, PRICE_DOMAIN_MIN,
};

use crate::DbError;

/// Product types excluded from every listing query. These are non-merchandise
/// line items some shops publish alongside real products.
pub const EXCLUDED_PRODUCT_TYPES: &[&str] =
    &["Insurance", "Shipping Protection", "Gift Card"];

const LISTING_COLUMNS: &str = "id, title, shop_id, shop_name, in_stock, archived, \
     min_price, max_discount_pct, on_sale, product_type, category, gender, \
     size_groups, created_at, updated_at";

/// A row from the `product_listings` view.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingRow {
    pub id: i64,
    pub title: String,
    pub shop_id: i64,
    pub shop_name: String,
    pub in_stock: bool,
    pub archived: bool,
    /// Lowest variant price for the product; `NULL` when it has no variants.
    pub min_price: Option<Decimal>,
    /// Highest discount percentage across variants; `NULL` when nothing is
    /// discounted.
    pub max_discount_pct: Option<Decimal>,
    pub on_sale: bool,
    pub product_type: String,
    pub category: String,
    pub gender: String,
    pub size_groups: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Build the listing query for a [`FilterCriteria`].
///
/// Pure with respect to the database: the returned builder can be inspected
/// via `sql()` in tests. Predicate rules:
///
/// - every collection filter is skipped entirely when empty after
///   normalization (never a vacuous match-nothing predicate);
/// - shop ids must be strictly positive, labels are trimmed and blanks
///   dropped;
/// - a price bound sitting on its domain edge (`0` / `500`) emits no
///   predicate, so the unrestricted range adds nothing to the plan;
/// - the baseline predicates (in stock, not archived, merchandise only)
///   apply regardless of caller input.
#[must_use]
pub fn build_listing_query(criteria: &FilterCriteria) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {LISTING_COLUMNS} FROM product_listings \
         WHERE in_stock = TRUE AND archived = FALSE AND product_type <> ALL("
    ));
    qb.push_bind(EXCLUDED_PRODUCT_TYPES.to_vec());
    qb.push(")");

    let shop_ids: Vec<i64> = criteria
        .shop_ids
        .iter()
        .copied()
        .filter(|id| *id > 0)
        .collect();
    if !shop_ids.is_empty() {
        qb.push(" AND shop_id = ANY(");
        qb.push_bind(shop_ids);
        qb.push(")");
    }

    let size_groups = normalize_labels(&criteria.size_groups);
    if !size_groups.is_empty() {
        // Array overlap: any shared size group qualifies the row.
        qb.push(" AND size_groups && ");
        qb.push_bind(size_groups);
    }

    let product_types = normalize_labels(&criteria.product_types);
    if !product_types.is_empty() {
        qb.push(" AND product_type = ANY(");
        qb.push_bind(product_types);
        qb.push(")");
    }

    let categories = normalize_labels(&criteria.categories);
    if !categories.is_empty() {
        qb.push(" AND category = ANY(");
        qb.push_bind(categories);
        qb.push(")");
    }

    let genders = normalize_labels(&criteria.genders);
    if !genders.is_empty() {
        qb.push(" AND gender = ANY(");
        qb.push_bind(genders);
        qb.push(")");
    }

    if criteria.on_sale_only {
        qb.push(" AND on_sale = TRUE");
    }

    let (min_price, max_price) = criteria.clamped_price_range();
    if min_price > PRICE_DOMAIN_MIN {
        qb.push(" AND min_price >= ");
        qb.push_bind(min_price);
    }
    if max_price < PRICE_DOMAIN_MAX {
        qb.push(" AND min_price <= ");
        qb.push_bind(max_price);
    }

    if let Some(query) = criteria.query.as_deref() {
        let trimmed = query.trim();
        if !trimmed.is_empty() {
            qb.push(" AND search_vec @@ websearch_to_tsquery('english', ");
            qb.push_bind(trimmed.to_owned());
            qb.push(")");
        }
    }

    qb.push(order_by_clause(criteria.sort));

    qb.push(" LIMIT ");
    qb.push_bind(criteria.limit);
    qb.push(" OFFSET ");
    qb.push_bind(criteria.offset);

    qb
}

fn order_by_clause(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::PriceAsc => " ORDER BY min_price ASC, id DESC",
        SortOrder::PriceDesc => " ORDER BY min_price DESC NULLS LAST, id DESC",
        SortOrder::DiscountDesc => {
            " ORDER BY max_discount_pct DESC NULLS LAST, created_at DESC, id DESC"
        }
    }
}

/// Execute the composed listing query and return rows in store order.
///
/// All-or-nothing: no retries, no partial results.
///
/// # Errors
///
/// Returns [`DbError::QueryFailed`] if the query cannot be executed.
pub async fn list_listings(
    pool: &PgPool,
    criteria: &FilterCriteria,
) -> Result<Vec<ListingRow>, DbError> {
    let mut qb = build_listing_query(criteria);
    let rows = qb.build_query_as::<ListingRow>().fetch_all(pool).await?;
    Ok(rows)
}

/// Fetch one listing row by id. `Ok(None)` means no such row — a normal
/// outcome, distinct from the error path.
///
/// # Errors
///
/// Returns [`DbError::QueryFailed`] if the query cannot be executed.
pub async fn get_listing_by_id(pool: &PgPool, id: i64) -> Result<Option<ListingRow>, DbError> {
    let row = sqlx::query_as::<_, ListingRow>(&format!(
        "SELECT {LISTING_COLUMNS} FROM product_listings WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
