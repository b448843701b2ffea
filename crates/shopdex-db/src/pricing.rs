//! Bulk price lookups backing the pricing batch aggregator.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// One variant price row for a product in a bulk lookup.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantPriceRow {
    pub product_id: i64,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
}

/// One promotional offer price row valid on the queried date.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfferPriceRow {
    pub product_id: i64,
    pub price: Decimal,
}

/// Fetch all variant price/compare-at pairs for the given products in one
/// round trip.
///
/// # Errors
///
/// Returns [`DbError::QueryFailed`] if the query cannot be executed.
pub async fn variant_prices_for_products(
    pool: &PgPool,
    product_ids: &[i64],
) -> Result<Vec<VariantPriceRow>, DbError> {
    let rows = sqlx::query_as::<_, VariantPriceRow>(
        "SELECT product_id, price, compare_at_price \
         FROM product_variants \
         WHERE product_id = ANY($1)",
    )
    .bind(product_ids.to_vec())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetch all promotional offer prices valid on `as_of` for the given products
/// in one round trip.
///
/// # Errors
///
/// Returns [`DbError::QueryFailed`] if the query cannot be executed.
pub async fn active_offers_for_products(
    pool: &PgPool,
    product_ids: &[i64],
    as_of: NaiveDate,
) -> Result<Vec<OfferPriceRow>, DbError> {
    let rows = sqlx::query_as::<_, OfferPriceRow>(
        "SELECT product_id, price \
         FROM product_offers \
         WHERE product_id = ANY($1) \
           AND starts_at <= $2 \
           AND ends_at >= $2",
    )
    .bind(product_ids.to_vec())
    .bind(as_of)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
