use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopdex_core::filters::{
    normalize_labels, parse_shop_ids, FilterCriteria, SortOrder, PRICE_DOMAIN_MAX,
    PRICE_DOMAIN_MIN,
};
use shopdex_db::ListingRow;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    id: i64,
    title: String,
    shop_id: i64,
    shop_name: String,
    min_price: Option<Decimal>,
    max_discount_pct: Option<Decimal>,
    on_sale: bool,
    product_type: String,
    category: String,
    gender: String,
    size_groups: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ListingRow> for ProductItem {
    fn from(row: ListingRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            shop_id: row.shop_id,
            shop_name: row.shop_name,
            min_price: row.min_price,
            max_discount_pct: row.max_discount_pct,
            on_sale: row.on_sale,
            product_type: row.product_type,
            category: row.category,
            gender: row.gender,
            size_groups: row.size_groups,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ProductListData {
    items: Vec<ProductItem>,
    page: i64,
    has_more: bool,
}

/// Listing query parameters. Collection filters arrive as comma-separated
/// values; anything that fails per-field normalization is dropped rather
/// than failing the request.
#[derive(Debug, Deserialize)]
pub(super) struct ProductListParams {
    pub shops: Option<String>,
    pub sizes: Option<String>,
    pub types: Option<String>,
    pub categories: Option<String>,
    pub genders: Option<String>,
    pub on_sale: Option<bool>,
    pub q: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| s.split(',').map(str::to_owned).collect())
        .unwrap_or_default()
}

impl ProductListParams {
    /// Translate the raw query string into normalized filter criteria.
    ///
    /// The composer is asked for one row more than the page size so the
    /// response can report whether another page exists.
    fn into_criteria(self) -> (FilterCriteria, i64, i64) {
        let limit = normalize_limit(self.limit);
        let page = self.page.unwrap_or(1).max(1);
        let offset = (page - 1) * limit;

        let criteria = FilterCriteria {
            shop_ids: parse_shop_ids(&split_csv(self.shops.as_deref())),
            size_groups: normalize_labels(&split_csv(self.sizes.as_deref())),
            product_types: normalize_labels(&split_csv(self.types.as_deref())),
            categories: normalize_labels(&split_csv(self.categories.as_deref())),
            genders: normalize_labels(&split_csv(self.genders.as_deref())),
            on_sale_only: self.on_sale.unwrap_or(false),
            query: self.q,
            min_price: self.min_price.unwrap_or(PRICE_DOMAIN_MIN),
            max_price: self.max_price.unwrap_or(PRICE_DOMAIN_MAX),
            sort: SortOrder::parse(self.sort.as_deref()),
            offset,
            // One extra row to detect a following page.
            limit: limit + 1,
        };

        (criteria, page, limit)
    }
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<ProductListParams>,
) -> Result<Json<ApiResponse<ProductListData>>, ApiError> {
    let (criteria, page, limit) = params.into_criteria();

    let mut rows = shopdex_db::list_listings(&state.pool, &criteria)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let limit_usize = usize::try_from(limit).unwrap_or(usize::MAX);
    let has_more = rows.len() > limit_usize;
    rows.truncate(limit_usize);

    Ok(Json(ApiResponse {
        data: ProductListData {
            items: rows.into_iter().map(ProductItem::from).collect(),
            page,
            has_more,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<i64>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let row = shopdex_db::get_listing_by_id(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    match row {
        Some(row) => Ok(Json(ApiResponse {
            data: ProductItem::from(row),
            meta: ResponseMeta::new(req_id.0),
        })),
        None => Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("no product with id {product_id}"),
        )),
    }
}
