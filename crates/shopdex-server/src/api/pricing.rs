use axum::{
    extract::{Path, State},
    Extension, Json,
};

use shopdex_core::pricing::ProductPricing;

use crate::middleware::RequestId;

use super::{ApiResponse, AppState, ResponseMeta};

/// Resolve current pricing for one product through the shared aggregator.
///
/// Requests landing within the same coalescing window share one bulk store
/// lookup. This endpoint never fails on store errors: callers get the
/// all-null degraded pricing instead, so product rendering is never blocked
/// on price display.
pub(super) async fn get_product_pricing(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(product_id): Path<String>,
) -> Json<ApiResponse<ProductPricing>> {
    let pricing = state.pricing.pricing_for(&product_id).await;

    Json(ApiResponse {
        data: pricing,
        meta: ResponseMeta::new(req_id.0),
    })
}
