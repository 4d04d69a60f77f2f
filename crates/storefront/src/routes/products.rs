//! Catalog route handlers.

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use threadline_core::ProductId;

use crate::error::Result;
use crate::extract::{JsonBody, PathParams, QueryParams};
use crate::middleware::RequireAdmin;
use crate::models::{NewProduct, ProductPatch, ProductQuery, SortKey, SortOrder};
use crate::response::Envelope;
use crate::state::AppState;

/// Raw listing query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub search: Option<String>,
    /// Comma-separated categories.
    pub category: Option<String>,
    /// Comma-separated sub-categories.
    pub sub_category: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<ListParams> for ProductQuery {
    fn from(params: ListParams) -> Self {
        Self {
            search: params
                .search
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
            categories: split_list(params.category.as_deref()),
            sub_categories: split_list(params.sub_category.as_deref()),
            sort_by: params
                .sort_by
                .as_deref()
                .map_or_else(SortKey::default, SortKey::parse_lenient),
            sort_order: params
                .sort_order
                .as_deref()
                .map_or_else(SortOrder::default, SortOrder::parse_lenient),
            page: params.page.unwrap_or(1).max(1),
            limit: params
                .limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Envelope> {
    let page = state.catalog().list(&params.into()).await?;
    Ok(Envelope::ok(
        "Products fetched successfully",
        json!({ "products": page.products, "pagination": page.pagination }),
    ))
}

#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    PathParams(id): PathParams<ProductId>,
) -> Result<Envelope> {
    let product = state.catalog().get(id).await?;
    Ok(Envelope::ok(
        "Product fetched successfully",
        json!({ "product": product }),
    ))
}

#[instrument(skip(state, admin, input), fields(admin_id = %admin.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    JsonBody(input): JsonBody<NewProduct>,
) -> Result<Envelope> {
    let product = state.catalog().create(input).await?;
    Ok(Envelope::created(
        "Product created successfully",
        json!({ "product": product }),
    ))
}

#[instrument(skip(state, admin, patch), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParams(id): PathParams<ProductId>,
    JsonBody(patch): JsonBody<ProductPatch>,
) -> Result<Envelope> {
    let product = state.catalog().update(id, patch).await?;
    Ok(Envelope::ok(
        "Product updated successfully",
        json!({ "product": product }),
    ))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn destroy(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParams(id): PathParams<ProductId>,
) -> Result<Envelope> {
    let product = state.catalog().delete(id).await?;
    Ok(Envelope::ok(
        "Product deleted successfully",
        json!({ "product": product }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_defaults_and_bounds() {
        let query = ProductQuery::from(ListParams {
            category: Some("Men, Women,,".to_owned()),
            search: Some("   ".to_owned()),
            sort_by: Some("price".to_owned()),
            sort_order: Some("asc".to_owned()),
            page: Some(0),
            limit: Some(1000),
            ..ListParams::default()
        });

        assert_eq!(query.categories, vec!["Men", "Women"]);
        assert!(query.sub_categories.is_empty());
        assert_eq!(query.search, None);
        assert_eq!(query.sort_by, SortKey::Price);
        assert_eq!(query.sort_order, SortOrder::Asc);
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, ProductQuery::MAX_LIMIT);

        let defaults = ProductQuery::from(ListParams::default());
        assert_eq!(defaults, ProductQuery::default());
    }
}
