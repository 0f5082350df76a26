//! Storefront browsing, product detail, search and review submission.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use greatkart_core::catalog::{price_buckets, price_ceiling};
use greatkart_core::{PageWindow, ReviewInput, SearchFilter, ValidationErrors, PRODUCTS_PER_PAGE};
use greatkart_db::{CategoryRow, ProductRow, ReviewRow, VariationRow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResponse, AppState, RequestContext};

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct CategoryItem {
    id: i64,
    title: String,
    slug: String,
    description: String,
    image: Option<String>,
}

impl From<CategoryRow> for CategoryItem {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
            image: row.image,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    id: i64,
    title: String,
    slug: String,
    category_slug: String,
    category_title: String,
    description: String,
    price: Decimal,
    image: Option<String>,
    stock: i32,
    is_available: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for ProductItem {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            category_slug: row.category_slug,
            category_title: row.category_title,
            description: row.description,
            price: row.price,
            image: row.image,
            stock: row.stock,
            is_available: row.is_available,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct StorePage {
    category: Option<CategoryItem>,
    products: Vec<ProductItem>,
    product_count: i64,
    page: PageWindow,
    price_buckets: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct VariationItem {
    id: i64,
    value: String,
}

impl From<VariationRow> for VariationItem {
    fn from(row: VariationRow) -> Self {
        Self {
            id: row.id,
            value: row.value,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ReviewItem {
    id: i64,
    username: String,
    subject: String,
    review: String,
    rating: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<ReviewRow> for ReviewItem {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            subject: row.subject,
            review: row.review,
            rating: row.rating,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ProductDetail {
    product: ProductItem,
    colors: Vec<VariationItem>,
    sizes: Vec<VariationItem>,
    in_cart: bool,
    reviews: Vec<ReviewItem>,
    average_rating: Option<Decimal>,
    review_count: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct SearchPage {
    keyword: String,
    min_price: Decimal,
    max_price: Decimal,
    products: Vec<ProductItem>,
    product_count: i64,
    page: PageWindow,
}

#[derive(Debug, Serialize)]
pub(super) struct ReviewSaved {
    id: i64,
    created: bool,
}

// ---------------------------------------------------------------------------
// Query strings
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchQuery {
    pub keyword: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub page: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/home: every available product.
pub(super) async fn home(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rows = greatkart_db::list_available_products(&state.pool)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(rows.into_iter().map(ProductItem::from).collect()))
}

/// GET /api/v1/categories
pub(super) async fn list_categories(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<CategoryItem>>>, ApiError> {
    let rows = greatkart_db::list_categories(&state.pool)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(rows.into_iter().map(CategoryItem::from).collect()))
}

/// GET /api/v1/store
pub(super) async fn store(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<StorePage>>, ApiError> {
    let page = store_page(&state, &ctx, None, query.page.as_deref()).await?;
    Ok(ctx.respond(page))
}

/// GET /api/v1/store/category/{category_slug}
pub(super) async fn store_by_category(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(category_slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<StorePage>>, ApiError> {
    let category = greatkart_db::get_category_by_slug(&state.pool, &category_slug)
        .await
        .map_err(|e| ctx.db_error(&e))?
        .ok_or_else(|| ctx.error("not_found", format!("category '{category_slug}' not found")))?;

    let page = store_page(&state, &ctx, Some(category), query.page.as_deref()).await?;
    Ok(ctx.respond(page))
}

async fn store_page(
    state: &AppState,
    ctx: &RequestContext,
    category: Option<CategoryRow>,
    requested_page: Option<&str>,
) -> Result<StorePage, ApiError> {
    let category_id = category.as_ref().map(|c| c.id);

    let total = greatkart_db::count_store_products(&state.pool, category_id)
        .await
        .map_err(|e| ctx.db_error(&e))?;
    let window = PageWindow::resolve(requested_page, total, PRODUCTS_PER_PAGE);
    let rows =
        greatkart_db::list_store_products(&state.pool, category_id, window.limit, window.offset)
            .await
            .map_err(|e| ctx.db_error(&e))?;
    let max_price = greatkart_db::max_product_price(&state.pool)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(StorePage {
        category: category.map(CategoryItem::from),
        products: rows.into_iter().map(ProductItem::from).collect(),
        product_count: total,
        page: window,
        price_buckets: price_buckets(price_ceiling(max_price)),
    })
}

/// GET /api/v1/store/category/{category_slug}/{product_slug}
pub(super) async fn product_detail(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((category_slug, product_slug)): Path<(String, String)>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let pool = &state.pool;
    let product = greatkart_db::get_product_by_slugs(pool, &category_slug, &product_slug)
        .await
        .map_err(|e| ctx.db_error(&e))?
        .ok_or_else(|| ctx.error("not_found", "product not found"))?;

    let in_cart = match ctx.cart_owner() {
        Some(owner) => greatkart_db::product_in_cart(pool, &owner, product.id)
            .await
            .map_err(|e| ctx.db_error(&e))?,
        None => false,
    };

    let (colors, sizes): (Vec<VariationRow>, Vec<VariationRow>) =
        greatkart_db::list_active_variations(pool, product.id)
            .await
            .map_err(|e| ctx.db_error(&e))?
            .into_iter()
            .partition(|v| v.category == "color");

    let reviews = greatkart_db::list_product_reviews(pool, product.id)
        .await
        .map_err(|e| ctx.db_error(&e))?;
    let summary = greatkart_db::review_summary(pool, product.id)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(ProductDetail {
        product: product.into(),
        colors: colors.into_iter().map(VariationItem::from).collect(),
        sizes: sizes.into_iter().map(VariationItem::from).collect(),
        in_cart,
        reviews: reviews.into_iter().map(ReviewItem::from).collect(),
        average_rating: summary.average,
        review_count: summary.count,
    }))
}

/// GET /api/v1/store/search
pub(super) async fn search(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<SearchPage>>, ApiError> {
    let max_price = greatkart_db::max_product_price(&state.pool)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    let filter = SearchFilter::new(
        query.keyword.as_deref(),
        query.min_price.as_deref(),
        query.max_price.as_deref(),
        price_ceiling(max_price),
    )
    .map_err(|e| ctx.invalid(ValidationErrors::single("price", e.to_string())))?;

    let total = greatkart_db::count_search_results(&state.pool, &filter)
        .await
        .map_err(|e| ctx.db_error(&e))?;
    let window = PageWindow::resolve(query.page.as_deref(), total, PRODUCTS_PER_PAGE);
    let rows = greatkart_db::search_products(&state.pool, &filter, window.limit, window.offset)
        .await
        .map_err(|e| ctx.db_error(&e))?;

    Ok(ctx.respond(SearchPage {
        keyword: filter.keyword,
        min_price: filter.min_price,
        max_price: filter.max_price,
        products: rows.into_iter().map(ProductItem::from).collect(),
        product_count: total,
        page: window,
    }))
}

/// POST /api/v1/store/products/{product_id}/reviews
///
/// A second submission by the same account replaces the first.
pub(super) async fn submit_review(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(product_id): Path<i64>,
    Json(body): Json<ReviewInput>,
) -> Result<(StatusCode, Json<ApiResponse<ReviewSaved>>), ApiError> {
    let account = ctx.require_account()?;
    let input = body.validate().map_err(|e| ctx.invalid(e))?;

    let (id, created) =
        greatkart_db::upsert_review(&state.pool, product_id, account.id, &input, &ctx.client_ip)
            .await
            .map_err(|e| ctx.db_error(&e))?;

    tracing::info!(product_id, account_id = account.id, created, "review saved");

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, ctx.respond(ReviewSaved { id, created })))
}
