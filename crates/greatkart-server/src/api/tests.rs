use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use chrono::Utc;
use greatkart_core::accounts::Registration;
use greatkart_core::catalog::parse_catalog;
use greatkart_core::{AppConfig, Environment, ValidationErrors};
use greatkart_db::{AccountRole, CartOwner, DbError, SessionRow};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use super::*;
use crate::middleware::{RateLimitState, SESSION_HEADER};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CATALOG: &str = r#"
categories:
  - title: Shirts
    products:
      - title: Denim Shirt
        price: "50.00"
        stock: 10
        variations:
          - { category: color, value: Blue }
          - { category: size, value: M }
      - title: Retired Shirt
        price: "15.00"
        stock: 0
        is_available: false
"#;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        log_level: "warn".to_string(),
        catalog_path: PathBuf::from("./config/catalog.yaml"),
        db_max_connections: 5,
        db_min_connections: 1,
        db_acquire_timeout_secs: 5,
        session_ttl_hours: 1,
        rate_limit_per_minute: 1_000,
        session_sweep_cron: "0 0 * * * *".to_string(),
    }
}

fn test_app(pool: sqlx::PgPool) -> Router {
    build_app(
        AppState {
            pool,
            config: Arc::new(test_config()),
        },
        RateLimitState::per_minute(1_000),
    )
}

async fn seed(pool: &sqlx::PgPool) {
    let catalog = parse_catalog(CATALOG).expect("catalog");
    greatkart_db::seed_catalog(pool, &catalog)
        .await
        .expect("seed catalog");
}

async fn product_id(pool: &sqlx::PgPool, slug: &str) -> i64 {
    greatkart_db::get_product_by_slugs(pool, "shirts", slug)
        .await
        .expect("lookup")
        .expect("product exists")
        .id
}

async fn create_account(pool: &sqlx::PgPool, email: &str, role: AccountRole) -> i64 {
    let registration = Registration {
        username: email.split('@').next().unwrap_or("user").to_string(),
        email: email.to_string(),
        password: "secret".to_string(),
        confirm_password: "secret".to_string(),
    }
    .validate()
    .expect("valid registration");

    greatkart_db::create_account(pool, &registration, role)
        .await
        .expect("create account")
        .id
}

struct Reply {
    status: StatusCode,
    session_token: Option<String>,
    json: Value,
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(SESSION_HEADER, token);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let session_token = response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json parse")
    };

    Reply {
        status,
        session_token,
        json,
    }
}

async fn login(app: &Router, email: &str, guest_token: Option<&str>) -> String {
    let reply = call(
        app,
        "POST",
        "/api/v1/accounts/login?next=/cart/checkout",
        guest_token,
        Some(json!({ "email": email, "password": "secret" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.json);
    assert_eq!(reply.json["data"]["redirect"], "/cart/checkout");
    reply.session_token.expect("login issues a session token")
}

fn money(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("decimal string")
        .parse()
        .expect("decimal")
}

fn billing_body() -> Value {
    json!({
        "first_name": "Jane",
        "last_name": "Doe",
        "email": "jane@example.com",
        "phone": "5550102030",
        "city": "Lisbon",
        "address": "Rua Augusta 1",
        "comment": ""
    })
}

// ---------------------------------------------------------------------------
// Envelope and context
// ---------------------------------------------------------------------------

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("unauthorized", StatusCode::UNAUTHORIZED),
        ("forbidden", StatusCode::FORBIDDEN),
        ("not_found", StatusCode::NOT_FOUND),
        ("empty_cart", StatusCode::CONFLICT),
        ("conflict", StatusCode::CONFLICT),
        ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        let response = ApiError::new("req-1", code, "message").into_response();
        assert_eq!(response.status(), status, "code {code}");
    }
}

#[test]
fn validation_error_lists_fields() {
    let mut errors = ValidationErrors::new();
    errors.push("phone", "phone number must have at least 10 digits");
    errors.push("city", "city must contain only letters");

    let json = serde_json::to_value(ApiError::validation("req-1", errors)).expect("serialize");
    assert_eq!(json["error"]["code"], "validation_error");
    assert_eq!(json["error"]["fields"][0]["field"], "phone");
    assert_eq!(json["error"]["fields"][1]["field"], "city");
    assert_eq!(json["meta"]["request_id"], "req-1");
}

#[test]
fn plain_errors_omit_fields() {
    let json = serde_json::to_value(ApiError::new("req-1", "not_found", "gone")).expect("json");
    assert!(json["error"].get("fields").is_none());
}

#[test]
fn db_errors_map_to_api_codes() {
    assert_eq!(map_db_error("r", &DbError::NotFound).error.code, "not_found");
    assert_eq!(map_db_error("r", &DbError::EmptyCart).error.code, "empty_cart");

    let taken = map_db_error("r", &DbError::EmailTaken);
    assert_eq!(taken.error.code, "validation_error");
    assert_eq!(taken.error.fields[0].field, "email");

    let internal = map_db_error("r", &DbError::Sqlx(sqlx::Error::RowNotFound));
    assert_eq!(internal.error.code, "internal_error");
    assert_eq!(internal.error.message, "database query failed");
}

#[test]
fn cart_owner_falls_back_to_guest_session() {
    let session = SessionRow {
        id: 1,
        public_id: Uuid::new_v4(),
        account_id: None,
        created_at: Utc::now(),
        expires_at: Utc::now(),
    };
    let mut ctx = RequestContext {
        request_id: "req".to_string(),
        session: None,
        account: None,
        client_ip: String::new(),
    };
    assert_eq!(ctx.cart_owner(), None);

    ctx.session = Some(session.clone());
    assert_eq!(ctx.cart_owner(), Some(CartOwner::Guest(session.cart_key())));
    assert!(ctx.require_account().is_err());
}

// ---------------------------------------------------------------------------
// Routes (with DB)
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_reports_ok(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let reply = call(&app, "GET", "/api/v1/health", None, None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["data"]["status"], "ok");
}

#[sqlx::test(migrations = "../../migrations")]
async fn home_lists_available_products_only(pool: sqlx::PgPool) {
    seed(&pool).await;
    let app = test_app(pool);

    let reply = call(&app, "GET", "/api/v1/home", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let products = reply.json["data"].as_array().expect("array");
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["slug"], "denim-shirt");
}

#[sqlx::test(migrations = "../../migrations")]
async fn store_is_forgiving_about_page_numbers(pool: sqlx::PgPool) {
    seed(&pool).await;
    let app = test_app(pool);

    let reply = call(&app, "GET", "/api/v1/store/category/shirts?page=abc", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["data"]["page"]["page"], 1);
    assert_eq!(reply.json["data"]["product_count"], 1);
    assert_eq!(reply.json["data"]["price_buckets"], json!([0, 100]));

    let reply = call(&app, "GET", "/api/v1/store/category/hats", None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn search_rejects_inverted_price_range(pool: sqlx::PgPool) {
    seed(&pool).await;
    let app = test_app(pool);

    let reply = call(
        &app,
        "GET",
        "/api/v1/store/search?keyword=shirt&min_price=90&max_price=10",
        None,
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json["error"]["code"], "validation_error");

    let reply = call(&app, "GET", "/api/v1/store/search?keyword=DENIM", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["data"]["product_count"], 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn guest_add_opens_session_and_cart_shows_totals(pool: sqlx::PgPool) {
    seed(&pool).await;
    let shirt = product_id(&pool, "denim-shirt").await;
    let app = test_app(pool);
    let uri = format!("/api/v1/cart/add/{shirt}");
    let body = json!({ "variations": { "color": "blue", "size": "M" } });

    let first = call(&app, "POST", &uri, None, Some(body.clone())).await;
    assert_eq!(first.status, StatusCode::CREATED);
    let token = first.session_token.expect("guest token header");
    assert_eq!(first.json["data"]["session_token"], token.as_str());

    let second = call(&app, "POST", &uri, Some(&token), Some(body)).await;
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.session_token.is_none());
    assert_eq!(second.json["data"]["quantity"], 2);

    let cart = call(&app, "GET", "/api/v1/cart", Some(&token), None).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.json["data"]["lines"].as_array().map(Vec::len), Some(1));
    assert_eq!(money(&cart.json["data"]["totals"]["total"]), Decimal::new(10000, 2));
    assert_eq!(money(&cart.json["data"]["totals"]["tax"]), Decimal::new(200, 2));
    assert_eq!(money(&cart.json["data"]["totals"]["grand_total"]), Decimal::new(10200, 2));
}

#[sqlx::test(migrations = "../../migrations")]
async fn adding_unknown_product_opens_no_session(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());

    let reply = call(&app, "POST", "/api/v1/cart/add/999999", None, None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.session_token.is_none());

    let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(&pool)
        .await
        .expect("count sessions");
    assert_eq!(sessions, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn removing_lines_requires_a_session(pool: sqlx::PgPool) {
    seed(&pool).await;
    let shirt = product_id(&pool, "denim-shirt").await;
    let app = test_app(pool);

    let added = call(&app, "POST", &format!("/api/v1/cart/add/{shirt}"), None, None).await;
    let token = added.session_token.expect("token");
    let line_id = added.json["data"]["line_id"].as_i64().expect("line id");
    let remove_uri = format!("/api/v1/cart/remove/{shirt}/{line_id}");

    let anonymous = call(&app, "POST", &remove_uri, None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let removed = call(&app, "POST", &remove_uri, Some(&token), None).await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.json["data"]["deleted"], true);

    let again = call(
        &app,
        "DELETE",
        &format!("/api/v1/cart/remove_item/{shirt}/{line_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_requires_login(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let reply = call(&app, "GET", "/api/v1/cart/checkout", None, None).await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json["error"]["code"], "unauthorized");
}

#[sqlx::test(migrations = "../../migrations")]
async fn registration_reports_field_errors(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let body = json!({
        "username": "jd",
        "email": "not-an-email",
        "password": "secret",
        "confirm_password": "other"
    });

    let reply = call(&app, "POST", "/api/v1/accounts/registration", None, Some(body)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = reply.json["error"]["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .filter_map(|f| f["field"].as_str())
        .collect();
    assert!(fields.contains(&"username"));
    assert!(fields.contains(&"email"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn wrong_password_is_unauthorized(pool: sqlx::PgPool) {
    create_account(&pool, "jane@example.com", AccountRole::Customer).await;
    let app = test_app(pool);

    let reply = call(
        &app,
        "POST",
        "/api/v1/accounts/login",
        None,
        Some(json!({ "email": "jane@example.com", "password": "nope" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn place_order_with_empty_cart_is_conflict(pool: sqlx::PgPool) {
    create_account(&pool, "jane@example.com", AccountRole::Customer).await;
    let app = test_app(pool);
    let token = login(&app, "jane@example.com", None).await;

    let reply = call(
        &app,
        "POST",
        "/api/v1/orders/place_order",
        Some(&token),
        Some(billing_body()),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.json["error"]["code"], "empty_cart");
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_cart_is_reported_before_billing_errors(pool: sqlx::PgPool) {
    create_account(&pool, "jane@example.com", AccountRole::Customer).await;
    let app = test_app(pool);
    let token = login(&app, "jane@example.com", None).await;

    let mut body = billing_body();
    body["first_name"] = json!("J4ne");
    body["phone"] = json!("123");

    let reply = call(&app, "POST", "/api/v1/orders/place_order", Some(&token), Some(body)).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.json["error"]["code"], "empty_cart");
}

#[sqlx::test(migrations = "../../migrations")]
async fn guest_cart_follows_login_through_checkout(pool: sqlx::PgPool) {
    seed(&pool).await;
    let shirt = product_id(&pool, "denim-shirt").await;
    create_account(&pool, "jane@example.com", AccountRole::Customer).await;
    let app = test_app(pool.clone());

    let uri = format!("/api/v1/cart/add/{shirt}");
    let guest = call(&app, "POST", &uri, None, None).await;
    let guest_token = guest.session_token.expect("guest token");
    call(&app, "POST", &uri, Some(&guest_token), None).await;

    let token = login(&app, "jane@example.com", Some(&guest_token)).await;

    let checkout = call(&app, "GET", "/api/v1/cart/checkout", Some(&token), None).await;
    assert_eq!(checkout.status, StatusCode::OK);
    assert_eq!(money(&checkout.json["data"]["totals"]["grand_total"]), Decimal::new(10200, 2));

    let placed = call(
        &app,
        "POST",
        "/api/v1/orders/place_order",
        Some(&token),
        Some(billing_body()),
    )
    .await;
    assert_eq!(placed.status, StatusCode::CREATED);
    let order_number = placed.json["data"]["order"]["order_number"]
        .as_str()
        .expect("order number")
        .to_string();
    assert!(greatkart_core::orders::is_order_number(&order_number));

    let paid = call(
        &app,
        "POST",
        "/api/v1/orders/payments",
        Some(&token),
        Some(json!({ "orderID": order_number, "paymentMethod": "PayPal", "status": "COMPLETED" })),
    )
    .await;
    assert_eq!(paid.status, StatusCode::OK);
    assert_eq!(paid.json["data"]["order_number"], order_number.as_str());
    let trans_id = paid.json["data"]["transID"]
        .as_str()
        .expect("transID")
        .to_string();

    let cart = call(&app, "GET", "/api/v1/cart", Some(&token), None).await;
    assert_eq!(cart.json["data"]["totals"]["quantity"], 0);

    let receipt = call(
        &app,
        "GET",
        &format!("/api/v1/orders/order_complete?order_number={order_number}&payment_id={trans_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(receipt.status, StatusCode::OK);
    assert_eq!(money(&receipt.json["data"]["subtotal"]), Decimal::new(10000, 2));
    assert_eq!(money(&receipt.json["data"]["payment"]["amount_paid"]), Decimal::new(10200, 2));

    let wrong_payment = call(
        &app,
        "GET",
        &format!("/api/v1/orders/order_complete?order_number={order_number}&payment_id=nope"),
        None,
        None,
    )
    .await;
    assert_eq!(wrong_payment.status, StatusCode::NOT_FOUND);

    let dashboard = call(&app, "GET", "/api/v1/accounts/dashboard", Some(&token), None).await;
    assert_eq!(dashboard.json["data"]["orders_count"], 1);

    let detail = call(
        &app,
        "GET",
        &format!("/api/v1/accounts/order_detail/{order_number}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.json["data"]["lines"][0]["quantity"], 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn order_status_changes_need_staff(pool: sqlx::PgPool) {
    seed(&pool).await;
    let shirt = product_id(&pool, "denim-shirt").await;
    let customer_id = create_account(&pool, "jane@example.com", AccountRole::Customer).await;
    create_account(&pool, "admin@example.com", AccountRole::Superuser).await;

    greatkart_db::add_to_cart(&pool, &CartOwner::Account(customer_id), shirt, &[])
        .await
        .expect("add");
    let billing = serde_json::from_value::<greatkart_core::BillingInfo>(billing_body())
        .expect("billing")
        .validate()
        .expect("valid billing");
    let placed = greatkart_db::place_order(&pool, customer_id, &billing, "")
        .await
        .expect("place order");

    let app = test_app(pool);
    let uri = format!("/api/v1/admin/orders/{}/status", placed.order.order_number);

    let customer = login(&app, "jane@example.com", None).await;
    let reply = call(&app, "PATCH", &uri, Some(&customer), Some(json!({ "status": "Accepted" }))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let admin = login(&app, "admin@example.com", None).await;
    let reply = call(&app, "PATCH", &uri, Some(&admin), Some(json!({ "status": "Shipped" }))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = call(&app, "PATCH", &uri, Some(&admin), Some(json!({ "status": "Accepted" }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json["data"]["status"], "Accepted");
    assert_eq!(reply.json["data"]["is_ordered"], false);
}

#[sqlx::test(migrations = "../../migrations")]
async fn second_review_updates_the_first(pool: sqlx::PgPool) {
    seed(&pool).await;
    let shirt = product_id(&pool, "denim-shirt").await;
    create_account(&pool, "jane@example.com", AccountRole::Customer).await;
    let app = test_app(pool);
    let token = login(&app, "jane@example.com", None).await;
    let uri = format!("/api/v1/store/products/{shirt}/reviews");

    let anonymous = call(&app, "POST", &uri, None, Some(json!({ "rating": 4 }))).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let out_of_range = call(&app, "POST", &uri, Some(&token), Some(json!({ "rating": 7 }))).await;
    assert_eq!(out_of_range.status, StatusCode::BAD_REQUEST);

    let first = call(
        &app,
        "POST",
        &uri,
        Some(&token),
        Some(json!({ "subject": "Nice", "review": "Fits well", "rating": 4 })),
    )
    .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let second = call(
        &app,
        "POST",
        &uri,
        Some(&token),
        Some(json!({ "subject": "Nice", "review": "Faded fast", "rating": 2 })),
    )
    .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.json["data"]["id"], first.json["data"]["id"]);

    let detail = call(
        &app,
        "GET",
        "/api/v1/store/category/shirts/denim-shirt",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(detail.json["data"]["review_count"], 1);
    assert_eq!(detail.json["data"]["reviews"][0]["review"], "Faded fast");
}

#[sqlx::test(migrations = "../../migrations")]
async fn rate_limit_rejects_excess_requests(pool: sqlx::PgPool) {
    let app = build_app(
        AppState {
            pool,
            config: Arc::new(test_config()),
        },
        RateLimitState::new(1, Duration::from_secs(60)),
    );

    let first = call(&app, "GET", "/api/v1/categories", None, None).await;
    assert_eq!(first.status, StatusCode::OK);

    let second = call(&app, "GET", "/api/v1/categories", None, None).await;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.json["error"]["code"], "rate_limited");

    let health = call(&app, "GET", "/api/v1/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
}

#[sqlx::test(migrations = "../../migrations")]
async fn rate_limit_is_tracked_per_client(pool: sqlx::PgPool) {
    let app = build_app(
        AppState {
            pool,
            config: Arc::new(test_config()),
        },
        RateLimitState::new(1, Duration::from_secs(60)),
    );

    let from = |ip: &'static str| {
        Request::builder()
            .method("GET")
            .uri("/api/v1/categories")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .expect("request")
    };

    let first = app.clone().oneshot(from("10.0.0.1")).await.expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let other_client = app.clone().oneshot(from("10.0.0.2")).await.expect("response");
    assert_eq!(other_client.status(), StatusCode::OK);

    let repeat = app.clone().oneshot(from("10.0.0.1")).await.expect("response");
    assert_eq!(repeat.status(), StatusCode::TOO_MANY_REQUESTS);
}
