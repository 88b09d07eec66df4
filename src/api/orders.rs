//! Order endpoints.
//!
//! Orders are written together with their items inside one transaction, so
//! a failed item insert never leaves a half-built order or a half-replaced
//! item set behind. Non-staff callers only ever see their own orders.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use chrono::{SecondsFormat, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{json_response, CacheStatus, ResponseCache};
use crate::db::{
    DbPool, Order, OrderItemDetail, OrderItemInput, OrderListQuery, OrderResponse, OrderStatus,
    OrderWriteRequest, OrderWriteResponse, User,
};
use crate::signals::{Model, ModelEvent};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::filters::{order_clauses, push_where, Clause, SqlParam};
use super::validation::{validate_quantity, REQUIRED};
use super::ApiJson;

pub const ORDER_LIST_CACHE_PREFIX: &str = "order_list";

fn order_not_found() -> ApiError {
    ApiError::not_found("No Order matches the given query.")
}

/// Check the optional status and item lines of a write request
fn validate_write(request: &OrderWriteRequest, items_required: bool) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref status) = request.status {
        if let Err(e) = status.parse::<OrderStatus>() {
            errors.add("status", e);
        }
    }

    match request.items {
        Some(ref items) => {
            for item in items {
                errors.check("items", validate_quantity(item.quantity));
            }
        }
        None if items_required => {
            errors.add("items", REQUIRED);
        }
        None => {}
    }

    errors.finish()
}

/// Insert item lines for an order. Every product must exist; the caller's
/// transaction is rolled back on error.
async fn insert_items(
    conn: &mut SqliteConnection,
    order_id: &str,
    items: &[OrderItemInput],
) -> Result<(), ApiError> {
    for item in items {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = ?)")
            .bind(item.product)
            .fetch_one(&mut *conn)
            .await?;

        if !exists {
            return Err(ApiError::validation_field(
                "items",
                format!("Invalid pk \"{}\" - object does not exist.", item.product),
            ));
        }

        sqlx::query("INSERT INTO order_items (order_id, product_id, quantity) VALUES (?, ?, ?)")
            .bind(order_id)
            .bind(item.product)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Item lines of many orders in one query, grouped by order id
async fn load_item_details(
    db: &DbPool,
    order_ids: &[String],
) -> Result<HashMap<String, Vec<OrderItemDetail>>, sqlx::Error> {
    let mut grouped: HashMap<String, Vec<OrderItemDetail>> = HashMap::new();
    if order_ids.is_empty() {
        return Ok(grouped);
    }

    let mut qb: QueryBuilder<'static, Sqlite> = QueryBuilder::new(
        r#"
        SELECT oi.order_id, oi.product_id, p.name AS product_name, p.price_cents, oi.quantity
        FROM order_items oi
        JOIN products p ON p.id = oi.product_id
        WHERE oi.order_id IN ("#,
    );
    let mut ids = qb.separated(", ");
    for order_id in order_ids {
        ids.push_bind(order_id.clone());
    }
    qb.push(") ORDER BY oi.id");

    for item in qb.build_query_as::<OrderItemDetail>().fetch_all(db).await? {
        grouped.entry(item.order_id.clone()).or_default().push(item);
    }
    Ok(grouped)
}

async fn load_item_inputs(db: &DbPool, order_id: &str) -> Result<Vec<OrderItemInput>, sqlx::Error> {
    sqlx::query_as::<_, OrderItemInput>(
        "SELECT product_id AS product, quantity FROM order_items WHERE order_id = ? ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(db)
    .await
}

/// Fetch an order the caller may see. Other users' orders are reported as
/// missing.
async fn fetch_visible_order(db: &DbPool, user: &User, order_id: &str) -> Result<Order, ApiError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(order_not_found)?;

    if !user.is_staff && order.user_id != user.id {
        return Err(order_not_found());
    }
    Ok(order)
}

/// List orders, newest first. Staff see every order; others their own.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<OrderListQuery>,
) -> Result<Response, ApiError> {
    let vary = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let cache_key = ResponseCache::key(ORDER_LIST_CACHE_PREFIX, vary, &uri);
    if let Some(body) = state.cache.get(&cache_key) {
        tracing::debug!(key = %cache_key, "Order list served from cache");
        return Ok(json_response(body, CacheStatus::Hit));
    }

    let mut clauses = order_clauses(&query)?;
    if !user.is_staff {
        clauses.push(Clause::Cmp {
            column: "o.user_id",
            op: "=",
            value: SqlParam::Int(user.id),
        });
    }

    let mut qb: QueryBuilder<'static, Sqlite> = QueryBuilder::new("SELECT o.* FROM orders o");
    push_where(&mut qb, &clauses);
    qb.push(" ORDER BY o.created_at DESC, o.order_id");
    let orders = qb.build_query_as::<Order>().fetch_all(&state.db).await?;

    let order_ids: Vec<String> = orders.iter().map(|o| o.order_id.clone()).collect();
    let mut items = load_item_details(&state.db, &order_ids).await?;

    let results: Vec<OrderResponse> = orders
        .into_iter()
        .map(|order| {
            let lines = items.remove(&order.order_id).unwrap_or_default();
            OrderResponse::new(order, &lines)
        })
        .collect();

    let body = serde_json::to_vec(&results)
        .map(bytes::Bytes::from)
        .map_err(|e| ApiError::internal(format!("Failed to serialize response: {}", e)))?;

    state.cache.insert(cache_key, body.clone());
    Ok(json_response(body, CacheStatus::Miss))
}

/// Create an order with its items, owned by the caller
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(request): ApiJson<OrderWriteRequest>,
) -> Result<(StatusCode, Json<OrderWriteResponse>), ApiError> {
    validate_write(&request, true)?;

    let status = request
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| ApiError::validation_field("status", e))?
        .unwrap_or_default();
    let items = request.items.unwrap_or_default();

    let order_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

    let mut tx = state.db.begin().await?;

    sqlx::query("INSERT INTO orders (order_id, user_id, created_at, status) VALUES (?, ?, ?, ?)")
        .bind(&order_id)
        .bind(user.id)
        .bind(&created_at)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;

    insert_items(&mut tx, &order_id, &items).await?;

    tx.commit().await?;

    tracing::info!(
        order_id = %order_id,
        user_id = user.id,
        items = items.len(),
        "Order created"
    );
    state.signals.send(ModelEvent::PostSave {
        model: Model::Order,
        created: true,
    });

    let items = load_item_inputs(&state.db, &order_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(OrderWriteResponse {
            order_id,
            user: user.id,
            status: status.as_str().to_string(),
            items,
        }),
    ))
}

/// Get a single order with item details and total
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = fetch_visible_order(&state.db, &user, &order_id).await?;
    let mut items = load_item_details(&state.db, std::slice::from_ref(&order.order_id)).await?;
    let lines = items.remove(&order.order_id).unwrap_or_default();
    Ok(Json(OrderResponse::new(order, &lines)))
}

/// Update an order (PUT and PATCH). A present `items` list replaces the
/// whole item set; if any new line is invalid the old set is kept.
pub async fn update_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(order_id): Path<String>,
    ApiJson(request): ApiJson<OrderWriteRequest>,
) -> Result<Json<OrderWriteResponse>, ApiError> {
    let order = fetch_visible_order(&state.db, &user, &order_id).await?;
    validate_write(&request, false)?;

    let status = match request.status.as_deref() {
        Some(s) => s
            .parse::<OrderStatus>()
            .map_err(|e| ApiError::validation_field("status", e))?
            .as_str()
            .to_string(),
        None => order.status.clone(),
    };

    let mut tx = state.db.begin().await?;

    sqlx::query("UPDATE orders SET status = ? WHERE order_id = ?")
        .bind(&status)
        .bind(&order.order_id)
        .execute(&mut *tx)
        .await?;

    if let Some(ref items) = request.items {
        sqlx::query("DELETE FROM order_items WHERE order_id = ?")
            .bind(&order.order_id)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, &order.order_id, items).await?;
    }

    tx.commit().await?;

    tracing::info!(
        order_id = %order.order_id,
        user_id = user.id,
        items_replaced = request.items.is_some(),
        "Order updated"
    );
    state.signals.send(ModelEvent::PostSave {
        model: Model::Order,
        created: false,
    });

    let items = load_item_inputs(&state.db, &order.order_id).await?;
    Ok(Json(OrderWriteResponse {
        order_id: order.order_id,
        user: order.user_id,
        status,
        items,
    }))
}

/// Delete an order and its items
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(order_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order = fetch_visible_order(&state.db, &user, &order_id).await?;

    sqlx::query("DELETE FROM orders WHERE order_id = ?")
        .bind(&order.order_id)
        .execute(&state.db)
        .await?;

    tracing::info!(order_id = %order.order_id, user_id = user.id, "Order deleted");
    state.signals.send(ModelEvent::PostDelete { model: Model::Order });

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: Option<&str>, items: Option<Vec<(i64, i64)>>) -> OrderWriteRequest {
        OrderWriteRequest {
            status: status.map(str::to_string),
            items: items.map(|lines| {
                lines
                    .into_iter()
                    .map(|(product, quantity)| OrderItemInput { product, quantity })
                    .collect()
            }),
        }
    }

    #[test]
    fn test_items_required_on_create_only() {
        let err = validate_write(&request(None, None), true).unwrap_err();
        assert_eq!(err.details().unwrap()["items"], vec![REQUIRED.to_string()]);

        assert!(validate_write(&request(Some("Confirmed"), None), false).is_ok());
        assert!(validate_write(&request(None, Some(vec![])), true).is_ok());
    }

    #[test]
    fn test_invalid_status_and_quantity() {
        let err = validate_write(&request(Some("Shipped"), Some(vec![(1, 0)])), true).unwrap_err();
        let details = err.details().unwrap();
        assert_eq!(details["status"], vec!["\"Shipped\" is not a valid choice.".to_string()]);
        assert_eq!(details["items"].len(), 1);
    }
}
