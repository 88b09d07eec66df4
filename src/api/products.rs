//! Product catalogue endpoints.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use bytes::Bytes;
use sqlx::{QueryBuilder, Sqlite};
use std::sync::Arc;

use crate::cache::{json_response, CacheStatus, ResponseCache};
use crate::db::{Product, ProductInfoResponse, ProductListQuery, ProductPayload, ProductResponse};
use crate::signals::{Model, ModelEvent};
use crate::AppState;

use super::auth::{MaybeUser, StaffUser};
use super::error::{ApiError, ValidationErrorBuilder};
use super::filters::{product_clauses, product_ordering, push_where};
use super::pagination::{LimitOffset, Page};
use super::validation::{
    validate_description, validate_image, validate_price, validate_product_name, validate_stock,
    REQUIRED,
};
use super::ApiJson;

pub const PRODUCT_LIST_CACHE_PREFIX: &str = "product_list";

/// Validated column values for a product write
#[derive(Debug)]
struct ProductFields {
    name: String,
    description: String,
    price_cents: i64,
    stock: i64,
    image: Option<String>,
}

/// Take the submitted value, or the current one for partial updates.
/// A value missing from both is reported as required.
fn field_or_current<T>(
    errors: &mut ValidationErrorBuilder,
    field: &str,
    submitted: Option<T>,
    current: Option<T>,
) -> Option<T> {
    let value = submitted.or(current);
    if value.is_none() {
        errors.add(field, REQUIRED);
    }
    value
}

/// Validate a create/update body. `partial_base` is the stored product for
/// PATCH, whose values fill in whatever the client omitted.
fn validate_payload(
    payload: ProductPayload,
    partial_base: Option<&Product>,
    current_image: Option<String>,
) -> Result<ProductFields, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let name = field_or_current(
        &mut errors,
        "name",
        payload.name,
        partial_base.map(|p| p.name.clone()),
    );
    if let Some(ref name) = name {
        errors.check("name", validate_product_name(name));
    }

    let description = field_or_current(
        &mut errors,
        "description",
        payload.description,
        partial_base.map(|p| p.description.clone()),
    );
    if let Some(ref description) = description {
        errors.check("description", validate_description(description));
    }

    let mut price_cents = None;
    if let Some(price) = payload.price {
        match validate_price(price) {
            Ok(cents) => price_cents = Some(cents),
            Err(e) => {
                errors.add("price", e);
            }
        }
    } else if let Some(product) = partial_base {
        price_cents = Some(product.price_cents);
    } else {
        errors.add("price", REQUIRED);
    }

    let stock = field_or_current(
        &mut errors,
        "stock",
        payload.stock,
        partial_base.map(|p| p.stock),
    );
    if let Some(stock) = stock {
        errors.check("stock", validate_stock(stock));
    }

    let image = payload.image.or(current_image);
    errors.check("image", validate_image(&image));

    errors.finish()?;

    match (name, description, price_cents, stock) {
        (Some(name), Some(description), Some(price_cents), Some(stock)) => Ok(ProductFields {
            name,
            description,
            price_cents,
            stock,
            image,
        }),
        _ => Err(ApiError::internal("Incomplete product after validation")),
    }
}

fn parse_product_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse().map_err(|_| product_not_found())
}

fn product_not_found() -> ApiError {
    ApiError::not_found("No Product matches the given query.")
}

async fn fetch_product(state: &AppState, id: i64) -> Result<Product, ApiError> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(product_not_found)
}

fn to_json_bytes<T: serde::Serialize>(value: &T) -> Result<Bytes, ApiError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ApiError::internal(format!("Failed to serialize response: {}", e)))
}

/// List in-stock products with filtering, search, ordering and optional
/// pagination. Responses are cached until a product changes.
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    MaybeUser(_caller): MaybeUser,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<ProductListQuery>,
) -> Result<Response, ApiError> {
    let cache_key = ResponseCache::key(PRODUCT_LIST_CACHE_PREFIX, None, &uri);
    if let Some(body) = state.cache.get(&cache_key) {
        tracing::debug!(key = %cache_key, "Product list served from cache");
        return Ok(json_response(body, CacheStatus::Hit));
    }

    let clauses = product_clauses(&query)?;
    let ordering = product_ordering(query.ordering.as_deref());
    let window = LimitOffset::from_query(
        query.limit.as_deref(),
        query.offset.as_deref(),
        &state.config.pagination,
    );

    let mut select: QueryBuilder<'static, Sqlite> = QueryBuilder::new("SELECT * FROM products");
    push_where(&mut select, &clauses);
    select.push(ordering);

    let body = match window {
        Some(window) => {
            let mut count: QueryBuilder<'static, Sqlite> =
                QueryBuilder::new("SELECT COUNT(*) FROM products");
            push_where(&mut count, &clauses);
            let total_count: i64 = count.build_query_scalar::<i64>().fetch_one(&state.db).await?;

            select.push(" LIMIT ");
            select.push_bind(window.limit);
            select.push(" OFFSET ");
            select.push_bind(window.offset);
            let products = select.build_query_as::<Product>().fetch_all(&state.db).await?;

            let results: Vec<ProductResponse> = products.into_iter().map(Into::into).collect();
            to_json_bytes(&Page::new(results, total_count, window, &uri))?
        }
        None => {
            let products = select.build_query_as::<Product>().fetch_all(&state.db).await?;
            let results: Vec<ProductResponse> = products.into_iter().map(Into::into).collect();
            to_json_bytes(&results)?
        }
    };

    state.cache.insert(cache_key, body.clone());
    Ok(json_response(body, CacheStatus::Miss))
}

/// Create a product
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let fields = validate_payload(payload, None, None)?;

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products (name, description, price_cents, stock, image)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.price_cents)
    .bind(fields.stock)
    .bind(&fields.image)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(product_id = product.id, user_id = user.id, "Product created");
    state.signals.send(ModelEvent::PostSave {
        model: Model::Product,
        created: true,
    });

    Ok((StatusCode::CREATED, Json(product.into())))
}

/// Get a single product, in stock or not
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    MaybeUser(_caller): MaybeUser,
    Path(product_id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id = parse_product_id(&product_id)?;
    let product = fetch_product(&state, id).await?;
    Ok(Json(product.into()))
}

/// Replace a product (PUT)
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    Path(product_id): Path<String>,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id = parse_product_id(&product_id)?;
    let current = fetch_product(&state, id).await?;
    let fields = validate_payload(payload, None, current.image)?;
    save_product(&state, id, fields, user.id).await
}

/// Update some fields of a product (PATCH)
pub async fn partial_update_product(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    Path(product_id): Path<String>,
    ApiJson(payload): ApiJson<ProductPayload>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id = parse_product_id(&product_id)?;
    let current = fetch_product(&state, id).await?;
    let fields = validate_payload(payload, Some(&current), current.image.clone())?;
    save_product(&state, id, fields, user.id).await
}

async fn save_product(
    state: &AppState,
    id: i64,
    fields: ProductFields,
    user_id: i64,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET name = ?, description = ?, price_cents = ?, stock = ?, image = ?
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&fields.name)
    .bind(&fields.description)
    .bind(fields.price_cents)
    .bind(fields.stock)
    .bind(&fields.image)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(product_not_found)?;

    tracing::info!(product_id = id, user_id, "Product updated");
    state.signals.send(ModelEvent::PostSave {
        model: Model::Product,
        created: false,
    });

    Ok(Json(product.into()))
}

/// Delete a product. Order items referencing it go with it.
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    Path(product_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_product_id(&product_id)?;

    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(product_not_found());
    }

    tracing::info!(product_id = id, user_id = user.id, "Product deleted");
    state.signals.send(ModelEvent::PostDelete {
        model: Model::Product,
    });

    Ok(StatusCode::NO_CONTENT)
}

/// Whole-catalogue summary: every product, the count and the top price
pub async fn product_info(
    State(state): State<Arc<AppState>>,
    MaybeUser(_caller): MaybeUser,
) -> Result<Json<ProductInfoResponse>, ApiError> {
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    let max_price_cents: Option<i64> = sqlx::query_scalar("SELECT MAX(price_cents) FROM products")
        .fetch_one(&state.db)
        .await?;

    Ok(Json(ProductInfoResponse {
        count: products.len() as i64,
        max_price: max_price_cents.map(|cents| cents as f64 / 100.0),
        products: products.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn stored() -> Product {
        Product {
            id: 3,
            name: "Lamp".to_string(),
            description: "Brass desk lamp".to_string(),
            price_cents: 4500,
            stock: 2,
            image: Some("products/lamp.png".to_string()),
        }
    }

    #[test]
    fn test_full_payload_requires_every_field() {
        let err = validate_payload(ProductPayload::default(), None, None).unwrap_err();
        let details = err.details().unwrap();
        for field in ["name", "description", "price", "stock"] {
            assert_eq!(details[field], vec![REQUIRED.to_string()], "{}", field);
        }
        assert!(!details.contains_key("image"));
    }

    #[test]
    fn test_partial_payload_fills_from_current() {
        let current = stored();
        let payload = ProductPayload {
            stock: Some(0),
            ..Default::default()
        };
        let fields = validate_payload(payload, Some(&current), current.image.clone()).unwrap();
        assert_eq!(fields.name, "Lamp");
        assert_eq!(fields.price_cents, 4500);
        assert_eq!(fields.stock, 0);
        assert_eq!(fields.image.as_deref(), Some("products/lamp.png"));
    }

    #[test]
    fn test_non_positive_price_is_rejected() {
        let current = stored();
        for price in [Decimal::ZERO, Decimal::new(-100, 2)] {
            let payload = ProductPayload {
                price: Some(price),
                ..Default::default()
            };
            let err = validate_payload(payload, Some(&current), None).unwrap_err();
            assert_eq!(
                err.details().unwrap()["price"],
                vec!["Price must be greater than zero.".to_string()]
            );
        }
    }

    #[test]
    fn test_parse_product_id() {
        assert_eq!(parse_product_id("12").unwrap(), 12);
        assert_eq!(parse_product_id("abc").unwrap_err().status(), StatusCode::NOT_FOUND);
    }
}
