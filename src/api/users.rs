//! Staff-only user directory.

use axum::{extract::State, Json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{User, UserResponse, UserWithOrders};
use crate::AppState;

use super::auth::StaffUser;
use super::error::ApiError;

/// List every user with the ids of the orders they own
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    StaffUser(_staff): StaffUser,
) -> Result<Json<Vec<UserWithOrders>>, ApiError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    let owned: Vec<(i64, String)> =
        sqlx::query_as("SELECT user_id, order_id FROM orders ORDER BY created_at, order_id")
            .fetch_all(&state.db)
            .await?;

    let mut orders_by_user: HashMap<i64, Vec<String>> = HashMap::new();
    for (user_id, order_id) in owned {
        orders_by_user.entry(user_id).or_default().push(order_id);
    }

    let results = users
        .into_iter()
        .map(|user| UserWithOrders {
            orders: orders_by_user.remove(&user.id).unwrap_or_default(),
            user: UserResponse::from(user),
        })
        .collect();

    Ok(Json(results))
}
