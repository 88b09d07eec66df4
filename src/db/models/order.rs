//! Order and order item models and DTOs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("\"{}\" is not a valid choice.", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub order_id: String,
    pub user_id: i64,
    pub created_at: String,
    pub status: String,
}

/// An order item joined with the product it references
#[derive(Debug, Clone, FromRow)]
pub struct OrderItemDetail {
    pub order_id: String,
    pub product_id: i64,
    pub product_name: String,
    pub price_cents: i64,
    pub quantity: i64,
}

impl OrderItemDetail {
    pub fn product_price(&self) -> Decimal {
        Decimal::new(self.price_cents, 2)
    }

    /// Current product price times quantity; never stored
    pub fn item_subtotal(&self) -> Decimal {
        self.product_price() * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub product_name: String,
    pub product_price: Decimal,
    pub quantity: i64,
    pub item_subtotal: Decimal,
}

impl From<&OrderItemDetail> for OrderItemResponse {
    fn from(item: &OrderItemDetail) -> Self {
        Self {
            product_name: item.product_name.clone(),
            product_price: item.product_price(),
            quantity: item.quantity,
            item_subtotal: item.item_subtotal(),
        }
    }
}

/// Read representation of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub created_at: String,
    pub user: i64,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_price: Decimal,
}

impl OrderResponse {
    pub fn new(order: Order, items: &[OrderItemDetail]) -> Self {
        let mut total_price: Decimal = items.iter().map(OrderItemDetail::item_subtotal).sum();
        total_price.rescale(2);

        Self {
            order_id: order.order_id,
            created_at: order.created_at,
            user: order.user_id,
            status: order.status,
            items: items.iter().map(OrderItemResponse::from).collect(),
            total_price,
        }
    }
}

/// A `(product, quantity)` line as written by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderItemInput {
    pub product: i64,
    pub quantity: i64,
}

/// Body of order create/update requests
#[derive(Debug, Default, Deserialize)]
pub struct OrderWriteRequest {
    pub status: Option<String>,
    pub items: Option<Vec<OrderItemInput>>,
}

/// Write representation returned from create/update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWriteResponse {
    pub order_id: String,
    pub user: i64,
    pub status: String,
    pub items: Vec<OrderItemInput>,
}

/// Query parameters accepted by the order list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    #[serde(rename = "created_at__lt")]
    pub created_at_lt: Option<String>,
    #[serde(rename = "created_at__gt")]
    pub created_at_gt: Option<String>,
    pub created_at_after: Option<String>,
    pub created_at_before: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price_cents: i64, quantity: i64) -> OrderItemDetail {
        OrderItemDetail {
            order_id: "o1".to_string(),
            product_id: 1,
            product_name: "Lamp".to_string(),
            price_cents,
            quantity,
        }
    }

    #[test]
    fn test_status_round_trip_and_rejection() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        let err = "Shipped".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err, "\"Shipped\" is not a valid choice.");
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_item_subtotal() {
        assert_eq!(item(1999, 3).item_subtotal(), Decimal::new(5997, 2));
    }

    #[test]
    fn test_order_total_is_sum_of_subtotals() {
        let order = Order {
            order_id: "o1".to_string(),
            user_id: 7,
            created_at: "2024-05-01T10:00:00Z".to_string(),
            status: "Pending".to_string(),
        };
        let response = OrderResponse::new(order, &[item(1000, 2), item(250, 4)]);
        assert_eq!(response.total_price, Decimal::new(3000, 2));
        assert_eq!(response.items.len(), 2);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["total_price"], "30.00");
        assert_eq!(json["items"][1]["item_subtotal"], "10.00");
    }

    #[test]
    fn test_empty_order_total_is_zero() {
        let order = Order {
            order_id: "o2".to_string(),
            user_id: 7,
            created_at: "2024-05-01T10:00:00Z".to_string(),
            status: "Pending".to_string(),
        };
        let json = serde_json::to_value(OrderResponse::new(order, &[])).unwrap();
        assert_eq!(json["total_price"], "0.00");
    }
}
