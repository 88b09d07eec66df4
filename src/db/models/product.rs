//! Product models and DTOs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Catalogue row. Prices are stored as integer cents.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub stock: i64,
    pub image: Option<String>,
}

impl Product {
    pub fn price(&self) -> Decimal {
        Decimal::new(self.price_cents, 2)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Serialized as a string with two decimals, e.g. `"12.50"`
    pub price: Decimal,
    pub stock: i64,
    pub image: Option<String>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            price: product.price(),
            id: product.id,
            name: product.name,
            description: product.description,
            stock: product.stock,
            image: product.image,
        }
    }
}

/// Body of product create/update requests. Every field is optional at the
/// wire level so that missing fields surface as field-level validation
/// errors rather than a decode failure.
#[derive(Debug, Default, Deserialize)]
pub struct ProductPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i64>,
    pub image: Option<String>,
}

/// Catalogue summary for `/products/info/`
#[derive(Debug, Serialize, Deserialize)]
pub struct ProductInfoResponse {
    pub products: Vec<ProductResponse>,
    pub count: i64,
    pub max_price: Option<f64>,
}

/// Query parameters accepted by the product list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListQuery {
    #[serde(rename = "name__iexact")]
    pub name_iexact: Option<String>,
    #[serde(rename = "name__icontains")]
    pub name_icontains: Option<String>,
    pub price: Option<String>,
    #[serde(rename = "price__lt")]
    pub price_lt: Option<String>,
    #[serde(rename = "price__gt")]
    pub price_gt: Option<String>,
    #[serde(rename = "price__range")]
    pub price_range: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}
