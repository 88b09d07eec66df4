//! Query-string filters, search and ordering for list endpoints.
//!
//! Filters parse into [`Clause`]s that render themselves onto a
//! `sqlx::QueryBuilder`, so every user-supplied value is bound rather than
//! spliced into SQL.

use sqlx::{QueryBuilder, Sqlite};

use crate::db::{OrderListQuery, OrderStatus, ProductListQuery};

use super::error::{ApiError, ValidationErrorBuilder};
use chrono::SecondsFormat;

use super::validation::{parse_date, parse_datetime, parse_price_filter};

/// A bound query value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

/// One predicate of a WHERE clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// `column <op> ?`
    Cmp {
        column: &'static str,
        op: &'static str,
        value: SqlParam,
    },
    /// Case-insensitive equality
    IExact { column: &'static str, value: String },
    /// Case-insensitive substring match
    IContains { column: &'static str, value: String },
    /// `low <= column <= high`
    Between {
        column: &'static str,
        low: SqlParam,
        high: SqlParam,
    },
    /// Any of the inner clauses
    AnyOf(Vec<Clause>),
}

impl Clause {
    fn push_to(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        match self {
            Clause::Cmp { column, op, value } => {
                qb.push(*column).push(" ").push(*op).push(" ");
                push_param(qb, value);
            }
            Clause::IExact { column, value } => {
                qb.push("LOWER(").push(*column).push(") = LOWER(");
                qb.push_bind(value.clone());
                qb.push(")");
            }
            Clause::IContains { column, value } => {
                // SQLite LIKE is case-insensitive for ASCII
                qb.push(*column).push(" LIKE ");
                qb.push_bind(format!("%{}%", escape_like(value)));
                qb.push(" ESCAPE '\\'");
            }
            Clause::Between { column, low, high } => {
                qb.push(*column).push(" BETWEEN ");
                push_param(qb, low);
                qb.push(" AND ");
                push_param(qb, high);
            }
            Clause::AnyOf(clauses) => {
                qb.push("(");
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    clause.push_to(qb);
                }
                qb.push(")");
            }
        }
    }
}

fn push_param(qb: &mut QueryBuilder<'static, Sqlite>, value: &SqlParam) {
    match value {
        SqlParam::Text(s) => qb.push_bind(s.clone()),
        SqlParam::Int(i) => qb.push_bind(*i),
    };
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Append `WHERE a AND b ...` for the given clauses (nothing if empty)
pub fn push_where(qb: &mut QueryBuilder<'static, Sqlite>, clauses: &[Clause]) {
    for (i, clause) in clauses.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        clause.push_to(qb);
    }
}

// -------------------------------------------------------------------------
// Products
// -------------------------------------------------------------------------

/// Columns the product list may be ordered by
const PRODUCT_ORDERING_FIELDS: [&str; 3] = ["name", "price", "stock"];

/// Build the clauses for a product list request: field filters, search and
/// the in-stock restriction.
pub fn product_clauses(query: &ProductListQuery) -> Result<Vec<Clause>, ApiError> {
    let mut clauses = vec![in_stock_clause()];
    let mut errors = ValidationErrorBuilder::new();

    if let Some(name) = &query.name_iexact {
        clauses.push(Clause::IExact { column: "name", value: name.clone() });
    }
    if let Some(name) = &query.name_icontains {
        clauses.push(Clause::IContains { column: "name", value: name.clone() });
    }

    let price_filters = [
        ("price", "=", &query.price),
        ("price__lt", "<", &query.price_lt),
        ("price__gt", ">", &query.price_gt),
    ];
    for (param, op, value) in price_filters {
        let Some(value) = value else { continue };
        match parse_price_filter(value) {
            Ok(cents) => clauses.push(Clause::Cmp {
                column: "price_cents",
                op,
                value: SqlParam::Int(cents),
            }),
            Err(e) => {
                errors.add(param, e);
            }
        }
    }

    if let Some(range) = &query.price_range {
        match parse_price_range(range) {
            Ok((low, high)) => clauses.push(Clause::Between {
                column: "price_cents",
                low: SqlParam::Int(low),
                high: SqlParam::Int(high),
            }),
            Err(e) => {
                errors.add("price__range", e);
            }
        }
    }

    errors.finish()?;

    if let Some(search) = &query.search {
        clauses.extend(search_clauses(search));
    }

    Ok(clauses)
}

/// Only products with stock left are listed
pub fn in_stock_clause() -> Clause {
    Clause::Cmp {
        column: "stock",
        op: ">",
        value: SqlParam::Int(0),
    }
}

fn parse_price_range(value: &str) -> Result<(i64, i64), String> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 2 {
        return Err("Range query expects two values.".to_string());
    }
    Ok((parse_price_filter(parts[0])?, parse_price_filter(parts[1])?))
}

/// Split search input into terms on whitespace and commas
fn search_terms(search: &str) -> Vec<&str> {
    search
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect()
}

/// Every term must match the name exactly (ignoring case) or appear in
/// the description
fn search_clauses(search: &str) -> Vec<Clause> {
    search_terms(search)
        .into_iter()
        .map(|term| {
            Clause::AnyOf(vec![
                Clause::IExact { column: "name", value: term.to_string() },
                Clause::IContains { column: "description", value: term.to_string() },
            ])
        })
        .collect()
}

/// `ORDER BY` for the product list. Unknown fields are ignored; `id` is
/// always the final tie-breaker.
pub fn product_ordering(ordering: Option<&str>) -> String {
    let mut terms: Vec<String> = Vec::new();

    for field in ordering.unwrap_or("").split(',') {
        let field = field.trim();
        let (name, direction) = match field.strip_prefix('-') {
            Some(name) => (name, "DESC"),
            None => (field, "ASC"),
        };
        if !PRODUCT_ORDERING_FIELDS.contains(&name) {
            continue;
        }
        let column = if name == "price" { "price_cents" } else { name };
        terms.push(format!("{} {}", column, direction));
    }

    terms.push("id ASC".to_string());
    format!(" ORDER BY {}", terms.join(", "))
}

// -------------------------------------------------------------------------
// Orders
// -------------------------------------------------------------------------

/// Full creation timestamp, stored as fixed-width RFC 3339 UTC text
const ORDER_CREATED_AT: &str = "o.created_at";

/// Calendar date of an order's creation timestamp
const ORDER_CREATED_DATE: &str = "substr(o.created_at, 1, 10)";

pub fn order_clauses(query: &OrderListQuery) -> Result<Vec<Clause>, ApiError> {
    let mut clauses = Vec::new();
    let mut errors = ValidationErrorBuilder::new();

    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        match status.parse::<OrderStatus>() {
            Ok(status) => clauses.push(Clause::Cmp {
                column: "o.status",
                op: "=",
                value: SqlParam::Text(status.as_str().to_string()),
            }),
            Err(_) => {
                errors.add(
                    "status",
                    format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        status
                    ),
                );
            }
        }
    }

    // Timestamp comparisons; a bare date means midnight UTC
    let datetime_filters = [
        ("created_at__lt", "<", &query.created_at_lt),
        ("created_at__gt", ">", &query.created_at_gt),
    ];
    for (param, op, value) in datetime_filters {
        let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        match parse_datetime(value) {
            Ok(at) => clauses.push(Clause::Cmp {
                column: ORDER_CREATED_AT,
                op,
                value: SqlParam::Text(at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            }),
            Err(e) => {
                errors.add(param, e);
            }
        }
    }

    // Inclusive calendar-date range
    let date_filters = [
        ("created_at_after", ">=", &query.created_at_after),
        ("created_at_before", "<=", &query.created_at_before),
    ];
    for (param, op, value) in date_filters {
        let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        match parse_date(value) {
            Ok(date) => clauses.push(Clause::Cmp {
                column: ORDER_CREATED_DATE,
                op,
                value: SqlParam::Text(date.format("%Y-%m-%d").to_string()),
            }),
            Err(e) => {
                errors.add(param, e);
            }
        }
    }

    errors.finish()?;
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(clauses: &[Clause]) -> String {
        let mut qb = QueryBuilder::new("SELECT * FROM products");
        push_where(&mut qb, clauses);
        qb.sql().to_string()
    }

    #[test]
    fn test_in_stock_is_always_applied() {
        let clauses = product_clauses(&ProductListQuery::default()).unwrap();
        assert_eq!(clauses, vec![in_stock_clause()]);
        assert_eq!(render(&clauses), "SELECT * FROM products WHERE stock > ?");
    }

    #[test]
    fn test_price_filters() {
        let query = ProductListQuery {
            price_gt: Some("10".to_string()),
            price_range: Some("5,20.50".to_string()),
            ..Default::default()
        };
        let clauses = product_clauses(&query).unwrap();
        assert!(clauses.contains(&Clause::Cmp {
            column: "price_cents",
            op: ">",
            value: SqlParam::Int(1000),
        }));
        assert!(clauses.contains(&Clause::Between {
            column: "price_cents",
            low: SqlParam::Int(500),
            high: SqlParam::Int(2050),
        }));
    }

    #[test]
    fn test_invalid_filters_are_field_errors() {
        let query = ProductListQuery {
            price_lt: Some("cheap".to_string()),
            price_range: Some("5".to_string()),
            ..Default::default()
        };
        let err = product_clauses(&query).unwrap_err();
        let details = err.details().unwrap();
        assert_eq!(details["price__lt"], vec!["Enter a number.".to_string()]);
        assert_eq!(
            details["price__range"],
            vec!["Range query expects two values.".to_string()]
        );
    }

    #[test]
    fn test_search_terms_and_rendering() {
        assert_eq!(search_terms(" mug, blue  tea "), vec!["mug", "blue", "tea"]);

        let query = ProductListQuery {
            search: Some("mug blue".to_string()),
            ..Default::default()
        };
        let clauses = product_clauses(&query).unwrap();
        assert_eq!(clauses.len(), 3);
        assert_eq!(
            render(&clauses[1..2]),
            "SELECT * FROM products WHERE (LOWER(name) = LOWER(?) OR description LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_product_ordering() {
        assert_eq!(product_ordering(None), " ORDER BY id ASC");
        assert_eq!(
            product_ordering(Some("-price,name,password")),
            " ORDER BY price_cents DESC, name ASC, id ASC"
        );
    }

    #[test]
    fn test_order_filters() {
        let query = OrderListQuery {
            status: Some("Confirmed".to_string()),
            created_at_after: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        let clauses = order_clauses(&query).unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(
            clauses[1],
            Clause::Cmp {
                column: ORDER_CREATED_DATE,
                op: ">=",
                value: SqlParam::Text("2024-01-01".to_string()),
            }
        );
    }

    #[test]
    fn test_order_timestamp_filters() {
        let query = OrderListQuery {
            created_at_gt: Some("2024-01-01".to_string()),
            created_at_lt: Some("2024-01-02T12:30:00+02:00".to_string()),
            ..Default::default()
        };
        let clauses = order_clauses(&query).unwrap();
        assert_eq!(
            clauses,
            vec![
                Clause::Cmp {
                    column: ORDER_CREATED_AT,
                    op: "<",
                    value: SqlParam::Text("2024-01-02T10:30:00.000000Z".to_string()),
                },
                Clause::Cmp {
                    column: ORDER_CREATED_AT,
                    op: ">",
                    value: SqlParam::Text("2024-01-01T00:00:00.000000Z".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_order_filter_errors() {
        let query = OrderListQuery {
            status: Some("Lost".to_string()),
            created_at_lt: Some("yesterday".to_string()),
            ..Default::default()
        };
        let err = order_clauses(&query).unwrap_err();
        let details = err.details().unwrap();
        assert!(details.contains_key("status"));
        assert_eq!(details["created_at__lt"], vec!["Enter a valid date/time.".to_string()]);
    }
}
