mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;

fn names(body: &serde_json::Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn list_excludes_out_of_stock_products() {
    let app = TestApp::new().await;
    app.create_product("Mug", 1250, 3).await;
    app.create_product("Sold Out Lamp", 4000, 0).await;

    let response = app.get("/products/", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(names(&response.body), vec!["Mug"]);
    assert_eq!(response.body[0]["price"], "12.50");
}

#[tokio::test]
async fn out_of_stock_product_is_still_readable_by_id() {
    let app = TestApp::new().await;
    let id = app.create_product("Sold Out Lamp", 4000, 0).await;

    let response = app.get(&format!("/products/{}/", id), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["stock"], 0);

    let missing = app.get("/products/999/", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(
        missing.body["error"]["message"],
        "No Product matches the given query."
    );
}

#[tokio::test]
async fn create_rejects_non_positive_prices() {
    let app = TestApp::new().await;
    let staff = app.create_user("admin", true).await;
    let token = app.token(&staff);

    for price in [json!("0.00"), json!(-5), json!("-0.01")] {
        let response = app
            .post(
                "/products/",
                Some(&token),
                json!({"name": "Mug", "description": "Ceramic", "price": price, "stock": 1}),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "price {}", price);
        assert_eq!(
            response.body["error"]["details"]["price"][0],
            "Price must be greater than zero."
        );
    }

    let response = app
        .post(
            "/products/",
            Some(&token),
            json!({"name": "Mug", "description": "Ceramic", "price": "0.01", "stock": 1}),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["price"], "0.01");
    assert_eq!(app.count("SELECT COUNT(*) FROM products").await, 1);
}

#[tokio::test]
async fn writes_require_staff() {
    let app = TestApp::new().await;
    let customer = app.create_user("customer", false).await;
    let body = json!({"name": "Mug", "description": "Ceramic", "price": "5", "stock": 1});

    let anonymous = app.post("/products/", None, body.clone()).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let forbidden = app.post("/products/", Some(&app.token(&customer)), body).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn update_and_delete_product() {
    let app = TestApp::new().await;
    let staff = app.create_user("admin", true).await;
    let token = app.token(&staff);
    let id = app.create_product("Mug", 1000, 5).await;
    let uri = format!("/products/{}/", id);

    let patched = app
        .request(Method::PATCH, &uri, Some(&token), Some(json!({"stock": 0})))
        .await;
    assert_eq!(patched.status, StatusCode::OK);
    assert_eq!(patched.body["stock"], 0);
    assert_eq!(patched.body["name"], "Mug");

    let incomplete = app
        .request(Method::PUT, &uri, Some(&token), Some(json!({"name": "Cup"})))
        .await;
    assert_eq!(incomplete.status, StatusCode::BAD_REQUEST);
    assert!(incomplete.body["error"]["details"]["price"].is_array());

    let replaced = app
        .request(
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({"name": "Cup", "description": "Glass", "price": 7.5, "stock": 2})),
        )
        .await;
    assert_eq!(replaced.status, StatusCode::OK);
    assert_eq!(replaced.body["price"], "7.50");

    let deleted = app.request(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(app.get(&uri, None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pagination_reports_total_and_current_page() {
    let app = TestApp::new().await;
    for i in 1..=5 {
        app.create_product(&format!("Product {}", i), 100 * i, 1).await;
    }
    app.create_product("Hidden", 100, 0).await;

    let response = app.get("/products/?limit=2&offset=2", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let page = &response.body;
    assert_eq!(page["total_count"], 5);
    assert_eq!(page["current_page"], 2);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["offset"], 2);
    assert_eq!(page["results"].as_array().unwrap().len(), 2);
    assert_eq!(page["results"][0]["name"], "Product 3");
    assert_eq!(page["next"], "/products/?limit=2&offset=4");
    assert_eq!(page["previous"], "/products/?limit=2");

    let last = app.get("/products/?limit=2&offset=4", None).await;
    assert_eq!(last.body["current_page"], 3);
    assert!(last.body["next"].is_null());
}

#[tokio::test]
async fn filters_search_and_ordering() {
    let app = TestApp::new().await;
    app.create_product("Mug", 1250, 3).await;
    app.create_product("Teapot", 3000, 1).await;
    app.create_product("Tea Towel", 800, 4).await;

    let cheap = app.get("/products/?price__lt=13", None).await;
    assert_eq!(names(&cheap.body), vec!["Mug", "Tea Towel"]);

    let ranged = app.get("/products/?price__range=8,12.50", None).await;
    assert_eq!(names(&ranged.body), vec!["Mug", "Tea Towel"]);

    let contains = app.get("/products/?name__icontains=TEA", None).await;
    assert_eq!(names(&contains.body), vec!["Teapot", "Tea Towel"]);

    let exact = app.get("/products/?search=mug", None).await;
    assert_eq!(names(&exact.body), vec!["Mug"]);

    let ordered = app.get("/products/?ordering=-price", None).await;
    assert_eq!(names(&ordered.body), vec!["Teapot", "Mug", "Tea Towel"]);

    let bad = app.get("/products/?price__gt=lots", None).await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad.body["error"]["details"]["price__gt"][0], "Enter a number.");
}

#[tokio::test]
async fn product_list_is_cached_until_a_product_changes() {
    let app = TestApp::new().await;
    let staff = app.create_user("admin", true).await;
    let token = app.token(&staff);
    app.create_product("Mug", 1250, 3).await;

    let first = app.get("/products/", None).await;
    assert_eq!(first.header("x-cache"), Some("MISS"));

    // Rows written behind the API are not seen until invalidation
    app.create_product("Bowl", 900, 2).await;
    let second = app.get("/products/", None).await;
    assert_eq!(second.header("x-cache"), Some("HIT"));
    assert_eq!(names(&second.body), vec!["Mug"]);

    let created = app
        .post(
            "/products/",
            Some(&token),
            json!({"name": "Plate", "description": "Stoneware", "price": "11.00", "stock": 6}),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);

    let third = app.get("/products/", None).await;
    assert_eq!(third.header("x-cache"), Some("MISS"));
    assert_eq!(names(&third.body), vec!["Mug", "Bowl", "Plate"]);
}

#[tokio::test]
async fn info_summarises_the_whole_catalogue() {
    let app = TestApp::new().await;

    let empty = app.get("/products/info/", None).await;
    assert_eq!(empty.body["count"], 0);
    assert!(empty.body["max_price"].is_null());

    app.create_product("Mug", 1250, 3).await;
    app.create_product("Lamp", 4599, 0).await;

    let info = app.get("/products/info/", None).await;
    assert_eq!(info.status, StatusCode::OK);
    assert_eq!(info.body["count"], 2);
    assert_eq!(info.body["max_price"], 45.99);
    assert_eq!(info.body["products"].as_array().unwrap().len(), 2);
}
