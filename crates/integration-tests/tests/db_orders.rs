//! Status transitions and the order endpoints against a real database.

#![cfg(feature = "db-tests")]
#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use sqlx::PgPool;

use livraison_api::db::orders;
use livraison_api::models::{CurrentUser, OrderDetails, Order, User};
use livraison_api::services::{ServiceError, transition};
use livraison_core::{LineItem, OrderNumber, OrderStatus, UserRole};
use livraison_integration_tests::{PASSWORD, bearer, create_user, send, test_app};
use rust_decimal::Decimal;

fn details(number: &str, shop: &str) -> OrderDetails {
    OrderDetails {
        numero_commande: OrderNumber::parse(number).unwrap(),
        google_sheets_id: None,
        date_commande: chrono::Utc::now(),
        client_nom: "Jean Dupont".to_string(),
        client_telephone: "0600000000".to_string(),
        adresse: "1 Rue A".to_string(),
        articles: vec![LineItem::new("Widget", 2, Decimal::new(999, 2)).unwrap()],
        boutique: shop.to_string(),
        sheet_status: None,
    }
}

async fn assigned_order(pool: &PgPool, number: &str, shop: &str, courier: &User) -> Order {
    orders::insert_assigned(pool, &details(number, shop), courier.id, chrono::Utc::now())
        .await
        .unwrap()
}

async fn reload(pool: &PgPool, order: &Order) -> Order {
    orders::get(pool, order.id).await.unwrap().unwrap()
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_courier_delivers_own_order(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    let order = assigned_order(&pool, "CMD-1", "Shop1", &courier).await;

    let delivered = transition::transition(&pool, &CurrentUser::from(&courier), order.id, "delivered")
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.delivered_at.is_some());
    assert_eq!(delivered.livreur_id, Some(courier.id));
    delivered.check_invariants().unwrap();
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_courier_cannot_touch_foreign_order(pool: PgPool) {
    let moussa = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    let awa = create_user(&pool, "awa@livraison.test", "Awa", UserRole::Livreur, None).await;
    let order = assigned_order(&pool, "CMD-1", "Shop1", &moussa).await;

    let result = transition::transition(&pool, &CurrentUser::from(&awa), order.id, "delivered").await;
    assert!(matches!(result, Err(ServiceError::Forbidden(_))), "{result:?}");

    let unchanged = reload(&pool, &order).await;
    assert_eq!(unchanged.status, OrderStatus::Assigned);
    assert_eq!(unchanged.livreur_id, Some(moussa.id));
    assert_eq!(unchanged.updated_at, order.updated_at);
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_terminal_orders_stay_terminal(pool: PgPool) {
    let admin = create_user(&pool, "admin@livraison.test", "Admin", UserRole::Admin, None).await;
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    let order = assigned_order(&pool, "CMD-1", "Shop1", &courier).await;
    let admin = CurrentUser::from(&admin);

    transition::transition(&pool, &admin, order.id, "cancelled")
        .await
        .unwrap();
    for next in ["delivered", "assigned", "pending"] {
        let result = transition::transition(&pool, &admin, order.id, next).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))), "{next}: {result:?}");
    }
    assert_eq!(reload(&pool, &order).await.status, OrderStatus::Cancelled);
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_closeur_limited_to_own_shop(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    let closeur = create_user(&pool, "fatou@livraison.test", "Fatou", UserRole::Closeur, Some("Shop1")).await;
    let own = assigned_order(&pool, "CMD-1", "Shop1", &courier).await;
    let foreign = assigned_order(&pool, "CMD-2", "Shop2", &courier).await;
    let closeur = CurrentUser::from(&closeur);

    let result = transition::transition(&pool, &closeur, foreign.id, "cancelled").await;
    assert!(matches!(result, Err(ServiceError::Forbidden(_))), "{result:?}");

    let cancelled = transition::transition(&pool, &closeur, own.id, "cancelled")
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.delivered_at.is_none());
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_login_then_list_own_orders(pool: PgPool) {
    let moussa = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    let awa = create_user(&pool, "awa@livraison.test", "Awa", UserRole::Livreur, None).await;
    assigned_order(&pool, "CMD-1", "Shop1", &moussa).await;
    assigned_order(&pool, "CMD-2", "Shop1", &moussa).await;
    assigned_order(&pool, "CMD-3", "Shop2", &awa).await;
    let app = test_app(pool, None);

    let (status, body) = send(
        app.clone(),
        Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "email": "MOUSSA@livraison.test", "password": PASSWORD }).to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["role"], "livreur");
    assert!(body["user"].get("passwordHash").is_none());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        app.clone(),
        Request::get("/orders?sort=numeroCommande&order=asc")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let numbers: Vec<&str> = body["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["numeroCommande"].as_str().unwrap())
        .collect();
    assert_eq!(numbers, ["CMD-1", "CMD-2"]);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["pages"], 1);

    let (status, body) = send(
        app,
        Request::get("/orders/stats/overview")
            .header(header::AUTHORIZATION, bearer(&CurrentUser::from(&awa)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["total"], 1);
    assert_eq!(body["byStatus"]["assigned"], 1);
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_wrong_password_is_unauthorized(pool: PgPool) {
    create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;

    let (status, body) = send(
        test_app(pool, None),
        Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "email": "moussa@livraison.test", "password": "nope" }).to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_status_update_over_http(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    let order = assigned_order(&pool, "CMD-1", "Shop1", &courier).await;

    let (status, body) = send(
        test_app(pool.clone(), None),
        Request::put(format!("/orders/{}/status", order.id))
            .header(header::AUTHORIZATION, bearer(&CurrentUser::from(&courier)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "status": "delivered" }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["order"]["status"], "delivered");

    let (status, _) = send(
        test_app(pool, None),
        Request::put(format!("/orders/{}/status", order.id))
            .header(header::AUTHORIZATION, bearer(&CurrentUser::from(&courier)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "status": "cancelled" }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
