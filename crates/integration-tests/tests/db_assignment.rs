//! Courier assignment: all-or-nothing batches and spreadsheet write-back.

#![cfg(feature = "db-tests")]
#![allow(clippy::unwrap_used)]

use serde_json::json;
use sqlx::PgPool;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use livraison_api::db::orders;
use livraison_api::models::Order;
use livraison_api::services::{AssignmentRequest, AssignmentService, BatchReport, ServiceError, SyncService};
use livraison_api::sheets::mapping::{UNKNOWN_CLIENT, UNKNOWN_PRODUCT, map_rows_to_orders};
use livraison_api::sheets::{SheetContext, SheetsClient, SheetsError};
use livraison_core::{OrderNumber, OrderStatus, UserRole};
use livraison_integration_tests::{CMD_1, HEADER, create_user, strings};

const SHOP: &str = "Boutique principale";
const HEADER_ROW: &str = "/v4/spreadsheets/sheet-1/values/%27Commandes%27%211%3A1";
const BATCH_UPDATE: &str = "/v4/spreadsheets/sheet-1/values:batchUpdate";

/// Sync the reference row so `CMD-1` exists with a derived row reference.
async fn seed_cmd_1(pool: &PgPool) -> Order {
    let sheets = SheetsClient::with_static_token("http://127.0.0.1:9", "unused").unwrap();
    let context = SheetContext {
        spreadsheet_id: "sheet-1",
        sheet_name: "Commandes",
        default_shop: SHOP,
    };
    let mapped = map_rows_to_orders(&strings(&HEADER), &[strings(&CMD_1)], &context);
    SyncService::new(pool, &sheets, SHOP)
        .reconcile(mapped.candidates, BatchReport::default())
        .await;
    order(pool, "CMD-1").await.unwrap()
}

async fn order(pool: &PgPool, number: &str) -> Option<Order> {
    orders::get_by_number_for_update(pool, &OrderNumber::parse(number).unwrap())
        .await
        .unwrap()
}

fn request(value: serde_json::Value) -> AssignmentRequest {
    serde_json::from_value(value).unwrap()
}

async fn header_mock(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(HEADER_ROW))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "values": [HEADER] })))
        .mount(server)
        .await;
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_assigning_a_synced_order_marks_its_row(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    seed_cmd_1(&pool).await;

    let server = MockServer::start().await;
    header_mock(&server).await;
    Mock::given(method("POST"))
        .and(path(BATCH_UPDATE))
        .and(body_partial_json(json!({
            "data": [{ "range": "'Commandes'!J2", "values": [["Attribuée"]] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalUpdatedRows": 1,
            "totalUpdatedCells": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    let sheets = SheetsClient::with_static_token(server.uri(), "t").unwrap();

    let outcome = AssignmentService::new(&pool, Some(&sheets), SHOP)
        .assign(&request(json!({
            "livreurId": courier.id,
            "sheetOrders": [{ "numeroCommande": "CMD-1", "googleSheetsId": "x" }]
        })))
        .await
        .unwrap();
    assert_eq!(outcome.created, 0);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.sheet_rows_updated, 1);

    let stored = order(&pool, "CMD-1").await.unwrap();
    assert_eq!(stored.status, OrderStatus::Assigned);
    assert_eq!(stored.livreur_id, Some(courier.id));
    assert!(stored.assigned_at.is_some());
    // The synced reference wins over the one in the request
    assert_eq!(stored.google_sheets_id.as_deref(), Some("sheet-1:Commandes:2"));
    stored.check_invariants().unwrap();
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_unknown_order_is_created_assigned(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;

    let outcome = AssignmentService::new(&pool, None, SHOP)
        .assign(&request(json!({
            "livreurId": courier.id,
            "sheetOrders": [{
                "numeroCommande": 1042,
                "googleSheetsId": "x",
                "clientNom": "Awa Ndiaye",
                "clientTelephone": 771234567,
                "articles": [{ "nom": "Savon", "quantite": "3", "prix": 1500 }]
            }]
        })))
        .await
        .unwrap();
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.sheet_rows_updated, 0);

    let stored = order(&pool, "1042").await.unwrap();
    assert_eq!(stored.status, OrderStatus::Assigned);
    assert_eq!(stored.client_telephone, "771234567");
    assert_eq!(stored.articles[0].quantity, 3);
    assert_eq!(stored.boutique, SHOP);
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_number_and_reference_alone_create_the_order(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;

    let outcome = AssignmentService::new(&pool, None, SHOP)
        .assign(&request(json!({
            "livreurId": courier.id,
            "sheetOrders": [{ "numeroCommande": "CMD-1", "googleSheetsId": "x" }]
        })))
        .await
        .unwrap();
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.sheet_rows_updated, 0);

    let stored = order(&pool, "CMD-1").await.unwrap();
    assert_eq!(stored.status, OrderStatus::Assigned);
    assert_eq!(stored.livreur_id, Some(courier.id));
    assert_eq!(stored.client_nom, UNKNOWN_CLIENT);
    assert_eq!(stored.articles.len(), 1);
    assert_eq!(stored.articles[0].name, UNKNOWN_PRODUCT);
    assert_eq!(stored.boutique, SHOP);
    stored.check_invariants().unwrap();
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_one_bad_item_rolls_back_the_batch(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    seed_cmd_1(&pool).await;

    let result = AssignmentService::new(&pool, None, SHOP)
        .assign(&request(json!({
            "livreurId": courier.id,
            "sheetOrders": [
                {
                    "numeroCommande": "CMD-20",
                    "clientNom": "Fatou Sarr",
                    "produit": "Panier",
                    "quantite": 1,
                    "prix": "2500"
                },
                { "clientNom": "No number here" },
                { "numeroCommande": "CMD-1" }
            ]
        })))
        .await;

    let Err(ServiceError::InvalidInput { details, .. }) = result else {
        panic!("expected InvalidInput, got {result:?}");
    };
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].field, "sheetOrders[1]");

    assert!(order(&pool, "CMD-20").await.is_none());
    let cmd_1 = order(&pool, "CMD-1").await.unwrap();
    assert_eq!(cmd_1.status, OrderStatus::Pending);
    assert!(cmd_1.livreur_id.is_none());
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_write_back_failure_rolls_back(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    seed_cmd_1(&pool).await;

    let server = MockServer::start().await;
    header_mock(&server).await;
    Mock::given(method("POST"))
        .and(path(BATCH_UPDATE))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "The caller does not have permission" }
        })))
        .mount(&server)
        .await;
    let sheets = SheetsClient::with_static_token(server.uri(), "t").unwrap();

    let result = AssignmentService::new(&pool, Some(&sheets), SHOP)
        .assign(&request(json!({
            "livreurId": courier.id,
            "sheetOrders": [{ "numeroCommande": "CMD-1" }]
        })))
        .await;
    assert!(
        matches!(
            result,
            Err(ServiceError::Sheets(SheetsError::ExternalWriteFailed { .. }))
        ),
        "{result:?}"
    );

    let stored = order(&pool, "CMD-1").await.unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert!(stored.livreur_id.is_none());
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_only_active_couriers_receive_orders(pool: PgPool) {
    let closeur = create_user(&pool, "fatou@livraison.test", "Fatou", UserRole::Closeur, Some("Shop1")).await;
    seed_cmd_1(&pool).await;
    let service = AssignmentService::new(&pool, None, SHOP);

    for livreur_id in [json!(closeur.id), json!(424_242)] {
        let result = service
            .assign(&request(json!({
                "livreurId": livreur_id,
                "sheetOrders": [{ "numeroCommande": "CMD-1" }]
            })))
            .await;
        let Err(ServiceError::InvalidInput { details, .. }) = result else {
            panic!("expected InvalidInput, got {result:?}");
        };
        assert_eq!(details[0].field, "livreurId");
    }
    assert_eq!(order(&pool, "CMD-1").await.unwrap().status, OrderStatus::Pending);
}

#[sqlx::test(migrations = "../api/migrations")]
async fn test_delivered_orders_are_not_reassigned(pool: PgPool) {
    let courier = create_user(&pool, "moussa@livraison.test", "Moussa", UserRole::Livreur, None).await;
    let cmd_1 = seed_cmd_1(&pool).await;
    let now = chrono::Utc::now();
    orders::assign(&pool, cmd_1.id, courier.id, now, None).await.unwrap();
    orders::set_status(&pool, cmd_1.id, OrderStatus::Delivered, Some(now))
        .await
        .unwrap();

    let result = AssignmentService::new(&pool, None, SHOP)
        .assign(&request(json!({
            "livreurId": courier.id,
            "sheetOrders": [{ "numeroCommande": "CMD-1" }]
        })))
        .await;
    let Err(ServiceError::InvalidInput { details, .. }) = result else {
        panic!("expected InvalidInput, got {result:?}");
    };
    assert!(details[0].message.contains("delivered"));
}
