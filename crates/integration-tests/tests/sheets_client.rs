//! Google Sheets gateway against a mocked Sheets API.

#![allow(clippy::unwrap_used)]

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use livraison_api::sheets::mapping::map_rows_to_orders;
use livraison_api::sheets::{CellUpdate, SheetContext, SheetsClient, SheetsError, range};
use livraison_integration_tests::{CMD_1, HEADER};

const SPREADSHEET: &str = "sheet-1";
const WHOLE_TAB: &str = "/v4/spreadsheets/sheet-1/values/%27Commandes%27";

async fn client(server: &MockServer) -> SheetsClient {
    SheetsClient::with_static_token(server.uri(), "test-token").unwrap()
}

#[tokio::test]
async fn test_metadata_lists_tabs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "properties": { "title": "Commandes Janvier" },
            "sheets": [
                { "properties": { "title": "Commandes" } },
                { "properties": { "title": "Archive" } }
            ]
        })))
        .mount(&server)
        .await;

    let metadata = client(&server)
        .await
        .spreadsheet_metadata(SPREADSHEET)
        .await
        .unwrap();
    assert_eq!(metadata.title, "Commandes Janvier");
    assert_eq!(metadata.sheets, vec!["Commandes", "Archive"]);
}

#[tokio::test]
async fn test_permission_error_names_the_fix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "The caller does not have permission" }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .spreadsheet_metadata(SPREADSHEET)
        .await
        .unwrap_err();
    let SheetsError::AccessDenied { ref message, .. } = err else {
        panic!("expected AccessDenied, got {err:?}");
    };
    assert_eq!(message, "The caller does not have permission");
    assert!(err.suggestions()[0].starts_with("Share the spreadsheet"));
}

#[tokio::test]
async fn test_unknown_tab_is_a_range_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1/values/%27Feuille%202%27"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "Unable to parse range: 'Feuille 2'" }
        })))
        .mount(&server)
        .await;

    let range = range::whole_sheet("Feuille 2").unwrap();
    let err = client(&server)
        .await
        .get_values(SPREADSHEET, &range)
        .await
        .unwrap_err();
    assert!(matches!(err, SheetsError::RangeParse { .. }), "{err:?}");
}

#[tokio::test]
async fn test_values_are_padded_and_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WHOLE_TAB))
        .and(query_param("majorDimension", "ROWS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "Commandes!A1:J3",
            "majorDimension": "ROWS",
            "values": [HEADER, CMD_1, ["", "", ""]]
        })))
        .mount(&server)
        .await;

    let mut rows = client(&server)
        .await
        .get_values(SPREADSHEET, &range::whole_sheet("Commandes").unwrap())
        .await
        .unwrap();
    assert!(rows.iter().all(|r| r.len() == HEADER.len()));

    let header = rows.remove(0);
    let context = SheetContext {
        spreadsheet_id: SPREADSHEET,
        sheet_name: "Commandes",
        default_shop: "Boutique principale",
    };
    let outcome = map_rows_to_orders(&header, &rows, &context);
    assert_eq!(outcome.skipped, 1);
    assert!(outcome.rejected.is_empty());

    let details = &outcome.candidates[0].details;
    assert_eq!(details.numero_commande.as_str(), "CMD-1");
    assert_eq!(details.google_sheets_id.as_deref(), Some("sheet-1:Commandes:2"));
    assert_eq!(details.articles[0].name, "Widget");
    assert_eq!(details.articles[0].quantity, 2);
    assert_eq!(details.articles[0].unit_price, Decimal::from_str("9.99").unwrap());
    assert_eq!(details.sheet_status.as_deref(), Some("En attente"));
}

#[tokio::test]
async fn test_batch_update_sends_user_entered_cells() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-1/values:batchUpdate"))
        .and(body_partial_json(json!({
            "valueInputOption": "USER_ENTERED",
            "data": [{ "range": "'Commandes'!J2", "values": [["Attribuée"]] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": "sheet-1",
            "totalUpdatedRows": 1,
            "totalUpdatedCells": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client(&server)
        .await
        .batch_update(
            SPREADSHEET,
            &[CellUpdate {
                range: range::cell("Commandes", 9, 2).unwrap(),
                value: "Attribuée".to_string(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(summary.updated_rows, 1);
    assert_eq!(summary.updated_cells, 1);
}

#[tokio::test]
async fn test_rate_limit_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WHOLE_TAB))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .get_values(SPREADSHEET, &range::whole_sheet("Commandes").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SheetsError::RateLimited));
}
