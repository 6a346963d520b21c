mod common;

use axum::Json;
use axum::http::StatusCode;
use axum::routing::get;
use common::{StubFactory, actions, config_with, payload, post, post_with_headers, router_with};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use xlbridge::db::{RecordSet, SqlValue};

fn journal_rows() -> RecordSet {
    RecordSet {
        columns: vec!["JournalLineID".into(), "JournalDate".into(), "Amount".into()],
        rows: vec![
            vec![SqlValue::Integer(1), SqlValue::from("2023-12-01"), SqlValue::Real(10.0)],
            vec![SqlValue::Integer(2), SqlValue::from("2023-12-15"), SqlValue::Real(-4.5)],
            vec![SqlValue::Integer(3), SqlValue::from("2024-01-01"), SqlValue::Null],
        ],
    }
}

fn ledger_settings() -> Value {
    json!([
        ["DatabaseSchema", "xero_jointfinances"],
        ["DatabaseVW_TB_Journals", "vw_accounts"],
        ["DatabaseVW_TB_Offsets", "vw_offsets"],
        ["DatabaseTB_Mapping", "journal_mapping"],
        ["TB_Date", "2024-01-01"],
        ["FivetranConnectorID", "idle_connector"],
        ["FivetranAPIKey", "key:secret"]
    ])
}

fn ledger_payload(active: usize, selection: Option<&str>) -> Vec<u8> {
    payload(
        active,
        selection,
        &[
            ("Settings", ledger_settings()),
            (
                "data",
                json!([["stale", "stale", "stale", "stale"], ["stale", "", "", ""]]),
            ),
            ("data_offset", json!([])),
            (
                "Accounts",
                json!([
                    ["AccountID", "200"],
                    ["Anchor", "A8"],
                    ["", ""],
                    ["", ""],
                    ["", ""],
                    ["", ""],
                    ["", ""],
                    ["old", "old"]
                ]),
            ),
        ],
    )
}

fn stub_app(records: RecordSet) -> (axum::Router, StubFactory) {
    let factory = StubFactory::returning(records);
    let app = router_with(Arc::new(factory.clone()), config_with(&[]));
    (app, factory)
}

fn text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

#[tokio::test]
async fn journals_replace_data_sheet() {
    let (app, factory) = stub_app(journal_rows());

    let (status, body) = post(app, "/journals", ledger_payload(0, None)).await;

    assert_eq!(status, StatusCode::OK, "{}", text(&body));
    let actions = actions(&body);
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0]["func"], "clearContents");
    assert_eq!(actions[0]["sheet_position"], 1);
    assert_eq!(actions[0]["row_count"], 2);
    assert_eq!(actions[0]["column_count"], 4);

    assert_eq!(actions[1]["func"], "setValues");
    assert_eq!(actions[1]["sheet_position"], 1);
    assert_eq!((actions[1]["start_row"].clone(), actions[1]["start_column"].clone()), (json!(0), json!(0)));
    assert_eq!(
        actions[1]["values"],
        json!([
            ["JournalLineID", "JournalDate", "Amount"],
            [1.0, "2023-12-01", 10.0],
            [2.0, "2023-12-15", -4.5],
            [3.0, "2024-01-01", ""]
        ])
    );

    let statements = factory.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].0.starts_with(
        "SELECT * FROM \"xero_jointfinances\".\"vw_accounts\" WHERE date(\"JournalDate\") <= ?1"
    ));
    assert_eq!(statements[0].1, vec![SqlValue::from("2024-01-01")]);
    assert_eq!(factory.targets.lock().unwrap()[0].schema, "xero_jointfinances");
}

#[tokio::test]
async fn empty_result_leaves_data_sheet_cleared() {
    let (app, _) = stub_app(RecordSet::default());

    let (status, body) = post(app, "/journals", ledger_payload(0, None)).await;

    assert_eq!(status, StatusCode::OK);
    let actions = actions(&body);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["func"], "clearContents");
}

#[tokio::test]
async fn offsets_go_to_offset_sheet() {
    let (app, factory) = stub_app(journal_rows());

    let (status, body) = post(app, "/journals/offset", ledger_payload(0, None)).await;

    assert_eq!(status, StatusCode::OK);
    let actions = actions(&body);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["func"], "setValues");
    assert_eq!(actions[0]["sheet_position"], 2);
    assert!(factory.statements()[0].0.contains("\"vw_offsets\""));
}

#[tokio::test]
async fn sheet_journals_use_account_and_anchor() {
    let (app, factory) = stub_app(journal_rows());

    let (status, body) = post(app, "/journals/sheet", ledger_payload(3, None)).await;

    assert_eq!(status, StatusCode::OK, "{}", text(&body));
    let actions = actions(&body);
    assert_eq!(actions[0]["func"], "clearContents");
    assert_eq!(actions[0]["start_row"], 7);
    assert_eq!(actions[1]["func"], "setValues");
    assert_eq!(actions[1]["sheet_position"], 3);
    assert_eq!(actions[1]["start_row"], 7);

    let (sql, params) = &factory.statements()[0];
    assert!(sql.contains("AND \"AccountID\" = ?2"));
    assert_eq!(params[1], SqlValue::from("200"));
}

#[tokio::test]
async fn settings_route_returns_pairs() {
    let (app, _) = stub_app(RecordSet::default());

    let (status, body) = post(app, "/settings", ledger_payload(0, None)).await;

    assert_eq!(status, StatusCode::OK);
    let settings: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(settings["DatabaseSchema"], "xero_jointfinances");
    assert_eq!(settings["TB_Date"], "2024-01-01");
    assert_eq!(settings.as_object().unwrap().len(), 7);
}

#[tokio::test]
async fn sheet_settings_route_reads_active_sheet() {
    let (app, _) = stub_app(RecordSet::default());

    let (status, body) = post(app, "/settings/sheet", ledger_payload(3, None)).await;

    assert_eq!(status, StatusCode::OK);
    let settings: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(settings, json!({ "AccountID": "200", "Anchor": "A8" }));
}

#[tokio::test]
async fn missing_settings_sheet_is_a_plain_500() {
    let (app, factory) = stub_app(journal_rows());
    let body = payload(0, None, &[("data", json!([]))]);

    let (status, body) = post(app, "/journals", body).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(&body).contains("Settings"));
    assert!(factory.statements().is_empty());
}

#[tokio::test]
async fn missing_setting_names_the_key() {
    let (app, _) = stub_app(journal_rows());
    let body = payload(
        0,
        None,
        &[
            ("Settings", json!([["DatabaseSchema", "ledger"], ["DatabaseVW_TB_Journals", "vw"]])),
            ("data", json!([])),
        ],
    );

    let (status, body) = post(app, "/journals", body).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(&body).contains("TB_Date"));
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let (app, _) = stub_app(RecordSet::default());
    let (status, _) = post(app, "/hello", b"{not json".to_vec()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn large_workbooks_are_accepted() {
    let (app, _) = stub_app(RecordSet::default());
    let rows: Vec<Value> = (0..60_000)
        .map(|i| json!([i, "2024-01-01", "Opening balance brought forward", 125.5]))
        .collect();
    let body = payload(0, None, &[("Sheet1", json!([])), ("data", Value::Array(rows))]);
    assert!(body.len() > 3 * 1024 * 1024, "payload is {} bytes", body.len());

    let (status, body) = post(app, "/hello", body).await;

    assert_eq!(status, StatusCode::OK, "{}", text(&body));
    assert_eq!(actions(&body)[0]["values"], json!([["Hello xlwings!"]]));
}

#[tokio::test]
async fn hello_toggles_greeting() {
    let (app, _) = stub_app(RecordSet::default());
    let (_, body) = post(app, "/hello", payload(0, None, &[("Sheet1", json!([]))])).await;
    assert_eq!(actions(&body)[0]["values"], json!([["Hello xlwings!"]]));

    let (app, _) = stub_app(RecordSet::default());
    let (_, body) = post(
        app,
        "/hello",
        payload(0, None, &[("Sheet1", json!([["Hello xlwings!"]]))]),
    )
    .await;
    assert_eq!(actions(&body)[0]["values"], json!([["Bye xlwings!"]]));
}

#[tokio::test]
async fn yellow_colors_selection() {
    let (app, _) = stub_app(RecordSet::default());

    let (status, body) = post(app, "/yellow", ledger_payload(1, Some("B2:C3"))).await;

    assert_eq!(status, StatusCode::OK);
    let actions = actions(&body);
    assert_eq!(actions[0]["func"], "setRangeColor");
    assert_eq!(actions[0]["args"], json!(["#FFFF00"]));
    assert_eq!(actions[0]["sheet_position"], 1);
    assert_eq!(actions[0]["start_row"], 1);
    assert_eq!(actions[0]["column_count"], 2);
}

#[tokio::test]
async fn yellow_without_selection_does_nothing() {
    let (app, _) = stub_app(RecordSet::default());
    let (status, body) = post(app, "/yellow", ledger_payload(1, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(actions(&body).is_empty());
}

#[tokio::test]
async fn clear_wipes_block_on_active_sheet() {
    let (app, _) = stub_app(RecordSet::default());

    let (_, body) = post(app, "/clear", ledger_payload(3, None)).await;

    let actions = actions(&body);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["func"], "clearContents");
    assert_eq!(actions[0]["sheet_position"], 3);
    assert_eq!(actions[0]["start_row"], 4);
    assert_eq!(actions[0]["row_count"], 996);
    assert_eq!(actions[0]["column_count"], 26);
}

#[tokio::test]
async fn mapping_upsert_runs_in_one_transaction() {
    let (app, factory) = stub_app(RecordSet::default());
    let body = payload(
        1,
        None,
        &[
            ("Settings", ledger_settings()),
            (
                "Mapping",
                json!([
                    ["", "", ""],
                    ["", "", ""],
                    ["", "", ""],
                    ["", "", ""],
                    ["JournalLineID", "Mapping", "Offset"],
                    [1001, "Revenue", ""],
                    [1002, "", ""],
                    [1003, "Costs", "yes"]
                ]),
            ),
        ],
    );

    let (status, body) = post(app, "/mapping/upsert", body).await;

    assert_eq!(status, StatusCode::OK, "{}", text(&body));
    let statements: Vec<String> = factory.statements().into_iter().map(|(sql, _)| sql).collect();
    assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
    // stub reports no matches, so every row is an UPDATE followed by an INSERT
    assert_eq!(statements.len(), 2 + 2 * 2);
    assert!(statements[1].starts_with("UPDATE \"xero_jointfinances\".\"journal_mapping\""));
    assert!(statements[2].starts_with("INSERT INTO \"xero_jointfinances\".\"journal_mapping\""));
}

#[tokio::test]
async fn upload_without_data_reports_it() {
    let (app, factory) = stub_app(RecordSet::default());
    let body = payload(0, None, &[("Sheet1", json!([["Account", "Balance"]]))]);

    let (status, body) = post(app, "/upload_data", body).await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["message"], "No data found in the sheet to upload");
    assert!(factory.statements().is_empty());
}

#[tokio::test]
async fn upload_replaces_configured_table() {
    let (app, factory) = stub_app(RecordSet::default());
    let body = payload(
        0,
        None,
        &[("Sheet1", json!([["Account", "Balance"], ["Cash", 10], ["Bank", 20]]))],
    );

    let (status, body) = post(app, "/upload_data", body).await;

    assert_eq!(status, StatusCode::OK, "{}", text(&body));
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, json!({ "message": "Data uploaded successfully!", "rows": 2 }));
    let statements = factory.statements();
    assert!(statements[1].0.contains("CREATE TABLE \"main\".\"sheet_upload\""));
}

#[tokio::test]
async fn secret_key_guards_every_route() {
    let factory = StubFactory::default();
    let config = config_with(&[("XLWINGS_SECRET_KEY", "s3cret")]);
    let app = router_with(Arc::new(factory), config);
    let body = payload(0, None, &[("Sheet1", json!([]))]);

    let (status, _) = post(app.clone(), "/hello", body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        post_with_headers(app.clone(), "/hello", body.clone(), &[("authorization", "wrong")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        post_with_headers(app, "/hello", body, &[("authorization", "s3cret")]).await;
    assert_eq!(status, StatusCode::OK);
}

async fn connector_stub() -> String {
    let app = axum::Router::new().route(
        "/v1/connectors/:id",
        get(|| async {
            Json(json!({
                "code": "Success",
                "data": { "status": { "sync_state": "scheduled" } }
            }))
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn connector_status_lands_in_settings_sheet() {
    let base_url = connector_stub().await;
    let config = config_with(&[("CONNECTOR_BASE_URL", base_url.as_str())]);
    let app = router_with(Arc::new(StubFactory::default()), config);

    let (status, body) = post(app, "/connector/status", ledger_payload(0, None)).await;

    assert_eq!(status, StatusCode::OK, "{}", text(&body));
    let actions = actions(&body);
    assert_eq!(actions[0]["func"], "setValues");
    assert_eq!(actions[0]["sheet_position"], 0);
    assert_eq!((actions[0]["start_row"].clone(), actions[0]["start_column"].clone()), (json!(1), json!(3)));
    assert_eq!(actions[0]["values"], json!([["Not Syncing"]]));
}

#[tokio::test]
async fn connector_failure_is_a_json_500() {
    let config = config_with(&[("CONNECTOR_BASE_URL", "http://127.0.0.1:1")]);
    let app = router_with(Arc::new(StubFactory::default()), config);

    let (status, body) = post(app, "/connector/sync", ledger_payload(0, None)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("connector request failed"));
}
