#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use xlbridge::app::{self, AppState};
use xlbridge::config::AppConfig;
use xlbridge::db::{
    Connection, ConnectionFactory, ConnectionTarget, DbError, RecordSet, SqlValue,
};

/// Builds a client payload. `sheets` pairs a sheet name with its value grid.
pub fn payload(active: usize, selection: Option<&str>, sheets: &[(&str, Value)]) -> Vec<u8> {
    let sheets: Vec<Value> = sheets
        .iter()
        .map(|(name, values)| {
            json!({ "name": name, "values": values, "pictures": [], "tables": [] })
        })
        .collect();
    serde_json::to_vec(&json!({
        "client": "Office.js",
        "version": "0.30.0",
        "book": { "name": "Ledger.xlsx", "active_sheet_index": active, "selection": selection },
        "names": [],
        "sheets": sheets,
    }))
    .unwrap()
}

/// Statements seen by a [`StubFactory`]'s connections.
pub type StatementLog = Arc<Mutex<Vec<(String, Vec<SqlValue>)>>>;

/// Connection factory that answers every query with the same record set.
#[derive(Clone, Default)]
pub struct StubFactory {
    pub records: RecordSet,
    pub log: StatementLog,
    pub targets: Arc<Mutex<Vec<ConnectionTarget>>>,
}

impl StubFactory {
    pub fn returning(records: RecordSet) -> Self {
        StubFactory {
            records,
            ..Default::default()
        }
    }

    pub fn statements(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.log.lock().unwrap().clone()
    }
}

struct StubConnection {
    records: RecordSet,
    log: StatementLog,
}

impl ConnectionFactory for StubFactory {
    fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn Connection>, DbError> {
        self.targets.lock().unwrap().push(target.clone());
        Ok(Box::new(StubConnection {
            records: self.records.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

impl Connection for StubConnection {
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RecordSet, DbError> {
        self.log.lock().unwrap().push((sql.to_string(), params.to_vec()));
        Ok(self.records.clone())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize, DbError> {
        self.log.lock().unwrap().push((sql.to_string(), params.to_vec()));
        Ok(0)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.log.lock().unwrap().push((sql.to_string(), Vec::new()));
        Ok(())
    }
}

pub fn config_with(extra: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("SQL_DATABASE".into(), "/nonexistent/ledger.db".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap()
}

pub fn router_with(factory: Arc<dyn ConnectionFactory>, config: AppConfig) -> Router {
    let state = AppState::new(config, factory).unwrap();
    app::router(Arc::new(state))
}

pub async fn post(app: Router, path: &str, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
    post_with_headers(app, path, body, &[]).await
}

pub async fn post_with_headers(
    app: Router,
    path: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    let response = app.oneshot(builder.body(Body::from(body)).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

/// `setValues` / `clearContents` / `setRangeColor` actions from a response body.
pub fn actions(body: &[u8]) -> Vec<Value> {
    let json: Value = serde_json::from_slice(body).unwrap();
    json["actions"].as_array().cloned().unwrap_or_default()
}
