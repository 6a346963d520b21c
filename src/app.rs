use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::Method,
    routing::post,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::connector::{self, ConnectorClient, SyncState};
use crate::db::{Connection, ConnectionFactory, ConnectionTarget, SqliteFactory, TableName};
use crate::error::AppError;
use crate::journals::{self, JournalQuery};
use crate::session::BookSession;
use crate::settings::{self, Settings};
use crate::upload;
use crate::upsert;
use crate::workbook::{Book, Range};

pub const DATA_SHEET: &str = "data";
pub const OFFSET_SHEET: &str = "data_offset";
/// Where sheet-scoped tables start when the sheet doesn't name an `Anchor`.
pub const DEFAULT_ANCHOR: &str = "A5";
/// Block wiped by `/clear` on the active sheet.
pub const CLEAR_BLOCK: &str = "A5:Z1000";
pub const HIGHLIGHT: &str = "#FFFF00";
const GREETING: &str = "Hello xlwings!";
const FAREWELL: &str = "Bye xlwings!";

/// Shared, read-only per-process state. Nothing in here changes after startup.
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<dyn ConnectionFactory>,
    pub connector: ConnectorClient,
}

impl AppState {
    pub fn new(config: AppConfig, db: Arc<dyn ConnectionFactory>) -> Result<Self, AppError> {
        let connector = ConnectorClient::new(&config.connector)?;
        Ok(AppState {
            config,
            db,
            connector,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // Office Scripts and custom functions in Excel on the web require CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/hello", post(hello))
        .route("/settings", post(read_book_settings))
        .route("/settings/sheet", post(read_sheet_settings))
        .route("/journals", post(fetch_journals))
        .route("/journals/sheet", post(fetch_sheet_journals))
        .route("/journals/offset", post(fetch_offset_journals))
        .route("/mapping/upsert", post(upsert_mapping))
        .route("/yellow", post(yellow))
        .route("/upload_data", post(upload_data))
        .route("/connector/sync", post(trigger_connector_sync))
        .route("/connector/status", post(connector_status))
        .route("/clear", post(clear_data))
        // The client posts the used range of every sheet, so bodies grow with the book
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .with_state(state)
}

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, Arc::new(SqliteFactory))?);
    let app = router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    log::info!("listening on http://{bind_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Opens a connection for `schema` and runs `work` on the blocking pool.
async fn with_connection<T, E, F>(state: &AppState, schema: &str, work: F) -> Result<T, AppError>
where
    F: FnOnce(&mut dyn Connection) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<AppError>,
{
    let target = ConnectionTarget::resolve(&state.config.database, schema)?;
    let factory = Arc::clone(&state.db);
    let result = tokio::task::spawn_blocking(move || -> Result<T, AppError> {
        let mut conn = factory.connect(&target)?;
        work(&mut *conn).map_err(Into::into)
    })
    .await??;
    Ok(result)
}

async fn hello(mut book: BookSession) -> Result<Json<Value>, AppError> {
    let a1 = book.range(book.first_sheet(), "A1")?;
    let next = if book.value(&a1).as_text().as_deref() == Some(GREETING) {
        FAREWELL
    } else {
        GREETING
    };
    book.set_value(&a1, next);
    Ok(Json(book.into_json()))
}

async fn read_book_settings(book: BookSession) -> Result<Json<Settings>, AppError> {
    Ok(Json(settings::book_settings(&book)?))
}

async fn read_sheet_settings(book: BookSession) -> Result<Json<Settings>, AppError> {
    Ok(Json(settings::sheet_settings(&book)?))
}

/// Runs a journal query and writes the rows at `anchor`.
async fn load_view(
    state: &AppState,
    book: &mut Book,
    query: JournalQuery,
    anchor: Range,
) -> Result<(), AppError> {
    let schema = query.view.schema.clone();
    let records = with_connection(state, &schema, move |conn| journals::fetch(conn, &query)).await?;
    journals::write_record_set(book, &anchor, &records);
    Ok(())
}

fn view_query(settings: &Settings, view_key: &str) -> Result<JournalQuery, AppError> {
    let view = TableName::new(
        &settings.text(settings::DATABASE_SCHEMA)?,
        &settings.text(view_key)?,
    )?;
    Ok(JournalQuery::new(view, settings.date(settings::TB_DATE)?))
}

async fn fetch_journals(
    State(state): State<Arc<AppState>>,
    mut book: BookSession,
) -> Result<Json<Value>, AppError> {
    let settings = settings::book_settings(&book)?;
    let query = view_query(&settings, settings::JOURNALS_VIEW)?;
    let anchor = book.range(book.sheet(DATA_SHEET)?, "A1")?;

    log::info!("fetching journals from {} as at {}", query.view, query.as_at);
    load_view(&state, &mut book, query, anchor).await?;
    Ok(Json(book.into_json()))
}

async fn fetch_sheet_journals(
    State(state): State<Arc<AppState>>,
    mut book: BookSession,
) -> Result<Json<Value>, AppError> {
    let settings = settings::book_settings(&book)?;
    let local = settings::sheet_settings(&book)?;
    let account = local.text(settings::ACCOUNT_ID)?;
    let query = view_query(&settings, settings::JOURNALS_VIEW)?.for_account(account.as_str());
    let anchor = book.range(
        book.active_sheet(),
        &local.text_or(settings::ANCHOR, DEFAULT_ANCHOR),
    )?;

    log::info!(
        "fetching journals for account {account} into {}!{}",
        book.sheet_name(anchor.sheet),
        anchor.area
    );
    load_view(&state, &mut book, query, anchor).await?;
    Ok(Json(book.into_json()))
}

async fn fetch_offset_journals(
    State(state): State<Arc<AppState>>,
    mut book: BookSession,
) -> Result<Json<Value>, AppError> {
    let settings = settings::book_settings(&book)?;
    let query = view_query(&settings, settings::OFFSETS_VIEW)?;
    let anchor = book.range(book.sheet(OFFSET_SHEET)?, "A1")?;

    log::info!("fetching offsets from {} as at {}", query.view, query.as_at);
    load_view(&state, &mut book, query, anchor).await?;
    Ok(Json(book.into_json()))
}

async fn upsert_mapping(
    State(state): State<Arc<AppState>>,
    book: BookSession,
) -> Result<Json<Value>, AppError> {
    let settings = settings::book_settings(&book)?;
    let local = settings::sheet_settings(&book)?;
    let table = TableName::new(
        &settings.text(settings::DATABASE_SCHEMA)?,
        &settings.text(settings::MAPPING_TABLE)?,
    )?;
    let anchor = book.range(
        book.active_sheet(),
        &local.text_or(settings::ANCHOR, DEFAULT_ANCHOR),
    )?;
    let block = book.values(&book.expand(&anchor));
    let (rows, skipped) = upsert::collect_rows(&block)?;

    let modified_at = chrono::Utc::now().naive_utc();
    let schema = table.schema.clone();
    let report = with_connection(&state, &schema, move |conn| {
        upsert::upsert(conn, &table, &rows, modified_at)
    })
    .await?;

    log::info!(
        "mapping upsert: {} updated, {} inserted, {skipped} skipped",
        report.updated,
        report.inserted
    );
    Ok(Json(book.into_json()))
}

async fn yellow(mut book: BookSession) -> Result<Json<Value>, AppError> {
    match book.selection() {
        Some(selection) => {
            book.set_color(&selection, HIGHLIGHT);
            log::info!("highlighted {}", selection.area);
        }
        None => log::warn!("no selection to highlight"),
    }
    Ok(Json(book.into_json()))
}

async fn upload_data(
    State(state): State<Arc<AppState>>,
    book: BookSession,
) -> Result<Json<Value>, AppError> {
    let a1 = book.range(book.first_sheet(), "A1")?;
    let block = book.values(&book.expand(&a1));
    if block.len() < 2 || block[0].iter().all(|h| h.is_empty()) {
        return Ok(Json(json!({ "message": "No data found in the sheet to upload" })));
    }

    let table = TableName::parse(&state.config.upload_table)?;
    let schema = table.schema.clone();
    let rows = with_connection(&state, &schema, move |conn| {
        upload::replace_table(conn, &table, &block)
    })
    .await?;

    Ok(Json(json!({ "message": "Data uploaded successfully!", "rows": rows })))
}

fn write_sync_state(book: &mut Book, sync: SyncState) -> Result<(), AppError> {
    let cell = book.range(book.sheet(connector::STATUS_SHEET)?, connector::STATUS_CELL)?;
    book.set_value(&cell, sync.as_str());
    Ok(())
}

fn connector_credentials(book: &Book) -> Result<(String, String), AppError> {
    let settings = settings::book_settings(book)?;
    Ok((
        settings.text(settings::CONNECTOR_ID)?,
        settings.text(settings::CONNECTOR_API_KEY)?,
    ))
}

async fn trigger_connector_sync(
    State(state): State<Arc<AppState>>,
    mut book: BookSession,
) -> Result<Json<Value>, AppError> {
    let (connector_id, credential) = connector_credentials(&book)?;
    let sync = state.connector.trigger_sync(&connector_id, &credential).await?;
    write_sync_state(&mut book, sync)?;
    Ok(Json(book.into_json()))
}

async fn connector_status(
    State(state): State<Arc<AppState>>,
    mut book: BookSession,
) -> Result<Json<Value>, AppError> {
    let (connector_id, credential) = connector_credentials(&book)?;
    let sync = state.connector.status(&connector_id, &credential).await?;
    write_sync_state(&mut book, sync)?;
    Ok(Json(book.into_json()))
}

async fn clear_data(mut book: BookSession) -> Result<Json<Value>, AppError> {
    let block = book.range(book.active_sheet(), CLEAR_BLOCK)?;
    book.clear_contents(&block);
    Ok(Json(book.into_json()))
}
