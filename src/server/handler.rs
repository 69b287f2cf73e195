// Axum request handlers — validate, resolve the catalogue session, dispatch to the downloader.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use super::validate::{field_str, flag_on, parse_body, require_fields, RequestValidator};
use crate::config::GatewayConfig;
use crate::engine::credentials::Credentials;
use crate::engine::downloader::{BookDownloader, BookQuery, DeliveredBook};
use crate::engine::normalizer::TitleNormalizer;
use crate::engine::session::SessionManager;
use crate::error::Error;

type HandlerResult = std::result::Result<Response, Error>;

/// Everything a request needs, shared across handlers.
pub struct AppState {
    pub validator: RequestValidator,
    pub session: SessionManager,
    pub downloader: BookDownloader,
    pub normalizer: TitleNormalizer,
}

impl AppState {
    pub fn new(
        config: &GatewayConfig,
        session: SessionManager,
        downloader: BookDownloader,
        normalizer: TitleNormalizer,
    ) -> Self {
        Self {
            validator: RequestValidator::from_config(config),
            session,
            downloader,
            normalizer,
        }
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/books", post(books_handler))
        .route("/books-list", post(books_list_handler))
        .route("/books-download", post(books_download_handler))
        .route("/credentials", post(credentials_handler))
        .route("/auth-check", get(auth_check_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct GatewayServer {
    port: u16,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl GatewayServer {
    /// Bind `addr` and serve in the background, returning a handle.
    pub async fn start(state: SharedState, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = router(state);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        info!("gateway listening on port {}", port);
        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Build `Content-Disposition`, adding an RFC 5987 `filename*` for non-ASCII names.
fn content_disposition(filename: &str) -> HeaderValue {
    let value = if filename.is_ascii() {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        let fallback: String = filename.chars().filter(char::is_ascii).collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn file_response(book: DeliveredBook) -> Response {
    let content_type = HeaderValue::from_str(&book.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition(&book.filename)),
        ],
        book.bytes,
    )
        .into_response()
}

/// Request fields shared by `/books` and `/books-list`, with optional title correction.
async fn book_query(state: &AppState, body: &serde_json::Value) -> BookQuery {
    let mut title = field_str(body, "title").unwrap_or_default();
    if flag_on(body, "titlefix") {
        title = state.normalizer.normalize(&title).await;
    }
    BookQuery {
        title,
        lang: field_str(body, "lang").unwrap_or_default(),
        format: field_str(body, "format"),
    }
}

/// POST /books: search by title and return the first match as a file.
async fn books_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    state.validator.authorize(&headers)?;
    let client = state.session.client()?;

    let body = parse_body(&body)?;
    require_fields(&body, &["title", "lang", "format"])?;
    let query = book_query(&state, &body).await;
    debug!("POST /books query={:?}", query);

    let book = state
        .downloader
        .download_by_title(client.as_ref(), &query)
        .await
        .map_err(|e| e.context(format!("Error downloading book '{}'", query.title)))?;

    Ok(file_response(book))
}

/// POST /books-list: search by title and return every match as JSON.
async fn books_list_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    state.validator.authorize(&headers)?;
    let client = state.session.client()?;

    let body = parse_body(&body)?;
    require_fields(&body, &["title", "lang"])?;
    let query = book_query(&state, &body).await;
    debug!("POST /books-list query={:?}", query);

    let books = state
        .downloader
        .list_books(client.as_ref(), &query)
        .await
        .map_err(|e| e.context(format!("Error searching books '{}'", query.title)))?;

    Ok(Json(books).into_response())
}

/// POST /books-download: fetch a known id/hash pair and return it as a file.
async fn books_download_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    state.validator.authorize(&headers)?;
    let client = state.session.client()?;

    let body = parse_body(&body)?;
    require_fields(&body, &["id", "hash", "title", "format"])?;
    let id = field_str(&body, "id").unwrap_or_default();
    let hash = field_str(&body, "hash").unwrap_or_default();
    let title = field_str(&body, "title").unwrap_or_default();
    let format = field_str(&body, "format").unwrap_or_default();
    debug!("POST /books-download id={} title={:?}", id, title);

    let book = state
        .downloader
        .download_by_id(client.as_ref(), &id, &hash, &title, &format)
        .await
        .map_err(|e| e.context(format!("Error downloading book '{}'", title)))?;

    Ok(file_response(book))
}

/// POST /credentials: verify and store a new credential pair.
async fn credentials_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> HandlerResult {
    state.validator.authorize(&headers)?;

    let body = parse_body(&body)?;
    let mode = state.session.store().mode();
    let [first, second] = mode.field_names();
    require_fields(&body, &[first, second])?;

    let credentials = Credentials::from_pair(
        mode,
        field_str(&body, first).unwrap_or_default(),
        field_str(&body, second).unwrap_or_default(),
    );
    state
        .session
        .reload(credentials)
        .await
        .map_err(|e| e.context("Error updating credentials"))?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Credentials updated successfully and login verified" })),
    )
        .into_response())
}

/// GET /auth-check: confirm the API key without touching the catalogue.
async fn auth_check_handler(State(state): State<SharedState>, headers: HeaderMap) -> HandlerResult {
    state.validator.authorize(&headers)?;
    Ok((StatusCode::OK, Json(json!({ "message": "API key is valid" }))).into_response())
}
