// Fake catalogue, completion API and storage bucket served from one local axum app.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const GOOD_USER_ID: &str = "77";
pub const GOOD_USER_KEY: &str = "good-key";
pub const GOOD_EMAIL: &str = "reader@example.com";
pub const GOOD_PASSWORD: &str = "secret";

/// What the fake upstream saw.
#[derive(Default)]
pub struct Recorded {
    pub search_bodies: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub completions: Mutex<Vec<Value>>,
    /// Cookie header seen by each file download, keyed by book id.
    pub download_cookies: Mutex<Vec<(String, Option<String>)>>,
}

#[derive(Clone)]
struct FakeState {
    base_url: Arc<String>,
    port: u16,
    recorded: Arc<Recorded>,
}

pub struct FakeUpstream {
    pub addr: SocketAddr,
    pub recorded: Arc<Recorded>,
}

impl FakeUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn completion_url(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    pub fn storage_url(&self) -> String {
        format!("http://{}/storage", self.addr)
    }
}

pub async fn start_fake_upstream() -> FakeUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Arc::new(Recorded::default());

    let state = FakeState {
        base_url: Arc::new(format!("http://{}", addr)),
        port: addr.port(),
        recorded: recorded.clone(),
    };

    let app = Router::new()
        .route("/eapi/user/login", post(login))
        .route("/eapi/user/profile", get(profile))
        .route("/eapi/book/search", post(search))
        .route("/eapi/book/{id}/{hash}/file", get(file_info))
        .route("/dl/{id}", get(download))
        .route("/v1/chat/completions", post(completion))
        .route("/storage/{name}", put(store))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    FakeUpstream { addr, recorded }
}

/// Minimal EPUB whose metadata title is `title`.
pub fn build_epub(title: &str) -> Vec<u8> {
    let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;
    let opf = format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title></metadata>
  <manifest><item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/></manifest>
  <spine toc="ncx"/>
</package>"#,
        title
    );
    let ncx = format!("<ncx><docTitle><text>{}</text></docTitle></ncx>", title);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in [
        ("mimetype", "application/epub+zip".to_string()),
        ("META-INF/container.xml", container.to_string()),
        ("OEBPS/content.opf", opf),
        ("OEBPS/toc.ncx", ncx),
    ] {
        zip.start_file(name, stored).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn cookie_is_valid(headers: &HeaderMap) -> bool {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    cookie.contains(&format!("remix_userid={}", GOOD_USER_ID))
        && cookie.contains(&format!("remix_userkey={}", GOOD_USER_KEY))
}

async fn login(body: String) -> Json<Value> {
    let email = format!("email={}", GOOD_EMAIL.replace('@', "%40"));
    let password = format!("password={}", GOOD_PASSWORD);
    if body.contains(&email) && body.contains(&password) {
        Json(json!({
            "success": 1,
            "user": { "id": 77, "remix_userkey": GOOD_USER_KEY },
        }))
    } else {
        Json(json!({ "success": 0, "error": "Incorrect email or password" }))
    }
}

async fn profile(headers: HeaderMap) -> Response {
    if cookie_is_valid(&headers) {
        Json(json!({ "success": 1, "user": { "id": 77 } })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "success": 0 }))).into_response()
    }
}

/// "Dune" has an epub edition, "Rare Book" only a pdf one, "Odd Book" a record
/// with null fields, anything else has nothing.
async fn search(State(state): State<FakeState>, headers: HeaderMap, body: String) -> Response {
    if !cookie_is_valid(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.recorded.search_bodies.lock().push(body.clone());

    let wants_epub = body.contains("extensions%5B%5D=epub");
    let wants_pdf = body.contains("extensions%5B%5D=pdf");
    let filtered = wants_epub || wants_pdf;

    let books = if body.contains("message=Dune") && (!filtered || wants_epub) {
        json!([
            { "id": 1, "hash": "abc", "title": "Dune", "extension": "epub", "author": "Frank Herbert" },
            { "id": 2, "hash": "def", "title": "Dune Messiah", "extension": "epub" },
        ])
    } else if body.contains("message=Rare+Book") && (!filtered || wants_pdf) {
        json!([{ "id": 5, "hash": "pdf5", "title": "Rare Book", "extension": "pdf" }])
    } else if body.contains("message=Odd+Book") && !filtered {
        json!([{ "id": 9, "hash": "odd", "title": null, "extension": null, "year": 1965 }])
    } else {
        json!([])
    };

    Json(json!({ "success": 1, "books": books })).into_response()
}

async fn file_info(
    State(state): State<FakeState>,
    Path((id, hash)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !cookie_is_valid(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let (description, extension) = match (id.as_str(), hash.as_str()) {
        ("1", "abc") => ("Dune", "epub"),
        ("2", "def") => ("Dune Messiah", "epub"),
        ("5", "pdf5") => ("Rare Book", "pdf"),
        ("6", "mirror") => ("Mirrored", "pdf"),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    // Book 6 lives on another host name for the same server.
    let download_link = if id == "6" {
        format!("http://localhost:{}/dl/{}", state.port, id)
    } else {
        format!("{}/dl/{}", state.base_url, id)
    };

    Json(json!({
        "success": 1,
        "file": {
            "description": description,
            "author": "Frank Herbert",
            "extension": extension,
            "downloadLink": download_link,
        }
    }))
    .into_response()
}

async fn download(
    State(state): State<FakeState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .recorded
        .download_cookies
        .lock()
        .push((id.clone(), cookie));

    match id.as_str() {
        "1" => build_epub("dune (retail)").into_response(),
        "2" => build_epub("dune messiah").into_response(),
        "5" | "6" => b"%PDF-1.7 rare".to_vec().into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn completion(State(state): State<FakeState>, Json(body): Json<Value>) -> Json<Value> {
    state.recorded.completions.lock().push(body);
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": "  Dune \n" } }]
    }))
}

async fn store(
    State(state): State<FakeState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state
        .recorded
        .uploads
        .lock()
        .push((name, content_type, body.to_vec()));
    StatusCode::CREATED
}
