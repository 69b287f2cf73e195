// Catalogue client over the `eapi` HTTP endpoints — login, search, two-step download.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::traits::{BookResult, DownloadedFile, LibraryClient, LibraryConnector, SearchRequest};
use crate::engine::credentials::Credentials;

const LOGIN_PATH: &str = "/eapi/user/login";
const PROFILE_PATH: &str = "/eapi/user/profile";
const SEARCH_PATH: &str = "/eapi/book/search";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
     image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

#[derive(Debug, Clone)]
struct RemixSession {
    user_id: String,
    user_key: String,
}

pub struct ZLibraryClient {
    client: Client,
    base_url: String,
    session: Option<RemixSession>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    books: Option<Vec<BookResult>>,
}

#[derive(Deserialize)]
struct FileInfoResponse {
    file: FileInfo,
}

#[derive(Deserialize)]
struct FileInfo {
    #[serde(rename = "downloadLink")]
    download_link: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    extension: String,
}

impl ZLibraryClient {
    /// Log in with `credentials`. Rejected credentials give a logged-out client.
    pub async fn login(client: Client, base_url: &str, credentials: &Credentials) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let mut this = Self {
            client,
            base_url,
            session: None,
        };

        this.session = match credentials {
            Credentials::Remix { user_id, user_key } => {
                let candidate = RemixSession {
                    user_id: user_id.clone(),
                    user_key: user_key.clone(),
                };
                if this.check_profile(&candidate).await? {
                    Some(candidate)
                } else {
                    None
                }
            }
            Credentials::Email { email, password } => this.password_login(email, password).await?,
        };

        if this.session.is_some() {
            info!("catalogue login succeeded base={}", this.base_url);
        } else {
            warn!("catalogue login rejected base={}", this.base_url);
        }
        Ok(this)
    }

    fn cookie_header(session: &RemixSession) -> String {
        format!(
            "siteLanguageV2=en; remix_userid={}; remix_userkey={}",
            session.user_id, session.user_key
        )
    }

    /// Attach browser-like headers and, when given, the session cookies.
    fn decorate(&self, req: RequestBuilder, session: Option<&RemixSession>) -> RequestBuilder {
        let mut req = req
            .header("accept", ACCEPT)
            .header("accept-language", "en-US,en;q=0.9")
            .header("user-agent", USER_AGENT);
        if let Some(session) = session {
            req = req.header("cookie", Self::cookie_header(session));
        }
        req
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Resolve a download link, relative links against the catalogue base.
    fn resolve_link(&self, link: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url).context("invalid catalogue base URL")?;
        base.join(link.trim())
            .with_context(|| format!("invalid download link {:?}", link))
    }

    fn is_catalogue_host(&self, url: &Url) -> bool {
        match Url::parse(&self.base_url) {
            Ok(base) => {
                base.scheme() == url.scheme()
                    && base.host_str() == url.host_str()
                    && base.port_or_known_default() == url.port_or_known_default()
            }
            Err(_) => false,
        }
    }

    fn require_session(&self) -> Result<&RemixSession> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("not logged in to the catalogue"))
    }

    async fn check_profile(&self, session: &RemixSession) -> Result<bool> {
        let resp = self
            .decorate(self.client.get(self.url(PROFILE_PATH)), Some(session))
            .send()
            .await
            .context("profile request failed")?;

        let status = resp.status();
        debug!("profile check status={}", status.as_u16());
        if !status.is_success() {
            return Ok(false);
        }

        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok(success_flag(&body))
    }

    async fn password_login(&self, email: &str, password: &str) -> Result<Option<RemixSession>> {
        let resp = self
            .decorate(self.client.post(self.url(LOGIN_PATH)), None)
            .form(&[("email", email), ("password", password)])
            .send()
            .await
            .context("login request failed")?;

        let status = resp.status();
        if !status.is_success() {
            warn!("login failed status={}", status.as_u16());
            return Ok(None);
        }

        let body: Value = resp.json().await.context("invalid login response")?;
        if !success_flag(&body) {
            return Ok(None);
        }

        let user = &body["user"];
        let user_id = match &user["id"] {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return Err(anyhow!("login response missing user id")),
        };
        let user_key = user["remix_userkey"]
            .as_str()
            .ok_or_else(|| anyhow!("login response missing remix_userkey"))?
            .to_string();

        Ok(Some(RemixSession { user_id, user_key }))
    }

    async fn send_checked(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        let resp = req.send().await.with_context(|| format!("{} request failed", what))?;
        let status = resp.status();
        if !status.is_success() {
            warn!("{} failed status={}", what, status.as_u16());
            return Err(anyhow!("{} failed: HTTP {}", what, status.as_u16()));
        }
        Ok(resp)
    }

    async fn fetch_file(&self, id: &str, hash: &str) -> Result<DownloadedFile> {
        let session = self.require_session()?;

        let path = format!("/eapi/book/{}/{}/file", id, hash);
        let resp = self
            .send_checked(
                self.decorate(self.client.get(self.url(&path)), Some(session)),
                "file info",
            )
            .await?;
        let info: FileInfoResponse = resp.json().await.context("invalid file info response")?;
        let info = info.file;

        let mut filename = info.description.trim().to_string();
        if let Some(author) = info.author.as_deref().filter(|a| !a.trim().is_empty()) {
            filename.push_str(&format!(" ({})", author.trim()));
        }
        if !info.extension.is_empty() {
            filename.push('.');
            filename.push_str(&info.extension);
        }

        let link = self.resolve_link(&info.download_link)?;
        // Session cookies only go back to the catalogue itself.
        let cookies = self.is_catalogue_host(&link).then_some(session);
        debug!(
            "downloading id={} link={} cookies={}",
            id,
            link,
            cookies.is_some()
        );
        let resp = self
            .send_checked(
                self.decorate(self.client.get(link), cookies),
                "download",
            )
            .await?;
        let bytes = resp.bytes().await?;

        info!("downloaded id={} bytes={}", id, bytes.len());
        Ok(DownloadedFile { filename, bytes })
    }
}

fn success_flag(body: &Value) -> bool {
    match &body["success"] {
        Value::Number(n) => n.as_i64() == Some(1),
        Value::Bool(b) => *b,
        _ => false,
    }
}

#[async_trait]
impl LibraryClient for ZLibraryClient {
    fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<BookResult>> {
        let session = self.require_session()?;

        let mut form: Vec<(&str, &str)> = vec![("message", request.message.as_str())];
        for lang in &request.languages {
            form.push(("languages[]", lang.as_str()));
        }
        for ext in &request.extensions {
            form.push(("extensions[]", ext.as_str()));
        }

        let resp = self
            .send_checked(
                self.decorate(self.client.post(self.url(SEARCH_PATH)), Some(session))
                    .form(&form),
                "search",
            )
            .await?;
        let parsed: SearchResponse = resp.json().await.context("invalid search response")?;
        let books = parsed.books.unwrap_or_default();

        debug!(
            "search message={:?} languages={:?} extensions={:?} hits={}",
            request.message,
            request.languages,
            request.extensions,
            books.len()
        );
        Ok(books)
    }

    async fn download_book(&self, book: &BookResult) -> Result<DownloadedFile> {
        self.fetch_file(&book.id(), book.hash()).await
    }

    async fn download_by_id_and_hash(&self, id: &str, hash: &str) -> Result<DownloadedFile> {
        self.fetch_file(id, hash).await
    }
}

/// Connects [`ZLibraryClient`]s against a fixed base URL.
pub struct ZLibraryConnector {
    client: Client,
    base_url: String,
}

impl ZLibraryConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl LibraryConnector for ZLibraryConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn LibraryClient>> {
        let client = ZLibraryClient::login(self.client.clone(), &self.base_url, credentials).await?;
        Ok(Arc::new(client))
    }
}
