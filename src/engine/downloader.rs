// Book search/download orchestration — format fallback, local write, metadata fix, upload, cleanup.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::filename::{sanitize_extension, sanitize_filename};
use super::upload::StorageUploader;
use crate::config::{GatewayConfig, FALLBACK_EXTENSION};
use crate::detect::container::{detect_container, ContainerFormat};
use crate::detect::epub::rewrite_epub_title;
use crate::error::{Error, Result};
use crate::source::traits::{BookResult, DownloadedFile, LibraryClient, SearchRequest};

/// What the caller asked for. `format` is a preference, not a filter.
#[derive(Debug, Clone)]
pub struct BookQuery {
    pub title: String,
    pub lang: String,
    pub format: Option<String>,
}

/// A file ready to send back to the caller.
#[derive(Debug, Clone)]
pub struct DeliveredBook {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

pub struct BookDownloader {
    download_dir: PathBuf,
    keep_books: bool,
    fix_epub_title: bool,
    uploader: Option<StorageUploader>,
}

impl BookDownloader {
    pub fn new(download_dir: impl Into<PathBuf>, keep_books: bool) -> Self {
        Self {
            download_dir: download_dir.into(),
            keep_books,
            fix_epub_title: true,
            uploader: None,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let uploader = match config.storage_base() {
            Some(base) => Some(StorageUploader::new(base, config.upstream_timeout())?),
            None => None,
        };
        Ok(Self {
            download_dir: config.download_dir.clone(),
            keep_books: config.keep_books,
            fix_epub_title: config.fix_epub_title,
            uploader,
        })
    }

    pub fn with_uploader(mut self, uploader: StorageUploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_epub_title_fix(mut self, enabled: bool) -> Self {
        self.fix_epub_title = enabled;
        self
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Search with the format filter, then without it. Errors with NotFound when both are empty.
    pub async fn list_books(
        &self,
        client: &dyn LibraryClient,
        query: &BookQuery,
    ) -> Result<Vec<BookResult>> {
        let unfiltered = SearchRequest::new(query.title.as_str()).language(query.lang.as_str());

        if let Some(format) = query.format.as_deref().filter(|f| !f.is_empty()) {
            let filtered = unfiltered.clone().extension(format);
            let books = client.search(&filtered).await?;
            if !books.is_empty() {
                return Ok(books);
            }
            debug!(
                "no {} results for {:?}, retrying without format filter",
                format, query.title
            );
        }

        let books = client.search(&unfiltered).await?;
        if books.is_empty() {
            return Err(Error::NotFound(format!(
                "No books found for title '{}' in language '{}'",
                query.title, query.lang
            )));
        }
        Ok(books)
    }

    /// First hit of [`list_books`](Self::list_books), in catalogue order.
    pub async fn search_books(
        &self,
        client: &dyn LibraryClient,
        query: &BookQuery,
    ) -> Result<BookResult> {
        let mut books = self.list_books(client, query).await?;
        Ok(books.swap_remove(0))
    }

    /// Resolve `query` by search and deliver the first hit.
    ///
    /// The file is named after the requested title; the EPUB metadata gets the resolved one.
    pub async fn download_by_title(
        &self,
        client: &dyn LibraryClient,
        query: &BookQuery,
    ) -> Result<DeliveredBook> {
        let book = self.search_books(client, query).await?;
        info!(
            "resolved {:?} to id={} title={:?} extension={:?}",
            query.title,
            book.id(),
            book.title(),
            book.extension()
        );

        let file = client.download_book(&book).await?;
        let extension = pick_extension(book.extension(), query.format.as_deref(), &file);
        let metadata_title = if book.title().trim().is_empty() {
            query.title.as_str()
        } else {
            book.title()
        };

        self.deliver(file, &query.title, &extension, metadata_title)
            .await
    }

    /// Deliver a book addressed directly by catalogue id and hash.
    pub async fn download_by_id(
        &self,
        client: &dyn LibraryClient,
        id: &str,
        hash: &str,
        title: &str,
        format: &str,
    ) -> Result<DeliveredBook> {
        let file = client.download_by_id_and_hash(id, hash).await?;
        let extension = pick_extension(None, Some(format), &file);
        self.deliver(file, title, &extension, title).await
    }

    async fn deliver(
        &self,
        file: DownloadedFile,
        filename_title: &str,
        extension: &str,
        metadata_title: &str,
    ) -> Result<DeliveredBook> {
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let extension = sanitize_extension(extension);
        let filename = sanitize_filename(filename_title, &extension);
        let path = self.download_dir.join(&filename);
        debug!(
            "delivering upstream file {:?} as {}",
            file.filename,
            path.display()
        );

        let mut bytes = file.bytes;
        if self.fix_epub_title && extension == "epub" {
            bytes = fix_epub_title(bytes, metadata_title);
        }

        tokio::fs::write(&path, &bytes).await?;

        if let Some(uploader) = &self.uploader {
            if let Err(e) = uploader.upload(&filename, bytes.clone()).await {
                warn!("upload of {} failed: {:#}", filename, e);
            }
        }

        if !self.keep_books {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("deleted file: {}", path.display()),
                Err(e) => warn!("could not delete file '{}': {}", path.display(), e),
            }
        }

        Ok(DeliveredBook {
            mime_type: format!("application/{}", extension),
            filename,
            bytes,
        })
    }
}

/// Rewrite the EPUB title, keeping the original bytes on any failure.
fn fix_epub_title(bytes: Bytes, title: &str) -> Bytes {
    let format = detect_container(&bytes);
    if format != ContainerFormat::Epub {
        warn!("declared epub but content looks like {:?}, leaving metadata alone", format);
        return bytes;
    }

    match rewrite_epub_title(&bytes, title) {
        Ok(rewritten) => Bytes::from(rewritten),
        Err(e) => {
            warn!("could not rewrite EPUB title to {:?}: {:#}", title, e);
            bytes
        }
    }
}

/// Result extension, else requested format, else the upstream filename's extension.
fn pick_extension(book_ext: Option<&str>, requested: Option<&str>, file: &DownloadedFile) -> String {
    book_ext
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .or_else(|| requested.map(str::trim).filter(|e| !e.is_empty()))
        .or_else(|| file.filename.rsplit_once('.').map(|(_, ext)| ext))
        .unwrap_or(FALLBACK_EXTENSION)
        .to_string()
}
