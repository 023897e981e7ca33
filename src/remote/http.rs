// HTTP implementation of the remote contract.
// Directory GETs answer with a JSON entry array, file GETs with raw bytes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, ETAG, HeaderMap, HeaderValue, LAST_MODIFIED, USER_AGENT},
};

use crate::error::{CanopyError, Result};

use super::{RemoteClient, RemoteEntry, RemoteFile};

/// Remote client speaking plain HTTP to a listing/read server.
pub struct HttpRemoteClient {
    client: Client,
    base_url: String,
}

impl HttpRemoteClient {
    /// Create a client for the given base URL (no trailing slash).
    pub fn new(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("canopy"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(CanopyError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(CanopyError::Http)?;
        self.check_response(path, response).await
    }

    /// Map response status to error variants.
    async fn check_response(&self, path: &str, response: Response) -> Result<Response> {
        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::NOT_FOUND => Err(CanopyError::NotFound(path.to_string())),
            status => Err(CanopyError::Remote {
                path: path.to_string(),
                message: format!(
                    "HTTP {}: {}",
                    status,
                    response.text().await.unwrap_or_default()
                ),
            }),
        }
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn header_date(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let response = self.get(path).await?;
        let entries: Vec<RemoteEntry> = response.json().await.map_err(CanopyError::Http)?;
        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<RemoteFile> {
        let response = self.get(path).await?;
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(CanopyError::Http)?;

        Ok(RemoteFile {
            bytes: bytes.to_vec(),
            etag: header_str(&headers, ETAG),
            content_type: header_str(&headers, CONTENT_TYPE),
            modified: header_date(&headers),
        })
    }
}
