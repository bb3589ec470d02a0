//! S3-style REST object store over `reqwest`.
//!
//! Speaks the subset of the S3 wire protocol the pipeline needs: `HEAD` on
//! the bucket and on objects, `PUT` with a canned ACL, and `ListObjectsV2`
//! paging. Requests carry a bearer token and are never signed, so an
//! authenticated bucket needs a gateway endpoint that accepts the token (see
//! [`with_endpoint`](HttpObjectStore::with_endpoint)); AWS itself rejects
//! bearer-authenticated requests.

use super::{ObjectStore, StoreError, StoreResult, Visibility, validate_key};
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use reqwest::StatusCode;
use std::sync::LazyLock;
use url::Url;

static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Key>([^<]*)</Key>").expect("static regex"));
static TRUNCATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<IsTruncated>\s*true\s*</IsTruncated>").expect("static regex")
});
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<NextContinuationToken>([^<]*)</NextContinuationToken>")
        .expect("static regex")
});

/// Longest error body kept in [`StoreError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// [`ObjectStore`] backed by an S3-compatible HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    bucket: String,
    endpoint: Url,
    token: String,
}

impl HttpObjectStore {
    /// Virtual-hosted bucket at `https://{bucket}.s3.amazonaws.com/`.
    pub fn new(bucket: impl Into<String>, token: impl Into<String>) -> StoreResult<Self> {
        let bucket = bucket.into();
        let endpoint = format!("https://{}.s3.amazonaws.com/", bucket);
        Self::with_endpoint(bucket, &endpoint, token)
    }

    /// Bucket served from an explicit endpoint (S3-compatible services).
    pub fn with_endpoint(
        bucket: impl Into<String>,
        endpoint: &str,
        token: impl Into<String>,
    ) -> StoreResult<Self> {
        let bucket = bucket.into();
        // Url::join drops the last segment unless the base ends with '/'
        let normalized = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };
        let endpoint = Url::parse(&normalized).map_err(|e| StoreError::Rejected {
            key: bucket.clone(),
            reason: format!("invalid endpoint {:?}: {}", endpoint, e),
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            bucket,
            endpoint,
            token: token.into(),
        })
    }

    fn object_url(&self, key: &str) -> StoreResult<Url> {
        validate_key(key)?;
        self.endpoint
            .join(key)
            .map_err(|_| StoreError::InvalidKey(key.to_string()))
    }

    async fn head(&self, url: Url, key: &str) -> StoreResult<bool> {
        let response = self
            .client
            .head(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(status_error("HEAD", key, status, String::new())),
        }
    }
}

fn status_error(method: &str, key: &str, status: StatusCode, mut body: String) -> StoreError {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    StoreError::Status {
        method: method.to_string(),
        key: key.to_string(),
        status: status.as_u16(),
        body,
    }
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Keys and continuation token from one `ListObjectsV2` page.
pub(crate) fn parse_list_page(xml: &str) -> (Vec<String>, Option<String>) {
    let keys = KEY_RE
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str()))
        .collect();

    let next = if TRUNCATED_RE.is_match(xml) {
        TOKEN_RE
            .captures(xml)
            .and_then(|c| c.get(1))
            .map(|m| unescape_xml(m.as_str()))
    } else {
        None
    };

    (keys, next)
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn container_name(&self) -> &str {
        &self.bucket
    }

    async fn container_exists(&self) -> StoreResult<bool> {
        self.head(self.endpoint.clone(), &self.bucket).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let url = self.object_url(key)?;
        self.head(url, key).await
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        visibility: Visibility,
    ) -> StoreResult<()> {
        let url = self.object_url(key)?;
        let acl = match visibility {
            Visibility::PublicRead => "public-read",
            Visibility::Private => "private",
        };

        log::debug!("PUT {} ({} bytes, {})", url, body.len(), acl);
        let response = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-amz-acl", acl)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(status_error("PUT", key, status, text))
        }
    }

    async fn list_keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut url = self.endpoint.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("list-type", "2");
                if let Some(token) = &continuation {
                    query.append_pair("continuation-token", token);
                }
            }

            let response = self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(status_error("GET", &self.bucket, status, text));
            }

            let (page, next) = parse_list_page(&text);
            keys.extend(page);
            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }

    fn public_url(&self, key: &str) -> String {
        self.endpoint
            .join(key)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{}", self.endpoint, key))
    }
}
