//! HTTP implementation of the tagline backend contract.
//!
//! Talks JSON to a notes server under `/api/v1/{parent}/tags`. Transport
//! failures map to [`Error::BackendUnavailable`]; non-success statuses map
//! to [`Error::BackendRejected`], carrying the server's `error` message when
//! the body provides one.

use std::collections::HashMap;

use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tagline_core::{Error, TagService};

#[derive(Deserialize)]
struct ListTagsResponse {
    tags: HashMap<String, i64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct RenameRequest<'a> {
    new_name: &'a str,
}

/// Remote tag backend reached over HTTP.
pub struct HttpTagService {
    client: Client,
    base: Url,
}

impl HttpTagService {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Validation(format!("invalid server URL: {}", e)))?;
        Ok(Self::with_client(Client::new(), base))
    }

    /// Use a preconfigured client (timeouts, proxies, auth middleware).
    pub fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    /// `{base}/api/v1/{parent}/tags`
    fn tags_url(&self, parent: &str) -> Result<Url, Error> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Validation("server URL cannot be a base".into()))?;
            segments.pop_if_empty();
            segments.push("api").push("v1");
            for part in parent.split('/') {
                segments.push(part);
            }
            segments.push("tags");
        }
        Ok(url)
    }

    /// `{base}/api/v1/{parent}/tags/{tag}[/{action}]` with the tag as a
    /// single encoded segment (tags may contain `/`).
    fn tag_url(&self, parent: &str, tag: &str, action: Option<&str>) -> Result<Url, Error> {
        let mut url = self.tags_url(parent)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Validation("server URL cannot be a base".into()))?;
            segments.push(tag);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }
}

async fn check(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(Error::BackendRejected(message))
}

fn transport_err(e: reqwest::Error) -> Error {
    if e.is_decode() {
        Error::BackendRejected(format!("invalid response: {}", e))
    } else {
        Error::BackendUnavailable(e.to_string())
    }
}

#[async_trait::async_trait]
impl TagService for HttpTagService {
    async fn list_tags(
        &self,
        parent: &str,
        skip_cache: bool,
    ) -> Result<HashMap<String, i64>, Error> {
        let mut url = self.tags_url(parent)?;
        if skip_cache {
            url.query_pairs_mut().append_pair("skipCache", "true");
        }
        debug!(%url, "listing tags");
        let response = self.client.get(url).send().await.map_err(transport_err)?;
        let body: ListTagsResponse = check(response)
            .await?
            .json()
            .await
            .map_err(transport_err)?;
        Ok(body.tags)
    }

    async fn rebuild_tags(&self, parent: &str) -> Result<(), Error> {
        let mut url = self.tags_url(parent)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Validation("server URL cannot be a base".into()))?;
            segments.push("rebuild");
        }
        debug!(%url, "requesting tag index rebuild");
        let response = self.client.post(url).send().await.map_err(transport_err)?;
        check(response).await?;
        Ok(())
    }

    async fn delete_tag(&self, parent: &str, tag: &str) -> Result<(), Error> {
        let url = self.tag_url(parent, tag, None)?;
        debug!(%url, "deleting tag");
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(transport_err)?;
        check(response).await?;
        Ok(())
    }

    async fn rename_tag(&self, parent: &str, old: &str, new: &str) -> Result<(), Error> {
        let url = self.tag_url(parent, old, Some("rename"))?;
        debug!(%url, "renaming tag");
        let response = self
            .client
            .post(url)
            .json(&RenameRequest { new_name: new })
            .send()
            .await
            .map_err(transport_err)?;
        check(response).await?;
        Ok(())
    }
}
