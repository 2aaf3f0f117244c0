//! reqwest-backed implementations of the collaborator traits.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{DocumentId, GeoLocation, SessionId},
    error::ApiError,
    protocol::{AnalyticsEvent, EmailRequest, InsertDocumentResponse, LogRecord},
};
use storage::{DocumentStore, StoredLog};
use tracing::debug;
use url::Url;

use crate::services::{Analytics, GeoLocator, IpLookup, Mailer};

/// Turns a non-success response into an error, keeping the store's error
/// envelope when it sent one.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(anyhow!("request failed with {status}: {api_error}")),
        Err(_) if body.is_empty() => Err(anyhow!("request failed with {status}")),
        Err(_) => Err(anyhow!("request failed with {status}: {body}")),
    }
}

#[derive(Debug, Deserialize)]
struct SessionDocument {
    id: DocumentId,
    document: LogRecord,
}

/// Document store reached over HTTP, one collection per survey.
pub struct RestDocumentStore {
    http: Client,
    base_url: String,
    collection: String,
}

impl RestDocumentStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        }
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/collections/{}/documents",
            self.base_url, self.collection
        )
    }

    /// The id goes in as one escaped path segment.
    fn document_url(&self, id: &DocumentId) -> Result<Url> {
        let mut url = Url::parse(&self.documents_url())?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("store url {} cannot hold a document path", self.base_url))?
            .push(&id.to_string());
        Ok(url)
    }
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    async fn insert(&self, record: &LogRecord) -> Result<DocumentId> {
        let response = self
            .http
            .post(self.documents_url())
            .json(record)
            .send()
            .await?;
        let body: InsertDocumentResponse = ensure_success(response).await?.json().await?;
        debug!(document_id = %body.id, collection = %self.collection, "document inserted");
        Ok(body.id)
    }

    async fn fetch(&self, id: &DocumentId) -> Result<Option<LogRecord>> {
        let response = self
            .http
            .get(self.document_url(id)?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record = ensure_success(response).await?.json().await?;
        Ok(Some(record))
    }

    async fn list_for_session(&self, session_id: SessionId) -> Result<Vec<StoredLog>> {
        let response = self
            .http
            .get(self.documents_url())
            .query(&[("sessionId", session_id.to_string())])
            .send()
            .await?;
        let documents: Vec<SessionDocument> = ensure_success(response).await?.json().await?;
        Ok(documents
            .into_iter()
            .map(|doc| StoredLog {
                id: doc.id,
                record: doc.document,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

pub struct HttpIpLookup {
    http: Client,
    url: String,
}

impl HttpIpLookup {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl IpLookup for HttpIpLookup {
    async fn public_ip(&self) -> Result<String> {
        let response = self.http.get(&self.url).send().await?;
        let body: IpResponse = ensure_success(response).await?.json().await?;
        Ok(body.ip)
    }
}

pub struct HttpGeoLocator {
    http: Client,
    url: String,
}

impl HttpGeoLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self) -> Result<GeoLocation> {
        let response = self.http.get(&self.url).send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

#[derive(Debug, Clone)]
pub struct EmailCredentials {
    pub service_id: String,
    pub template_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
struct EmailSendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: &'a EmailRequest,
}

pub struct HttpMailer {
    http: Client,
    endpoint: String,
    credentials: EmailCredentials,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, credentials: EmailCredentials) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            credentials,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, request: &EmailRequest) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&EmailSendRequest {
                service_id: &self.credentials.service_id,
                template_id: &self.credentials.template_id,
                user_id: &self.credentials.user_id,
                template_params: request,
            })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

pub struct HttpAnalytics {
    http: Client,
    url: String,
}

impl HttpAnalytics {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Analytics for HttpAnalytics {
    async fn track(&self, event: &AnalyticsEvent) -> Result<()> {
        self.http
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
