//! Collaborators the survey talks to besides the document store.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{DocumentId, GeoLocation, SessionId},
    protocol::{AnalyticsEvent, EmailRequest, LogRecord},
};
use storage::{DocumentStore, StoredLog};

#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn public_ip(&self) -> Result<String>;
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self) -> Result<GeoLocation>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, request: &EmailRequest) -> Result<()>;
}

#[async_trait]
pub trait Analytics: Send + Sync {
    async fn track(&self, event: &AnalyticsEvent) -> Result<()>;
}

pub struct MissingIpLookup;

#[async_trait]
impl IpLookup for MissingIpLookup {
    async fn public_ip(&self) -> Result<String> {
        Err(anyhow!("ip lookup endpoint not configured"))
    }
}

/// Reports the same address every time. Used for offline runs.
pub struct FixedIpLookup(pub String);

#[async_trait]
impl IpLookup for FixedIpLookup {
    async fn public_ip(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

pub struct MissingGeoLocator;

#[async_trait]
impl GeoLocator for MissingGeoLocator {
    async fn locate(&self) -> Result<GeoLocation> {
        Err(anyhow!("geolocation unavailable"))
    }
}

pub struct MissingMailer;

#[async_trait]
impl Mailer for MissingMailer {
    async fn send(&self, request: &EmailRequest) -> Result<()> {
        Err(anyhow!(
            "email service not configured; cannot mail {}",
            request.to_email
        ))
    }
}

pub struct MissingAnalytics;

#[async_trait]
impl Analytics for MissingAnalytics {
    async fn track(&self, event: &AnalyticsEvent) -> Result<()> {
        Err(anyhow!("analytics not configured; dropped {}", event.name()))
    }
}

pub struct MissingDocumentStore;

#[async_trait]
impl DocumentStore for MissingDocumentStore {
    async fn insert(&self, record: &LogRecord) -> Result<DocumentId> {
        Err(anyhow!(
            "document store unavailable; dropped {} record",
            record.log_type.as_str()
        ))
    }

    async fn fetch(&self, id: &DocumentId) -> Result<Option<LogRecord>> {
        Err(anyhow!("document store unavailable; cannot fetch {id}"))
    }

    async fn list_for_session(&self, session_id: SessionId) -> Result<Vec<StoredLog>> {
        Err(anyhow!(
            "document store unavailable; cannot list session {session_id}"
        ))
    }
}
