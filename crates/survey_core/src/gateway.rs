use std::sync::Arc;

use shared::{
    domain::{DocumentId, GeoLocation},
    protocol::LogRecord,
};
use storage::DocumentStore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    error::SurveyError,
    services::{GeoLocator, IpLookup},
};

/// Network context stamped onto every record before it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteContext {
    pub ip_address: String,
    pub user_location: Option<GeoLocation>,
}

/// Writes snapshots to the document store, stamping them with the
/// participant's address and location first.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn DocumentStore>,
    ip_lookup: Arc<dyn IpLookup>,
    geo_locator: Arc<dyn GeoLocator>,
}

impl PersistenceGateway {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ip_lookup: Arc<dyn IpLookup>,
        geo_locator: Arc<dyn GeoLocator>,
    ) -> Self {
        Self {
            store,
            ip_lookup,
            geo_locator,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Looks up the address and location together. Without an address the
    /// write cannot proceed; a missing location is tolerated.
    pub async fn context(&self) -> Result<WriteContext, SurveyError> {
        let (ip, location) = tokio::join!(self.ip_lookup.public_ip(), self.geo_locator.locate());

        let ip_address = ip.map_err(|source| {
            error!(error = %source, "ip lookup failed; record not written");
            SurveyError::IpLookup { source }
        })?;

        let user_location = match location {
            Ok(location) => Some(location),
            Err(err) => {
                warn!(error = %err, "geolocation unavailable; writing without location");
                None
            }
        };

        Ok(WriteContext {
            ip_address,
            user_location,
        })
    }

    pub async fn insert(
        &self,
        mut record: LogRecord,
        context: WriteContext,
    ) -> Result<DocumentId, SurveyError> {
        record.ip_address = Some(context.ip_address);
        record.user_location = context.user_location;

        let id = self.store.insert(&record).await.map_err(|source| {
            error!(
                error = %source,
                session_id = %record.session_id,
                log_type = record.log_type.as_str(),
                "failed to write survey record"
            );
            SurveyError::Store { source }
        })?;

        info!(
            document_id = %id,
            session_id = %record.session_id,
            log_type = record.log_type.as_str(),
            step = %record.current_step,
            "survey record written"
        );
        Ok(id)
    }

    pub async fn write(&self, record: LogRecord) -> Result<DocumentId, SurveyError> {
        let context = self.context().await?;
        self.insert(record, context).await
    }

    /// Fire-and-forget write. Failures are logged by `write`.
    pub fn spawn_write(&self, record: LogRecord) -> JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move {
            let _ = gateway.write(record).await;
        })
    }

    pub async fn fetch(&self, id: &DocumentId) -> Result<Option<LogRecord>, SurveyError> {
        self.store.fetch(id).await.map_err(|source| {
            error!(error = %source, document_id = %id, "failed to fetch survey record");
            SurveyError::Store { source }
        })
    }
}
