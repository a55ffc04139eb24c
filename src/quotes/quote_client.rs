use std::sync::Arc;

use tracing::warn;

use crate::{
    config::AppConfig,
    prelude::*,
    quotes::{composer::compose, PipelineConfig, QuoteFilters, QuotePipeline},
    storage::{FileTripStore, TripStore},
    types::{QuoteRequest, TripContext},
    ws::ConnectionManager,
};

/// Entry point for the quotation step: the shared connection, the wizard's
/// trip store and pipeline settings.
#[derive(Clone)]
pub struct QuoteClient {
    manager: ConnectionManager,
    store: Arc<dyn TripStore>,
    pipeline_config: PipelineConfig,
}

impl std::fmt::Debug for QuoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteClient")
            .field("manager", &self.manager)
            .field("pipeline_config", &self.pipeline_config)
            .finish_non_exhaustive()
    }
}

impl QuoteClient {
    pub fn new(
        manager: ConnectionManager,
        store: Arc<dyn TripStore>,
        pipeline_config: PipelineConfig,
    ) -> QuoteClient {
        QuoteClient {
            manager,
            store,
            pipeline_config,
        }
    }

    /// Builds the connection and a file-backed trip store from `config`.
    pub fn from_config(config: &AppConfig) -> Result<QuoteClient> {
        config.validate()?;
        Ok(QuoteClient::new(
            ConnectionManager::new(config.connection_config()?),
            Arc::new(FileTripStore::new(config.storage.trip_file.clone())),
            config.pipeline_config(),
        ))
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// The stored trip; an empty one when the wizard saved nothing yet.
    pub async fn load_trip(&self) -> Result<TripContext> {
        match self.store.load().await? {
            Some(trip) => Ok(trip),
            None => {
                warn!("No stored trip, composing the request from defaults");
                Ok(TripContext::default())
            }
        }
    }

    pub async fn compose_request(&self) -> Result<QuoteRequest> {
        Ok(compose(&self.load_trip().await?))
    }

    /// Starts a pipeline for the stored trip.
    pub async fn watch_quotes(&self, filters: QuoteFilters) -> Result<QuotePipeline> {
        let trip = self.load_trip().await?;
        self.watch_trip(&trip, filters).await
    }

    pub async fn watch_trip(&self, trip: &TripContext, filters: QuoteFilters) -> Result<QuotePipeline> {
        QuotePipeline::activate(&self.manager, trip, self.pipeline_config.clone(), filters).await
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTripStore;
    use crate::ws::ConnectionConfig;

    fn client(trip: Option<TripContext>) -> QuoteClient {
        QuoteClient::new(
            ConnectionManager::new(ConnectionConfig::default()),
            Arc::new(InMemoryTripStore::new(trip)),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_request_from_stored_trip() {
        let trip = TripContext::new("31")
            .with_dates("2025-05-01", "2025-05-20")
            .with_travellers(vec!["1990-02-14".to_string(), "14/02/1992".to_string()]);
        let request = client(Some(trip)).compose_request().await.unwrap();
        assert_eq!(request.destination_id, "31");
        assert_eq!(request.return_date, "20/05/2025");
        assert_eq!(request.travellers_count, 2);
        assert_eq!(request.travellers_dob, vec!["14/02/1990", "14/02/1992"]);
    }

    #[tokio::test]
    async fn test_missing_trip_uses_fallbacks() {
        let request = client(None).compose_request().await.unwrap();
        assert_eq!(request.destination_id, "1");
        assert_eq!(request.start_date, "01/01/2025");
        assert_eq!(request.travellers_dob, vec!["01/01/1990"]);
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let mut config = AppConfig::default();
        config.network.base_url = "nowhere".to_string();
        assert!(QuoteClient::from_config(&config).is_err());
    }
}
