//! Persisted wizard state.
//!
//! The wizard keeps one JSON document in which the trip lives under
//! [`TRIP_STORAGE_KEY`]. Stores read and write that entry wholesale.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    consts::TRIP_STORAGE_KEY, prelude::*, serde_utils::json_type_name, types::TripContext, Error,
};

#[async_trait]
pub trait TripStore: Send + Sync {
    /// The stored trip, or `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<TripContext>>;
    async fn save(&self, trip: &TripContext) -> Result<()>;
}

/// A JSON file holding the wizard document.
#[derive(Debug, Clone)]
pub struct FileTripStore {
    path: PathBuf,
}

impl FileTripStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Option<Map<String, Value>>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::storage(format!(
                    "reading {}: {err}",
                    self.path.display()
                )))
            }
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&text).map_err(|e| Error::json_parse(e.to_string()))? {
            Value::Object(document) => Ok(Some(document)),
            other => Err(Error::storage(format!(
                "{} does not hold a JSON object (found {})",
                self.path.display(),
                json_type_name(&other)
            ))),
        }
    }
}

#[async_trait]
impl TripStore for FileTripStore {
    async fn load(&self) -> Result<Option<TripContext>> {
        let Some(mut document) = self.read_document().await? else {
            debug!(path = %self.path.display(), "No trip document");
            return Ok(None);
        };
        match document.remove(TRIP_STORAGE_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(entry) => decode_entry(entry).map(Some),
        }
    }

    async fn save(&self, trip: &TripContext) -> Result<()> {
        let mut document = self.read_document().await?.unwrap_or_default();
        let entry = serde_json::to_value(trip).map_err(|e| Error::json_parse(e.to_string()))?;
        document.insert(TRIP_STORAGE_KEY.to_string(), entry);

        let text = serde_json::to_string_pretty(&Value::Object(document))
            .map_err(|e| Error::json_parse(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("creating {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| Error::storage(format!("writing {}: {e}", self.path.display())))
    }
}

/// Browser-style stores keep the entry as a JSON string; both forms are read.
fn decode_entry(entry: Value) -> Result<TripContext> {
    let entry = match entry {
        Value::String(encoded) => {
            serde_json::from_str(&encoded).map_err(|e| Error::json_parse(e.to_string()))?
        }
        other => other,
    };
    if !entry.is_object() {
        warn!(found = json_type_name(&entry), "Trip entry is not an object, using defaults");
        return Ok(TripContext::default());
    }
    serde_json::from_value(entry).map_err(|e| Error::json_parse(e.to_string()))
}

#[derive(Debug, Default)]
pub struct InMemoryTripStore {
    trip: RwLock<Option<TripContext>>,
}

impl InMemoryTripStore {
    pub fn new(trip: Option<TripContext>) -> Self {
        Self {
            trip: RwLock::new(trip),
        }
    }
}

#[async_trait]
impl TripStore for InMemoryTripStore {
    async fn load(&self) -> Result<Option<TripContext>> {
        Ok(self.trip.read().await.clone())
    }

    async fn save(&self, trip: &TripContext) -> Result<()> {
        *self.trip.write().await = Some(trip.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileTripStore::new(dir.path().join("wizard.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_keeps_other_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wizard.json");
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let store = FileTripStore::new(&path);
        let trip = TripContext::new("9")
            .with_dates("01/02/2025", "10/02/2025")
            .with_travellers(vec!["12/12/1980".to_string()]);
        store.save(&trip).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(trip));
        let document: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document["theme"], "dark");
        assert_eq!(document[TRIP_STORAGE_KEY]["destinationId"], "9");
    }

    #[tokio::test]
    async fn test_reads_string_encoded_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wizard.json");
        let encoded = json!({"destinationId": "4", "travellersCount": "2"}).to_string();
        let mut document = Map::new();
        document.insert(TRIP_STORAGE_KEY.to_string(), Value::String(encoded));
        std::fs::write(&path, Value::Object(document).to_string()).unwrap();

        let trip = FileTripStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(trip.destination_id.as_deref(), Some("4"));
        assert_eq!(trip.travellers_count, Some(2));
    }

    #[tokio::test]
    async fn test_non_object_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wizard.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            FileTripStore::new(&path).load().await,
            Err(Error::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryTripStore::default();
        assert_eq!(store.load().await.unwrap(), None);
        store.save(&TripContext::new("3")).await.unwrap();
        assert_eq!(
            store.load().await.unwrap().and_then(|t| t.destination_id),
            Some("3".to_string())
        );
    }
}
