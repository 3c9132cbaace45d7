//! Control-message handling for the service worker.

use std::rc::Rc;

use join_shared::{SettingsPayload, WorkerMessage};
use tracing::{debug, info};

use crate::cache::KeyValueStore;
use crate::error::CacheError;

/// Version the worker advertises in `SW_ACTIVATED` and `SW_UPDATE_AVAILABLE`.
pub const WORKER_VERSION: &str = env!("CARGO_PKG_VERSION");

const SETTINGS_PREFIX: &str = "settings.";
const VERSION_KEY: &str = "worker.version";

pub fn settings_key(name: &str) -> String {
    format!("{SETTINGS_PREFIX}{name}")
}

pub struct MessageHandler<K> {
    store: Rc<K>,
    version: String,
}

impl<K: KeyValueStore> MessageHandler<K> {
    pub fn new(store: Rc<K>, version: impl Into<String>) -> Self {
        Self {
            store,
            version: version.into(),
        }
    }

    pub fn activated(&self) -> WorkerMessage {
        WorkerMessage::Activated {
            version: self.version.clone(),
        }
    }

    /// Applies one inbound message. Returns the message to broadcast to every
    /// client, if any.
    #[tracing::instrument(skip(self, message), fields(kind = message.kind()))]
    pub async fn handle(&self, message: WorkerMessage) -> Result<Option<WorkerMessage>, CacheError> {
        match message {
            WorkerMessage::SyncSettings { payload } => {
                self.store_settings(&payload).await?;
                Ok(None)
            }
            WorkerMessage::CheckUpdate => {
                self.store.put(VERSION_KEY, &self.version).await?;
                info!(version = %self.version, "announcing worker version");
                Ok(Some(WorkerMessage::UpdateAvailable {
                    version: self.version.clone(),
                }))
            }
            WorkerMessage::UpdateAvailable { .. } | WorkerMessage::Activated { .. } => {
                debug!("ignoring worker-originated message");
                Ok(None)
            }
        }
    }

    async fn store_settings(&self, payload: &SettingsPayload) -> Result<(), CacheError> {
        let entries = payload.entries();
        for (name, value) in &entries {
            let json = serde_json::to_string(value).map_err(|e| CacheError::Settings(e.to_string()))?;
            self.store.put(&settings_key(name), &json).await?;
        }
        info!(keys = entries.len(), "synced settings");
        Ok(())
    }

    /// Reads one synced setting back.
    pub async fn setting(&self, name: &str) -> Result<Option<serde_json::Value>, CacheError> {
        match self.store.get(&settings_key(name)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CacheError::Settings(format!("{name}: {e}"))),
            None => Ok(None),
        }
    }

    pub async fn stored_version(&self) -> Result<Option<String>, CacheError> {
        self.store.get(VERSION_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use join_shared::ThemePreference;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        map: RefCell<BTreeMap<String, String>>,
    }

    impl KeyValueStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            Ok(self.map.borrow().get(key).cloned())
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
            self.map.borrow_mut().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<(), CacheError> {
            self.map.borrow_mut().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sync_settings_writes_one_key_per_preference() {
        let store = Rc::new(MemoryStore::default());
        let handler = MessageHandler::new(store.clone(), "1.0.0");

        let mut payload = SettingsPayload::theme(ThemePreference::Dark);
        payload.other.insert("compactCards".to_string(), json!(true));

        let reply = handler
            .handle(WorkerMessage::SyncSettings { payload })
            .await
            .expect("handled");
        assert_eq!(reply, None);

        assert_eq!(
            store.map.borrow().get("settings.themePreference").map(String::as_str),
            Some("\"dark\"")
        );
        assert_eq!(handler.setting("compactCards").await.expect("read"), Some(json!(true)));
    }

    #[tokio::test]
    async fn later_sync_overwrites_earlier_value() {
        let handler = MessageHandler::new(Rc::new(MemoryStore::default()), "1.0.0");
        for preference in [ThemePreference::Dark, ThemePreference::Light] {
            handler
                .handle(WorkerMessage::SyncSettings {
                    payload: SettingsPayload::theme(preference),
                })
                .await
                .expect("handled");
        }
        assert_eq!(
            handler.setting("themePreference").await.expect("read"),
            Some(json!("light"))
        );
    }

    #[tokio::test]
    async fn check_update_records_and_broadcasts_version() {
        let handler = MessageHandler::new(Rc::new(MemoryStore::default()), "2.1.0");
        let reply = handler.handle(WorkerMessage::CheckUpdate).await.expect("handled");
        assert_eq!(
            reply,
            Some(WorkerMessage::UpdateAvailable {
                version: "2.1.0".to_string()
            })
        );
        assert_eq!(handler.stored_version().await.expect("read").as_deref(), Some("2.1.0"));
    }

    #[tokio::test]
    async fn outbound_kinds_are_ignored() {
        let handler = MessageHandler::new(Rc::new(MemoryStore::default()), "1.0.0");
        let reply = handler.handle(handler.activated()).await.expect("handled");
        assert_eq!(reply, None);
    }
}
