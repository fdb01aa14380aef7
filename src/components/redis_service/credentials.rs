use super::actor::keys;
use super::store::KeyValueStore;
use crate::error::DashResult;
use serde_json::Value;

/// Save the opaque credential blob
pub async fn save_credentials(store: &dyn KeyValueStore, credentials: &Value) -> DashResult<()> {
    store.set(keys::CREDENTIALS, credentials.to_string()).await
}

/// Get the credential blob, if one was saved
pub async fn get_credentials(store: &dyn KeyValueStore) -> DashResult<Option<Value>> {
    match store.get(keys::CREDENTIALS).await? {
        Some(json) => {
            let credentials: Value = serde_json::from_str(&json)?;
            Ok(Some(credentials))
        }
        None => Ok(None),
    }
}

/// Remove the credential blob
pub async fn clear_credentials(store: &dyn KeyValueStore) -> DashResult<()> {
    store.delete(keys::CREDENTIALS).await
}
