//! Live session map
//!
//! Process-wide mapping from session id to a live [`OAuthClient`]. One lock
//! guards the whole map; it is held across rebuilds and refreshes, which is
//! acceptable because each session id has at most one outstanding refresh
//! and refreshes are infrequent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::atproto::error::XrpcError;
use crate::atproto::oauth_client::{ClientCredentials, OAuthClient};
use crate::core::constants::SESSION_REFRESH_WINDOW_SECS;
use crate::data::Store;

struct Entry {
    client: Arc<OAuthClient>,
    expiry: DateTime<Utc>,
    last_refresh: Option<DateTime<Utc>>,
}

pub struct SessionMap {
    http: reqwest::Client,
    store: Store,
    credentials: ClientCredentials,
    entries: Mutex<HashMap<String, Entry>>,
}

/// True when the session should be refreshed rather than used as-is.
fn in_refresh_window(expiry: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expiry - now <= Duration::seconds(SESSION_REFRESH_WINDOW_SECS)
}

impl SessionMap {
    pub fn new(http: reqwest::Client, store: Store, credentials: ClientCredentials) -> Self {
        Self {
            http,
            store,
            credentials,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a session id to its live client.
    ///
    /// Rebuilds from the store on a miss; evicts (map and store) when the
    /// stored expiry has lapsed or a refresh fails; refreshes proactively
    /// inside the window. The `bool` reports whether a refresh happened.
    pub async fn map(
        &self,
        did: &str,
        session_id: &str,
    ) -> Result<Option<(Arc<OAuthClient>, bool)>, XrpcError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(session_id) {
            if entry.expiry <= now {
                entries.remove(session_id);
                self.store.delete_session(did, session_id).await?;
                return Ok(None);
            }
            if !in_refresh_window(entry.expiry, now) {
                return Ok(Some((entry.client.clone(), false)));
            }
            let client = entry.client.clone();
            match client.ensure_fresh().await {
                Ok(refreshed) => {
                    let entry = entries.get_mut(session_id).expect("entry held under lock");
                    entry.expiry = client.expires_at();
                    if refreshed {
                        entry.last_refresh = Some(now);
                    }
                    return Ok(Some((client, refreshed)));
                }
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "session refresh failed, evicting");
                    entries.remove(session_id);
                    self.store.delete_session(did, session_id).await?;
                    return Ok(None);
                }
            }
        }

        // Miss: rebuild from the store.
        let Some(row) = self.store.get_session(did, session_id).await? else {
            return Ok(None);
        };
        if row.expires_at <= now {
            self.store.delete_session(did, session_id).await?;
            return Ok(None);
        }
        let client = Arc::new(OAuthClient::new(
            self.http.clone(),
            self.store.clone(),
            self.credentials.clone(),
            row,
        )?);
        let refreshed = if in_refresh_window(client.expires_at(), now) {
            match client.ensure_fresh().await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "session refresh failed, evicting");
                    self.store.delete_session(did, session_id).await?;
                    return Ok(None);
                }
            }
        } else {
            false
        };
        entries.insert(session_id.to_string(), Entry {
            client: client.clone(),
            expiry: client.expires_at(),
            last_refresh: refreshed.then_some(now),
        });
        Ok(Some((client, refreshed)))
    }

    /// Register a freshly created session.
    pub async fn append(&self, session_id: &str, client: Arc<OAuthClient>) {
        let expiry = client.expires_at();
        self.entries.lock().await.insert(session_id.to_string(), Entry {
            client,
            expiry,
            last_refresh: None,
        });
    }

    pub async fn delete(&self, session_id: &str) {
        self.entries.lock().await.remove(session_id);
    }

    /// Drop expired entries. Run on a timer.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expiry > now);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "session map cleanup");
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_window_boundary() {
        let now = Utc::now();
        assert!(in_refresh_window(now + Duration::seconds(299), now));
        assert!(in_refresh_window(now + Duration::seconds(300), now));
        assert!(!in_refresh_window(now + Duration::seconds(301), now));
        assert!(in_refresh_window(now - Duration::seconds(1), now));
    }
}
