// Catalogue session lifecycle — one shared client handle, swapped whole on credential change.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::credentials::{CredentialStore, Credentials};
use crate::error::{Error, Result};
use crate::source::traits::{LibraryClient, LibraryConnector};

pub struct SessionManager {
    store: CredentialStore,
    connector: Arc<dyn LibraryConnector>,
    handle: RwLock<Option<Arc<dyn LibraryClient>>>,
    reload_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(store: CredentialStore, connector: Arc<dyn LibraryConnector>) -> Self {
        Self {
            store,
            connector,
            handle: RwLock::new(None),
            reload_lock: Mutex::new(()),
        }
    }

    /// Load stored credentials and log in.
    ///
    /// Never fails: on any error the session stays unset and the gateway runs
    /// degraded until `reload` succeeds.
    pub async fn init(&self) {
        let _guard = self.reload_lock.lock().await;
        match self.login_from_store().await {
            Ok(client) => {
                *self.handle.write() = Some(client);
                info!("catalogue session initialized");
            }
            Err(e) => {
                error!("catalogue session not initialized: {}", e);
                *self.handle.write() = None;
            }
        }
    }

    async fn login_from_store(&self) -> Result<Arc<dyn LibraryClient>> {
        let credentials = self.store.load()?;
        if credentials.is_blank() {
            return Err(Error::Config(format!(
                "credentials in '{}' are empty, update them via POST /credentials",
                self.store.path().display()
            )));
        }
        self.connect_verified(&credentials).await
    }

    async fn connect_verified(&self, credentials: &Credentials) -> Result<Arc<dyn LibraryClient>> {
        let client = self
            .connector
            .connect(credentials)
            .await
            .map_err(Error::from)?;
        if !client.is_logged_in() {
            return Err(Error::Upstream("Login failed, check the credentials".to_string()));
        }
        Ok(client)
    }

    /// True iff a handle exists and reports logged-in.
    pub fn is_ready(&self) -> bool {
        self.handle
            .read()
            .as_ref()
            .map(|client| client.is_logged_in())
            .unwrap_or(false)
    }

    /// Snapshot of the live handle. In-flight work keeps its snapshot across reloads.
    pub fn client(&self) -> Result<Arc<dyn LibraryClient>> {
        let client = self.handle.read().clone();
        match client {
            Some(client) if client.is_logged_in() => Ok(client),
            _ => Err(Error::NotInitialized),
        }
    }

    /// Log in with `credentials`; persist and swap only once the login is verified.
    ///
    /// On failure the previous handle, or its absence, stays in place and the
    /// credential file is left untouched.
    pub async fn reload(&self, credentials: Credentials) -> Result<()> {
        let _guard = self.reload_lock.lock().await;

        let client = match self.connect_verified(&credentials).await {
            Ok(client) => client,
            Err(e) => {
                warn!("credential reload rejected, keeping previous session: {}", e);
                return Err(e);
            }
        };

        self.store.save(&credentials)?;
        *self.handle.write() = Some(client);
        info!("credentials updated and catalogue session replaced");
        Ok(())
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}
