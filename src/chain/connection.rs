//! Ownership of the single live node session.
//!
//! # Responsibilities
//! - Connect lazily on first use, or eagerly via [`ConnectionManager::warm_up`]
//! - Run calls against the current session
//! - Reconnect exactly once when a call fails with a transient transport error
//!
//! # Concurrency
//! The live connection sits in an `ArcSwapOption`. Readers take a cheap
//! snapshot; a reconnect swaps in a new value, and calls already holding the
//! old `Arc` run to completion against it. Connect and reconnect are
//! serialized by an async mutex. Each established connection has a generation
//! number, and a caller whose stale generation has already been replaced
//! reuses the replacement instead of reconnecting again.

use arc_swap::ArcSwapOption;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::chain::{ChainConnector, ChainError, ChainSession};
use crate::config::NetworkConfig;
use crate::observability::metrics;
use crate::resilience::backoff_delay;

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub endpoint: String,
    /// Used when the chain does not report an address format.
    pub default_address_format: u16,
    pub connect_timeout: Duration,
}

impl From<&NetworkConfig> for ConnectionSettings {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            endpoint: network.endpoint.clone(),
            default_address_format: network.address_prefix,
            connect_timeout: Duration::from_secs(network.connect_timeout_secs),
        }
    }
}

/// An established session together with what was learned while connecting.
pub struct LiveConnection {
    pub session: Arc<dyn ChainSession>,
    pub address_format: u16,
    pub generation: u64,
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

/// Owner of the node connection.
pub struct ConnectionManager {
    connector: Arc<dyn ChainConnector>,
    settings: ConnectionSettings,
    current: ArcSwapOption<LiveConnection>,
    connect_lock: Mutex<()>,
    state: AtomicU8,
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn ChainConnector>, settings: ConnectionSettings) -> Self {
        Self {
            connector,
            settings,
            current: ArcSwapOption::empty(),
            connect_lock: Mutex::new(()),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Generation of the most recent connection attempt.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Address format of the live connection, or the configured default.
    pub fn address_format(&self) -> u16 {
        self.current
            .load_full()
            .map(|conn| conn.address_format)
            .unwrap_or(self.settings.default_address_format)
    }

    /// Run `call` against the live session, connecting first if needed.
    ///
    /// A transient failure triggers one reconnect and one more invocation of
    /// `call`. Every other failure, and a second failure, is returned as is.
    pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T, ChainError>
    where
        F: Fn(Arc<dyn ChainSession>) -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let conn = self.connection().await?;

        match call(conn.session.clone()).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    error = %e,
                    generation = conn.generation,
                    "Transient transport failure, reconnecting"
                );
                let fresh = self.reconnect(conn.generation).await?;
                call(fresh.session.clone()).await
            }
            other => other,
        }
    }

    /// The live connection, established on first use.
    pub async fn connection(&self) -> Result<Arc<LiveConnection>, ChainError> {
        if let Some(conn) = self.current.load_full() {
            return Ok(conn);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(conn) = self.current.load_full() {
            return Ok(conn);
        }

        self.set_state(ConnectionState::Connecting);
        match self.establish().await {
            Ok(conn) => {
                self.current.store(Some(conn.clone()));
                self.set_state(ConnectionState::Connected);
                Ok(conn)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Replace the connection of generation `stale_generation`.
    async fn reconnect(&self, stale_generation: u64) -> Result<Arc<LiveConnection>, ChainError> {
        let _guard = self.connect_lock.lock().await;

        if self.generation() != stale_generation {
            // Someone else already reconnected while we waited for the lock.
            return self.current.load_full().ok_or_else(|| ChainError::Connect {
                endpoint: self.settings.endpoint.clone(),
                message: "concurrent reconnect failed".to_string(),
            });
        }

        self.set_state(ConnectionState::Reconnecting);
        if let Some(old) = self.current.swap(None) {
            old.session.disconnect().await;
        }

        match self.establish().await {
            Ok(conn) => {
                self.current.store(Some(conn.clone()));
                self.set_state(ConnectionState::Connected);
                metrics::record_reconnect("success");
                tracing::info!(generation = conn.generation, "Reconnected to node");
                Ok(conn)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                metrics::record_reconnect("failure");
                tracing::error!(error = %e, "Reconnect failed");
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<Arc<LiveConnection>, ChainError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let timeout = self.settings.connect_timeout;

        let attempt = async {
            let session = self.connector.connect(&self.settings.endpoint).await?;
            let properties = session.chain_properties().await?;
            Ok::<_, ChainError>((session, properties))
        };

        let (session, properties) = tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| ChainError::ConnectTimeout(timeout.as_secs()))??;

        let address_format = properties
            .address_format
            .unwrap_or(self.settings.default_address_format);

        tracing::info!(
            endpoint = %self.settings.endpoint,
            generation,
            address_format,
            token_symbol = properties.token_symbol.as_deref().unwrap_or("-"),
            "Connected to node"
        );

        Ok(Arc::new(LiveConnection {
            session,
            address_format,
            generation,
        }))
    }

    /// Try to connect up to `max_attempts` times with exponential backoff.
    ///
    /// Returns false if every attempt failed; requests will then connect
    /// lazily.
    pub async fn warm_up(&self, max_attempts: u32, base: Duration, max: Duration) -> bool {
        for attempt in 1..=max_attempts {
            match self.connection().await {
                Ok(_) => return true,
                Err(e) => {
                    tracing::warn!(attempt, max_attempts, error = %e, "Node connection failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff_delay(attempt, base, max)).await;
                    }
                }
            }
        }
        false
    }
}
