//! Process-wide upstream session.
//!
//! [`SessionManager`] owns the single connection to the remote platform. The
//! first [`SessionManager::ensure_ready`] call connects, checks authorization,
//! falls back to the service token when the persisted user session is not
//! usable, and fixes the [`Identity`] for the rest of the process lifetime.
//! Later calls only check liveness and reconnect when the transport dropped.
//!
//! Connect and authorize are serialized by an async mutex. Once the identity
//! is known and the transport is connected, `ensure_ready` is lock-free, so
//! concurrent chunk fetches never contend on the session.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::upstream::UpstreamTransport;

/// The kind of account the session acts as, decided once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// A persisted user session. Must join public channels before reading.
    User,
    /// A service (bot) account. Cannot join channels and does not need to.
    Service,
}

impl Identity {
    /// Whether channels must be joined before their documents are read.
    #[must_use]
    pub fn requires_join(self) -> bool {
        matches!(self, Self::User)
    }
}

/// Lifecycle of the upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Nothing has been attempted yet.
    Uninitialized = 0,
    /// The first connect and authorize is in progress.
    Connecting = 1,
    /// Connected with a known identity.
    Authorized = 2,
    /// Authorized earlier, the connection is being re-established.
    Reconnecting = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Authorized,
            3 => Self::Reconnecting,
            _ => Self::Uninitialized,
        }
    }

    /// Lower-case label used by the health endpoint.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Authorized => "authorized",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// A ready-to-use view of the session, handed to resolvers and fetchers.
#[derive(Clone)]
pub struct SessionHandle {
    transport: Arc<dyn UpstreamTransport>,
    identity: Identity,
}

impl SessionHandle {
    /// The upstream transport.
    #[must_use]
    pub fn transport(&self) -> &dyn UpstreamTransport {
        self.transport.as_ref()
    }

    /// The identity the session acts as.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.identity
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Shared owner of the upstream connection and credentials.
pub struct SessionManager {
    transport: Arc<dyn UpstreamTransport>,
    service_token: Option<String>,
    connect_lock: Mutex<()>,
    identity: OnceLock<Identity>,
    state: AtomicU8,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("identity", &self.identity.get())
            .field("state", &self.state())
            .field("has_service_token", &self.service_token.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager over `transport`. Nothing is connected until the
    /// first [`ensure_ready`](Self::ensure_ready).
    #[must_use]
    pub fn new(transport: Arc<dyn UpstreamTransport>, service_token: Option<String>) -> Self {
        Self {
            transport,
            service_token,
            connect_lock: Mutex::new(()),
            identity: OnceLock::new(),
            state: AtomicU8::new(SessionState::Uninitialized as u8),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Identity, once it has been determined.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity.get().copied()
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn handle(&self, identity: Identity) -> SessionHandle {
        SessionHandle {
            transport: Arc::clone(&self.transport),
            identity,
        }
    }

    /// Return a connected, authorized session handle.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Configuration`] when neither the user session nor a
    ///   service token can authorize
    /// - an upstream error when the transport cannot connect
    pub async fn ensure_ready(&self) -> GatewayResult<SessionHandle> {
        if let Some(identity) = self.identity.get() {
            if self.transport.is_connected() {
                return Ok(self.handle(*identity));
            }
        }

        let _guard = self.connect_lock.lock().await;

        if !self.transport.is_connected() {
            let known = self.identity.get().is_some();
            self.set_state(if known {
                SessionState::Reconnecting
            } else {
                SessionState::Connecting
            });
            if let Err(err) = self.transport.connect().await {
                self.set_state(if known {
                    SessionState::Reconnecting
                } else {
                    SessionState::Uninitialized
                });
                return Err(err.into());
            }
            debug!(reconnect = known, "upstream transport connected");
        }

        let identity = match self.identity.get() {
            Some(identity) => *identity,
            None => match self.authorize().await {
                Ok(identity) => *self.identity.get_or_init(|| identity),
                Err(err) => {
                    self.set_state(SessionState::Uninitialized);
                    return Err(err);
                }
            },
        };

        self.set_state(SessionState::Authorized);
        Ok(self.handle(identity))
    }

    async fn authorize(&self) -> GatewayResult<Identity> {
        let authorized = match self.transport.is_authorized().await {
            Ok(authorized) => authorized,
            Err(err) => {
                warn!(error = %err, "authorization check failed, reconnecting once");
                self.transport.disconnect().await;
                self.transport.connect().await?;
                self.transport.is_authorized().await?
            }
        };

        if !authorized {
            let Some(token) = self.service_token.as_deref() else {
                return Err(GatewayError::Configuration(
                    "user session is not authorized and no service token is configured".to_owned(),
                ));
            };
            self.transport.sign_in_service(token).await.map_err(|err| {
                GatewayError::Configuration(format!("service sign-in failed: {err}"))
            })?;
        }

        let identity = match self.transport.whoami().await {
            Ok(principal) if principal.is_service => Identity::Service,
            Ok(_) => Identity::User,
            Err(err) => {
                let fallback = if authorized {
                    Identity::User
                } else {
                    Identity::Service
                };
                warn!(error = %err, ?fallback, "who-am-i failed, inferring identity");
                fallback
            }
        };

        info!(?identity, "upstream session authorized");
        Ok(identity)
    }

    /// Re-establish the connection if it has dropped.
    ///
    /// Called between retry attempts. A live connection is left alone so
    /// in-flight calls of other requests are not disturbed.
    ///
    /// # Errors
    ///
    /// Returns the upstream error when connecting fails.
    pub async fn reconnect(&self) -> GatewayResult<()> {
        let _guard = self.connect_lock.lock().await;
        if self.transport.is_connected() {
            return Ok(());
        }
        self.set_state(SessionState::Reconnecting);
        self.transport.connect().await?;
        if self.identity.get().is_some() {
            self.set_state(SessionState::Authorized);
        } else {
            self.set_state(SessionState::Uninitialized);
        }
        debug!("upstream transport reconnected");
        Ok(())
    }

    /// Disconnect the transport at process exit.
    pub async fn shutdown(&self) {
        let _guard = self.connect_lock.lock().await;
        self.transport.disconnect().await;
        self.set_state(SessionState::Uninitialized);
        info!("upstream session closed");
    }
}
