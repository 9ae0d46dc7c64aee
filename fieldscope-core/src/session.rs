//! Session store: bearer token, cached profile, selected field
//!
//! An explicit context object shared as `Arc<SessionStore>` rather than
//! ambient global state. Dependents observe changes through a watch
//! channel. The token and the selected-field snapshot persist to the XDG
//! state directory and are both removed on logout; the cached profile is
//! memory only.
//!
//! Authorization failures from the gateway funnel into [`SessionStore::
//! invalidate`], which clears a live session exactly once no matter how
//! many concurrent requests observed the failure.

use crate::error::{Error, Result};
use crate::types::{FieldRef, UserProfile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::sync::watch;

/// Point-in-time view of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Bearer token, absent when logged out
    pub token: Option<String>,
    /// Cached profile of the authenticated user
    pub user: Option<UserProfile>,
    /// Currently selected field; only meaningful while a token is present
    pub selected_field: Option<FieldRef>,
}

impl SessionState {
    /// True when a bearer token is held.
    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }
}

/// On-disk shape; the profile is deliberately not persisted.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    token: Option<String>,
    #[serde(default)]
    selected_field: Option<FieldRef>,
}

/// Shared session context.
pub struct SessionStore {
    path: PathBuf,
    state: RwLock<SessionState>,
    changes: watch::Sender<SessionState>,
}

impl SessionStore {
    /// Open the store, restoring any persisted session snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let persisted: PersistedSession = serde_json::from_str(&content)?;
                SessionState {
                    token: persisted.token,
                    user: None,
                    selected_field: persisted.selected_field,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => return Err(Error::Io(e)),
        };

        let (changes, _) = watch::channel(state.clone());
        Ok(Self {
            path,
            state: RwLock::new(state),
            changes,
        })
    }

    /// Store a fresh token, optionally with the profile that came with it.
    ///
    /// When no profile accompanies the token the API layer follows up with
    /// a `GET /users/me` and calls [`SessionStore::set_user`].
    pub fn login(&self, token: String, user: Option<UserProfile>) -> Result<()> {
        let snapshot = {
            let mut state = self.state.write().unwrap();
            state.token = Some(token);
            state.user = user;
            self.persist(&state)?;
            state.clone()
        };
        self.changes.send_replace(snapshot);
        Ok(())
    }

    /// Cache the fetched profile. Dropped silently if the session was torn
    /// down while the profile request was in flight.
    pub fn set_user(&self, user: UserProfile) {
        let snapshot = {
            let mut state = self.state.write().unwrap();
            if state.token.is_none() {
                tracing::debug!("Discarding profile fetched after logout");
                return;
            }
            state.user = Some(user);
            state.clone()
        };
        self.changes.send_replace(snapshot);
    }

    /// Clear the session from memory and durable storage.
    ///
    /// Returns true when a live session was actually cleared; a second
    /// concurrent call finds nothing to clear and returns false, so
    /// dependents are only notified once.
    pub fn logout(&self) -> Result<bool> {
        let snapshot = {
            let mut state = self.state.write().unwrap();
            if state.token.is_none() && state.user.is_none() && state.selected_field.is_none() {
                return Ok(false);
            }
            *state = SessionState::default();
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
            state.clone()
        };
        self.changes.send_replace(snapshot);
        Ok(true)
    }

    /// Tear the session down after an authorization failure (401/403).
    ///
    /// Persistence failures are logged rather than propagated; the caller
    /// is already surfacing the authorization error.
    pub fn invalidate(&self) -> bool {
        match self.logout() {
            Ok(cleared) => {
                if cleared {
                    tracing::warn!("Session invalidated by the gateway, logging out");
                }
                cleared
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to remove persisted session");
                true
            }
        }
    }

    /// Change the selected field. Requires a live session.
    pub fn set_selected_field(&self, field: Option<FieldRef>) -> Result<()> {
        let snapshot = {
            let mut state = self.state.write().unwrap();
            if state.token.is_none() {
                return Err(Error::Unauthorized);
            }
            state.selected_field = field;
            self.persist(&state)?;
            state.clone()
        };
        self.changes.send_replace(snapshot);
        Ok(())
    }

    /// Current bearer token.
    pub fn token(&self) -> Option<String> {
        self.state.read().unwrap().token.clone()
    }

    /// Cached profile, if fetched.
    pub fn user(&self) -> Option<UserProfile> {
        self.state.read().unwrap().user.clone()
    }

    /// Currently selected field.
    pub fn selected_field(&self) -> Option<FieldRef> {
        self.state.read().unwrap().selected_field.clone()
    }

    /// Clone of the full session state.
    pub fn snapshot(&self) -> SessionState {
        self.state.read().unwrap().clone()
    }

    /// True when a bearer token is held.
    pub fn is_logged_in(&self) -> bool {
        self.state.read().unwrap().token.is_some()
    }

    /// Observe session changes. The receiver always holds the latest state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.changes.subscribe()
    }

    fn persist(&self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let persisted = PersistedSession {
            token: state.token.clone(),
            selected_field: state.selected_field.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&persisted)?)?;
        Ok(())
    }
}
