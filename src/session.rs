use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("failed to access session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("session file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize session for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("username and email must not be empty")]
    InvalidUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct User {
    pub(crate) username: String,
    pub(crate) email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Session {
    pub(crate) user: User,
    /// Bearer token attached to catalog requests when present.
    #[serde(default)]
    pub(crate) token: Option<String>,
}

impl Session {
    pub(crate) fn new(
        username: &str,
        email: &str,
        token: Option<String>,
    ) -> Result<Self, SessionError> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || email.is_empty() {
            return Err(SessionError::InvalidUser);
        }
        Ok(Self {
            user: User {
                username: username.to_string(),
                email: email.to_string(),
            },
            token: token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
    }

    /// Key that scopes history and watchlist rows in the store.
    pub(crate) fn profile(&self) -> &str {
        &self.user.username
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Persisted backing for the session; owns no session state itself.
#[derive(Debug, Clone)]
pub(crate) struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn load(&self) -> Result<Option<Session>, SessionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let session = serde_json::from_str(&raw).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "restored session");
        Ok(Some(session))
    }

    pub(crate) fn persist(&self, session: &Session) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = serde_json::to_string_pretty(session).map_err(|source| {
            SessionError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, raw).map_err(io_err)?;
        info!(profile = session.profile(), "session saved");
        Ok(())
    }

    /// Returns whether a persisted session existed.
    pub(crate) fn clear(&self) -> Result<bool, SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("session cleared");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SessionError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_returns_none_without_persisted_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("session.json"));
        assert_eq!(store.load().expect("load should succeed"), None);
    }

    #[test]
    fn persisted_session_round_trips_and_clear_removes_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path().join("nested").join("session.json"));
        let session = Session::new("ana", "ana@example.test", Some(" tok ".to_string()))
            .expect("valid session");

        store.persist(&session).expect("persist");
        let restored = store.load().expect("load").expect("session present");
        assert_eq!(restored, session);
        assert_eq!(restored.token(), Some("tok"));

        assert!(store.clear().expect("clear"));
        assert!(!store.path().exists());
        assert!(!store.clear().expect("second clear is a no-op"));
    }

    #[test]
    fn corrupt_session_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").expect("write");

        let err = SessionStore::new(&path).load().expect_err("corrupt file");
        assert!(matches!(err, SessionError::Corrupt { .. }));
    }

    #[test]
    fn persist_failures_are_not_reported_as_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = Session::new("ana", "a@b.c", None).expect("valid");
        let err = SessionStore::new(dir.path())
            .persist(&session)
            .expect_err("a directory is not writable as a file");
        assert!(matches!(err, SessionError::Io { .. }));

        let source = serde_json::from_str::<Session>("{").expect_err("invalid json");
        let err = SessionError::Serialize {
            path: dir.path().join("session.json"),
            source,
        };
        let message = err.to_string();
        assert!(message.starts_with("failed to serialize session"));
        assert!(!message.contains("corrupt"));
    }

    #[test]
    fn blank_credentials_are_rejected_and_blank_token_dropped() {
        assert!(matches!(
            Session::new(" ", "a@b.c", None),
            Err(SessionError::InvalidUser)
        ));
        let session = Session::new("ana", "a@b.c", Some("  ".to_string())).expect("valid");
        assert_eq!(session.token(), None);
    }
}
