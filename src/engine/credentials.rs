// Two-line credential file — first line is the user id/email, second the key/password.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::AuthMode;
use crate::error::{Error, Result};

/// The active credential pair, tagged by the configured login mode.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Remix { user_id: String, user_key: String },
    Email { email: String, password: String },
}

impl Credentials {
    /// Build a pair for `mode` from two raw values.
    pub fn from_pair(mode: AuthMode, first: impl Into<String>, second: impl Into<String>) -> Self {
        match mode {
            AuthMode::Remix => Credentials::Remix {
                user_id: first.into(),
                user_key: second.into(),
            },
            AuthMode::Email => Credentials::Email {
                email: first.into(),
                password: second.into(),
            },
        }
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            Credentials::Remix { .. } => AuthMode::Remix,
            Credentials::Email { .. } => AuthMode::Email,
        }
    }

    /// The two values in file order.
    pub fn as_pair(&self) -> (&str, &str) {
        match self {
            Credentials::Remix { user_id, user_key } => (user_id, user_key),
            Credentials::Email { email, password } => (email, password),
        }
    }

    /// True when either value is empty, e.g. a freshly created file.
    pub fn is_blank(&self) -> bool {
        let (first, second) = self.as_pair();
        first.is_empty() || second.is_empty()
    }
}

// Keep secrets out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Remix { user_id, .. } => f
                .debug_struct("Remix")
                .field("user_id", user_id)
                .field("user_key", &"<redacted>")
                .finish(),
            Credentials::Email { email, .. } => f
                .debug_struct("Email")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

pub struct CredentialStore {
    path: PathBuf,
    mode: AuthMode,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, mode: AuthMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Create the file with two empty lines if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, "\n\n").map_err(|e| {
            Error::Config(format!(
                "Error creating '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        info!(
            "created empty '{}', update it via POST /credentials",
            self.path.display()
        );
        Ok(())
    }

    /// Read the pair for the configured mode. The file content does not pick the mode.
    pub fn load(&self) -> Result<Credentials> {
        self.ensure_exists()?;

        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!("Error reading '{}': {}", self.path.display(), e))
        })?;

        let lines: Vec<&str> = content.lines().map(str::trim).collect();
        if lines.len() < 2 {
            return Err(Error::Config(format!(
                "Error reading '{}': file must contain at least two lines",
                self.path.display()
            )));
        }

        Ok(Credentials::from_pair(self.mode, lines[0], lines[1]))
    }

    /// Overwrite the file with the pair, newline-joined.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        if credentials.mode() != self.mode {
            warn!(
                "saving {:?} credentials into a store configured for {:?}",
                credentials.mode(),
                self.mode
            );
        }

        let (first, second) = credentials.as_pair();
        fs::write(&self.path, format!("{}\n{}\n", first, second))?;
        Ok(())
    }
}
