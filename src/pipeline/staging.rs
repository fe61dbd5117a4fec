//! Request-scoped staging
//!
//! Every capture session gets its own directories under the staging root:
//!
//! ```text
//! <root>/<session>/input   uploaded photos
//! <root>/<session>/output  reconstruction artifacts
//! ```
//!
//! Uploads and analysis of one session are serialized by a per-session
//! lock; sessions never see each other's files.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Identifier of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Paths an analysis of one session works in
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub session_id: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

type SessionLocks = Arc<Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>>;

/// Exclusive hold on one session's directories
///
/// Dropping the last guard of a session removes its lock entry.
#[derive(Debug)]
pub struct SessionGuard {
    session: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: SessionLocks,
}

impl SessionGuard {
    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // only the map itself still holds it: no owner, no waiter
        let idle = locks
            .get(&self.session)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.session);
        }
    }
}

/// Root of all session directories
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    locks: SessionLocks,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: SessionId) -> PathBuf {
        self.root.join(session.to_string())
    }

    pub fn input_dir(&self, session: SessionId) -> PathBuf {
        self.session_dir(session).join("input")
    }

    pub fn output_dir(&self, session: SessionId) -> PathBuf {
        self.session_dir(session).join("output")
    }

    pub fn request_for(&self, session: SessionId) -> AnalysisRequest {
        AnalysisRequest {
            session_id: session.to_string(),
            input_dir: self.input_dir(session),
            output_dir: self.output_dir(session),
        }
    }

    /// Exclusive access to a session's directories
    pub async fn lock_session(&self, session: SessionId) -> SessionGuard {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(session).or_default())
        };
        let guard = lock.lock_owned().await;
        SessionGuard {
            session,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Sessions with a held or awaited lock
    pub fn locked_sessions(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Store an uploaded file in the session's input directory
    ///
    /// Only the final component of `file_name` is used.
    pub async fn store_upload(
        &self,
        session: SessionId,
        file_name: &str,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        let name = sanitize_file_name(file_name).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid file name '{}'", file_name),
            )
        })?;

        let dir = self.input_dir(session);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

fn sanitize_file_name(file_name: &str) -> Option<&str> {
    Path::new(file_name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}

/// Most recently modified file in `dir`, ties broken by name
///
/// A missing directory counts as empty.
pub async fn latest_input(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let path = entry.path();
        let newer = match &latest {
            Some((time, best)) => modified > *time || (modified == *time && path > *best),
            None => true,
        };
        if newer {
            latest = Some((modified, path));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

/// Remove every file directly inside `dir`, returning how many went
pub async fn clear_files(dir: &Path) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
