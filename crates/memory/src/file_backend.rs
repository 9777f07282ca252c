//! File-based repository: one pretty-printed JSON document per session.
//!
//! Storage location: `~/.careclaw/sessions/<visit_id>.json` by default.
//! Files are human-inspectable and can be fed back into
//! `SessionContext::import` unchanged.

use async_trait::async_trait;
use careclaw_core::error::StorageError;
use careclaw_core::repository::{SessionFilter, SessionRepository};
use careclaw_core::session::SessionExport;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A directory of `<key>.json` files.
///
/// Every call goes to disk; there is no in-process cache, so several
/// processes can share a directory.
pub struct FileRepository {
    dir: PathBuf,
}

impl FileRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    ///
    /// The key is percent-encoded, so distinct keys map to distinct files
    /// and a key can never escape the directory. A leading dot is encoded
    /// too, which keeps session files visible.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let encoded = urlencoding::encode(key);
        let name = match encoded.strip_prefix('.') {
            Some(rest) => format!("%2E{rest}"),
            None => encoded.to_string(),
        };
        self.dir.join(format!("{name}.json"))
    }

    /// The key a file stem was encoded from by [`path_for`](Self::path_for).
    pub fn key_for(stem: &str) -> Option<String> {
        urlencoding::decode(stem).ok().map(|key| key.into_owned())
    }

    async fn read_file(&self, path: &Path, key: &str) -> Result<SessionExport, StorageError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error(path, e))?;
        serde_json::from_str(&content).map_err(|e| StorageError::Corrupted {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl SessionRepository for FileRepository {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<SessionExport>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => self.read_file(&path, key).await.map(Some),
            Ok(false) => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn put(&self, session: SessionExport) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let path = self.path_for(session.key());
        let content = serde_json::to_string_pretty(&session).map_err(|e| {
            StorageError::Corrupted {
                key: session.key().to_string(),
                reason: e.to_string(),
            }
        })?;

        // Write to a sibling and rename so readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(key = session.key(), path = %path.display(), "Session stored");
        Ok(())
    }

    async fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionExport>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(Self::key_for)
            else {
                warn!(path = %path.display(), "Skipping session file with an undecodable name");
                continue;
            };
            match self.read_file(&path, &key).await {
                Ok(session) if filter.matches(&session) => sessions.push(session),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping unreadable session file"),
            }
        }

        sessions.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::session;
    use careclaw_core::{Actor, MemoryBlock, Priority, Role};
    use chrono::Utc;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path());

        let mut s = session("V-10", "P001", Role::HealthProfessional);
        s.short_term_memory.push(MemoryBlock {
            id: 1,
            timestamp: Utc::now(),
            actor: Actor::Professional,
            priority: Priority::High,
            text: "Paciente refiere dolor cervical intenso".into(),
            estimated_cost: 10,
            visit_id: "V-10".into(),
        });
        repo.put(s.clone()).await.unwrap();

        let loaded = repo.get("V-10").await.unwrap().unwrap();
        assert_eq!(loaded, s);
        assert!(dir.path().join("V-10.json").exists());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path());
        assert!(repo.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_on_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path().join("not-created"));
        assert!(repo.list(&SessionFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_and_skips_corrupted_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path());
        repo.put(session("V2", "P002", Role::Patient)).await.unwrap();
        repo.put(session("V1", "P001", Role::Patient)).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let all = repo.list(&SessionFilter::default()).await.unwrap();
        let keys: Vec<&str> = all.iter().map(|s| s.key()).collect();
        assert_eq!(keys, vec!["V1", "V2"]);

        let p2 = repo
            .list(&SessionFilter {
                patient_id: Some("P002".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(p2.len(), 1);
    }

    #[tokio::test]
    async fn corrupted_file_is_reported_on_get() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path());
        std::fs::write(dir.path().join("V9.json"), "[]").unwrap();
        assert!(matches!(
            repo.get("V9").await,
            Err(StorageError::Corrupted { .. })
        ));
    }

    #[test]
    fn keys_cannot_escape_directory() {
        let repo = FileRepository::new("/data/sessions");
        assert_eq!(
            repo.path_for("../etc/passwd"),
            PathBuf::from("/data/sessions/%2E.%2Fetc%2Fpasswd.json")
        );
        assert_eq!(repo.path_for("V-10"), PathBuf::from("/data/sessions/V-10.json"));
    }

    #[test]
    fn similar_keys_get_distinct_files() {
        let repo = FileRepository::new("/data/sessions");
        let keys = ["a/b", "a_b", "a:b", "a%2Fb"];
        let paths: std::collections::HashSet<PathBuf> =
            keys.iter().map(|k| repo.path_for(k)).collect();
        assert_eq!(paths.len(), keys.len());

        for key in keys {
            let path = repo.path_for(key);
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap();
            assert_eq!(FileRepository::key_for(stem).as_deref(), Some(key));
        }
    }

    #[tokio::test]
    async fn keys_with_separators_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path());
        repo.put(session("a/b", "P001", Role::Patient)).await.unwrap();
        repo.put(session("a_b", "P002", Role::Patient)).await.unwrap();

        assert_eq!(repo.get("a/b").await.unwrap().unwrap().patient.id, "P001");
        assert_eq!(repo.get("a_b").await.unwrap().unwrap().patient.id, "P002");
        assert_eq!(repo.list(&SessionFilter::default()).await.unwrap().len(), 2);
    }
}
