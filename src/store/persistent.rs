//! Scoped persistence for item annotations.
//!
//! Epistemic foundation:
//! - K_i: All reads and writes go through one open session (single writer)
//! - K_i: The session flushes on every exit path, including abnormal ones
//! - B_i: The store file may be missing or corrupt → start empty
//! - I^B: Crash during flush → write-then-rename keeps the old file intact

use crate::models::{ArbitriumError, Label, Result};
use crate::store::{ItemAnnotation, ItemStatus};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Handle to the on-disk annotation store.
///
/// The map itself only exists inside an open [`StoreSession`]; accessing
/// annotations without one is unrepresentable.
pub struct AnnotationFile {
    path: PathBuf,
}

impl AnnotationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a session, loading persisted annotations.
    ///
    /// A missing or corrupt file is not fatal: the session starts from an
    /// empty map (all items unvisited).
    pub fn open(&self) -> Result<StoreSession> {
        let data = match File::open(&self.path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                match serde_json::from_reader::<_, HashMap<String, ItemAnnotation>>(reader) {
                    Ok(data) => {
                        info!(path = %self.path.display(), entries = data.len(), "Loaded annotations");
                        data
                    }
                    Err(e) => {
                        warn!(
                            path = %self.path.display(),
                            error = %e,
                            "Corrupt annotation file, starting empty"
                        );
                        HashMap::new()
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No annotation file yet, starting empty");
                HashMap::new()
            }
            Err(e) => return Err(ArbitriumError::io("opening annotation file", e)),
        };

        for annotation in data.values() {
            annotation.assert_valid();
        }

        Ok(StoreSession {
            path: self.path.clone(),
            data,
            closed: false,
        })
    }
}

/// An open annotation store session.
///
/// Dropping the session flushes to disk, so Ctrl-C-driven unwinding still
/// persists state; call [`StoreSession::close`] to observe flush errors.
pub struct StoreSession {
    path: PathBuf,
    data: HashMap<String, ItemAnnotation>,
    closed: bool,
}

impl StoreSession {
    /// Annotation for an item, defaulting to unvisited.
    pub fn get(&self, id: &str) -> ItemAnnotation {
        self.data
            .get(id)
            .cloned()
            .unwrap_or_else(ItemAnnotation::unvisited)
    }

    /// Overwrite an item's annotation. Fails fast on invariant violations.
    pub fn set(&mut self, id: &str, annotation: ItemAnnotation) {
        annotation.assert_valid();
        self.data.insert(id.to_string(), annotation);
    }

    /// Apply a human label to one item.
    ///
    /// The labeled item becomes `Classified` with the label as its verdict.
    /// Every other item holding a real arbiter verdict ages by exactly one
    /// staleness step: the example pool just shifted under it. Unvisited
    /// items and other human-labeled items are untouched.
    pub fn label_one(&mut self, id: &str, label: Label) {
        for (other_id, annotation) in self.data.iter_mut() {
            if other_id == id || annotation.human_label_no_or_yes.is_some() {
                continue;
            }
            if let Some(k) = annotation.status.staleness() {
                annotation.status = ItemStatus::Outdated(k + 1);
            }
        }
        self.data
            .insert(id.to_string(), ItemAnnotation::human(label));
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the current map to disk (write-then-rename, 2-space indent).
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| ArbitriumError::io("creating annotation dir", e))?;
            }
        }

        let temp_path = self.path.with_extension("tmp.json");
        {
            let file = File::create(&temp_path)
                .map_err(|e| ArbitriumError::io("creating temp annotation file", e))?;
            let writer = BufWriter::new(file);
            serde_json::to_writer_pretty(writer, &self.data)
                .map_err(|e| ArbitriumError::Internal(format!("Serializing annotations: {e}")))?;
        }

        fs::rename(&temp_path, &self.path)
            .map_err(|e| ArbitriumError::io("renaming annotation file", e))?;

        debug!(entries = self.data.len(), "Annotations flushed");
        Ok(())
    }

    /// Flush and consume the session, surfacing any write error.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                warn!(error = %e, "Failed to flush annotations on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> AnnotationFile {
        AnnotationFile::new(dir.path().join("annotations.json"))
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let session = store_in(&dir).open().unwrap();
        assert!(session.is_empty());
        assert_eq!(session.get("a"), ItemAnnotation::unvisited());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("annotations.json");
        fs::write(&path, "{not json").unwrap();
        let session = AnnotationFile::new(&path).open().unwrap();
        assert!(session.is_empty());
    }

    #[test]
    fn close_persists_and_reopen_reads_back() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut session = store.open().unwrap();
        session.set("a", ItemAnnotation::judged(0.25));
        session.close().unwrap();

        let session = store.open().unwrap();
        assert_eq!(session.get("a").gpt_verdict, Some(0.25));
        assert_eq!(session.get("a").status, ItemStatus::Classified);
    }

    #[test]
    fn drop_flushes_without_explicit_close() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        {
            let mut session = store.open().unwrap();
            session.set("a", ItemAnnotation::judged(0.5));
        }

        let session = store.open().unwrap();
        assert_eq!(session.len(), 1);
    }

    // Staleness monotonicity around label_one.
    #[test]
    fn label_one_ages_every_other_verdict_by_one() {
        let dir = TempDir::new().unwrap();
        let mut session = store_in(&dir).open().unwrap();

        session.set("labeled", ItemAnnotation::judged(0.6));
        session.set("fresh", ItemAnnotation::judged(0.9));
        let mut stale = ItemAnnotation::judged(0.2);
        stale.status = ItemStatus::Outdated(2);
        session.set("stale", stale);
        // "untouched" never entered the store: stays unvisited

        session.label_one("labeled", Label::Yes);

        let labeled = session.get("labeled");
        assert_eq!(labeled.status, ItemStatus::Classified);
        assert_eq!(labeled.human_label_no_or_yes, Some(Label::Yes));
        assert_eq!(labeled.gpt_verdict, Some(1.0));

        assert_eq!(session.get("fresh").status, ItemStatus::Outdated(1));
        assert_eq!(session.get("stale").status, ItemStatus::Outdated(3));
        assert_eq!(session.get("untouched").status, ItemStatus::Unvisited);
    }

    #[test]
    fn label_one_never_ages_prior_human_labels() {
        let dir = TempDir::new().unwrap();
        let mut session = store_in(&dir).open().unwrap();

        session.label_one("first", Label::No);
        session.set("judged", ItemAnnotation::judged(0.5));
        session.label_one("second", Label::Yes);

        assert_eq!(session.get("first").status, ItemStatus::Classified);
        assert_eq!(session.get("judged").status, ItemStatus::Outdated(1));
    }

    #[test]
    fn wire_format_matches_store_contract() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("annotations.json");
        let mut session = AnnotationFile::new(&path).open().unwrap();
        let mut ann = ItemAnnotation::judged(0.5);
        ann.status = ItemStatus::Outdated(1);
        session.set("a", ann);
        session.close().unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["a"]["gpt_verdict"], 0.5);
        assert_eq!(parsed["a"]["status"][0], "Outdated");
        assert_eq!(parsed["a"]["status"][1]["value"], 1);
        assert_eq!(parsed["a"]["human_label_no_or_yes"], serde_json::Value::Null);
        // 2-space indentation on session close
        assert!(raw.contains("\n  \"a\""));
    }
}
