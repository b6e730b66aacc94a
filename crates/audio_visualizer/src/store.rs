use crate::file_io::write_file_bytes;
use log::{debug, warn};
use std::{
    fs,
    io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use uuid::Uuid;

/// Pointer file naming a session's active batch directory.
const CURRENT_POINTER: &str = "CURRENT";

/// Subdirectory of a batch holding the generated images.
pub const RESULT_DIR: &str = "result";

/// Errors that can happen while mutating or reading session storage.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Io Error: {0}")]
    Io(#[from] io::Error),
}

/// Session-scoped media storage rooted at a single directory.
///
/// Layout per session:
/// `<root>/<session>/CURRENT` names the active batch,
/// `<root>/<session>/batch-<uuid>/` holds one upload batch,
/// `<root>/<session>/batch-<uuid>/result/` holds the generated images.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Self {
        MediaStore { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    /// Start a new upload batch for the session. Files are written into a
    /// uniquely named directory that only becomes the session's active batch
    /// once [`BatchWriter::commit`] repoints `CURRENT`.
    pub fn begin_batch(&self, session_id: &str) -> Result<BatchWriter, StoreError> {
        let session_dir = self.session_dir(session_id);
        let batch_name = format!("batch-{}", Uuid::new_v4().as_hyphenated());
        let batch_dir = session_dir.join(&batch_name);
        fs::create_dir_all(&batch_dir)?;
        debug!("session {session_id}: opened batch {batch_name}");
        Ok(BatchWriter {
            session_dir,
            batch_dir,
            batch_name,
        })
    }

    /// The session's active batch directory, if an upload ever completed.
    pub fn current_batch(&self, session_id: &str) -> Result<Option<PathBuf>, StoreError> {
        let session_dir = self.session_dir(session_id);
        let pointer = session_dir.join(CURRENT_POINTER);
        let batch_name = match fs::read_to_string(&pointer) {
            Ok(name) => name,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let batch_dir = session_dir.join(batch_name.trim());
        Ok(batch_dir.is_dir().then_some(batch_dir))
    }

    /// Resolve a URL path relative to the media root for serving, refusing
    /// anything that would escape it.
    #[must_use]
    pub fn resolve_media_path(&self, relative: &str) -> Option<PathBuf> {
        safe_join(&self.root, relative)
    }
}

/// An open, not yet active, upload batch.
#[derive(Debug)]
pub struct BatchWriter {
    session_dir: PathBuf,
    batch_dir: PathBuf,
    batch_name: String,
}

impl BatchWriter {
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.batch_dir
    }

    /// Store one uploaded file in the batch. The client name is reduced to
    /// its final path component; duplicates within a batch overwrite (last
    /// write wins).
    pub fn store_file(&self, client_name: &str, data: &[u8]) -> Result<String, StoreError> {
        let name = sanitize_filename(client_name).unwrap_or_else(|| "upload.bin".to_string());
        write_file_bytes(&self.batch_dir.join(&name), data)?;
        debug!("stored {name} ({} bytes) in {}", data.len(), self.batch_name);
        Ok(name)
    }

    /// Make this batch the session's active one. The swap is a rename of the
    /// pointer file, so readers always observe either the old batch or the
    /// new batch, never a missing directory. The replaced batch directory is
    /// then removed best-effort.
    pub fn commit(self) -> Result<PathBuf, StoreError> {
        let pointer = self.session_dir.join(CURRENT_POINTER);
        let previous = match fs::read_to_string(&pointer) {
            Ok(name) => Some(name.trim().to_string()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        let staged = self.session_dir.join(format!("{CURRENT_POINTER}.tmp"));
        fs::write(&staged, &self.batch_name)?;
        fs::rename(&staged, &pointer)?;

        if let Some(previous) = previous.filter(|name| *name != self.batch_name) {
            let old_dir = self.session_dir.join(&previous);
            if let Err(err) = fs::remove_dir_all(&old_dir) {
                warn!("could not remove replaced batch {}: {err}", old_dir.display());
            }
        }
        Ok(self.batch_dir)
    }
}

/// Reduce a client-supplied filename to a bare, non-empty basename.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }

    let basename = trimmed
        .rsplit(|ch| ch == '/' || ch == '\\')
        .next()
        .unwrap_or("")
        .trim();
    if basename.is_empty() || basename == "." || basename == ".." {
        return None;
    }

    Some(basename.to_string())
}

/// Join a relative URL path onto a root, refusing traversal.
pub fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative.trim_start_matches('/'));
    let mut out = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            _ => return None,
        }
    }
    (out != root).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::{sanitize_filename, MediaStore};

    fn store() -> (tempfile::TempDir, MediaStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MediaStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[test]
    fn no_batch_before_first_commit() {
        let (_guard, store) = store();
        assert!(store.current_batch("sess").expect("read").is_none());

        // An opened but uncommitted batch is still not active.
        let batch = store.begin_batch("sess").expect("begin");
        batch.store_file("a.wav", b"bytes").expect("store");
        assert!(store.current_batch("sess").expect("read").is_none());
    }

    #[test]
    fn commit_activates_batch() {
        let (_guard, store) = store();
        let batch = store.begin_batch("sess").expect("begin");
        batch.store_file("a.wav", b"bytes").expect("store");
        let committed = batch.commit().expect("commit");

        let current = store.current_batch("sess").expect("read").expect("active");
        assert_eq!(current, committed);
        assert!(current.join("a.wav").is_file());
    }

    #[test]
    fn second_batch_fully_replaces_first() {
        let (_guard, store) = store();
        let first = store.begin_batch("sess").expect("begin");
        first.store_file("old.wav", b"old").expect("store");
        let first_dir = first.commit().expect("commit");

        let second = store.begin_batch("sess").expect("begin");
        second.store_file("new.wav", b"new").expect("store");
        let second_dir = second.commit().expect("commit");

        let current = store.current_batch("sess").expect("read").expect("active");
        assert_eq!(current, second_dir);
        assert!(current.join("new.wav").is_file());
        assert!(!first_dir.exists(), "replaced batch should be removed");
    }

    #[test]
    fn empty_batch_still_replaces() {
        let (_guard, store) = store();
        let first = store.begin_batch("sess").expect("begin");
        first.store_file("old.wav", b"old").expect("store");
        first.commit().expect("commit");

        store.begin_batch("sess").expect("begin").commit().expect("commit");
        let current = store.current_batch("sess").expect("read").expect("active");
        let entries: Vec<_> = std::fs::read_dir(&current).expect("read dir").collect();
        assert!(entries.is_empty(), "second batch should be empty");
    }

    #[test]
    fn duplicate_names_last_write_wins() {
        let (_guard, store) = store();
        let batch = store.begin_batch("sess").expect("begin");
        batch.store_file("clip.wav", b"first").expect("store");
        batch.store_file("clip.wav", b"second").expect("store");
        let dir = batch.commit().expect("commit");
        assert_eq!(std::fs::read(dir.join("clip.wav")).expect("read"), b"second");
    }

    #[test]
    fn sessions_do_not_share_batches() {
        let (_guard, store) = store();
        let batch = store.begin_batch("alpha").expect("begin");
        batch.store_file("a.wav", b"a").expect("store");
        batch.commit().expect("commit");
        assert!(store.current_batch("beta").expect("read").is_none());
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("c:\\music\\clip.wav").as_deref(), Some("clip.wav"));
        assert_eq!(sanitize_filename("clip.wav").as_deref(), Some("clip.wav"));
        assert_eq!(sanitize_filename("  "), None);
        assert_eq!(sanitize_filename(".."), None);
    }

    #[test]
    fn media_paths_cannot_escape_root() {
        let (_guard, store) = store();
        assert!(store.resolve_media_path("sess/batch-1/result/a.png").is_some());
        assert!(store.resolve_media_path("../secrets").is_none());
        assert!(store.resolve_media_path("sess/../../x").is_none());
        assert!(store.resolve_media_path("").is_none());
    }
}
