//! Undo/redo journal for destructive filesystem operations.
//!
//! Every change goes through [`Journal::perform`]: whatever the operation would
//! overwrite or remove is first moved into the journal's stash directory, then the
//! change is applied and recorded. Undo applies the inverse and restores stashed state;
//! redo applies the operation again.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Nothing to redo")]
    NothingToRedo,
    #[error("{} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("cannot {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

type Result<T, E = JournalError> = std::result::Result<T, E>;

trait IoContext<T> {
    fn during(self, action: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn during(self, action: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| JournalError::Io {
            action,
            path: path.to_path_buf(),
            source,
        })
    }
}

/// What a created path holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    File(Vec<u8>),
    Dir,
}

/// A recorded destructive operation.
///
/// `displaced` and `stash` point into the stash directory and hold the state the
/// operation replaced, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create {
        path: PathBuf,
        content: Content,
        displaced: Option<PathBuf>,
    },
    Copy {
        from: PathBuf,
        to: PathBuf,
        displaced: Option<PathBuf>,
    },
    Move {
        from: PathBuf,
        to: PathBuf,
        displaced: Option<PathBuf>,
    },
    Delete {
        path: PathBuf,
        stash: Option<PathBuf>,
    },
}

impl Operation {
    /// Stashed locations owned by this operation.
    fn stashed(&self) -> Option<&Path> {
        match self {
            Operation::Create { displaced, .. }
            | Operation::Copy { displaced, .. }
            | Operation::Move { displaced, .. } => displaced.as_deref(),
            Operation::Delete { stash, .. } => stash.as_deref(),
        }
    }

    /// The same operation without any captured state, ready to be applied again.
    fn request(&self) -> Operation {
        let mut request = self.clone();
        match &mut request {
            Operation::Create { displaced, .. }
            | Operation::Copy { displaced, .. }
            | Operation::Move { displaced, .. } => *displaced = None,
            Operation::Delete { stash, .. } => *stash = None,
        }
        request
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create {
                path,
                content: Content::File(_),
                ..
            } => write!(f, "create file {}", path.display()),
            Operation::Create {
                path,
                content: Content::Dir,
                ..
            } => write!(f, "create dir {}", path.display()),
            Operation::Copy { from, to, .. } => {
                write!(f, "copy {} -> {}", from.display(), to.display())
            }
            Operation::Move { from, to, .. } => {
                write!(f, "move {} -> {}", from.display(), to.display())
            }
            Operation::Delete { path, .. } => write!(f, "delete {}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub operation: Operation,
    pub recorded_at: SystemTime,
}

pub struct Journal {
    stash_dir: PathBuf,
    limit: usize,
    undo: VecDeque<JournalEntry>,
    redo: Vec<JournalEntry>,
    stash_counter: u64,
}

impl Journal {
    /// Create a journal stashing into `stash_dir` and keeping at most `limit` entries.
    ///
    /// The directory is created on first use and removed when the journal is dropped.
    pub fn new(stash_dir: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            stash_dir: stash_dir.into(),
            limit: limit.max(1),
            undo: VecDeque::new(),
            redo: Vec::new(),
            stash_counter: 0,
        }
    }

    /// Undo stack, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &JournalEntry> {
        self.undo.iter()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn create_file(&mut self, path: &Path, bytes: Vec<u8>) -> Result<()> {
        self.perform(Operation::Create {
            path: path.to_path_buf(),
            content: Content::File(bytes),
            displaced: None,
        })
    }

    /// Create a directory. An existing directory is left alone and nothing is recorded;
    /// the return value tells whether anything was created.
    pub fn create_dir(&mut self, path: &Path) -> Result<bool> {
        if path.is_dir() {
            return Ok(false);
        }
        self.perform(Operation::Create {
            path: path.to_path_buf(),
            content: Content::Dir,
            displaced: None,
        })?;
        Ok(true)
    }

    pub fn copy(&mut self, from: &Path, to: &Path) -> Result<()> {
        self.perform(Operation::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            displaced: None,
        })
    }

    pub fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        self.perform(Operation::Move {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            displaced: None,
        })
    }

    pub fn delete(&mut self, path: &Path) -> Result<()> {
        self.perform(Operation::Delete {
            path: path.to_path_buf(),
            stash: None,
        })
    }

    /// Apply `operation`, record it and clear the redo stack.
    ///
    /// On failure any stashed state is put back and nothing is recorded.
    pub fn perform(&mut self, operation: Operation) -> Result<()> {
        let applied = self.apply(operation)?;
        debug!(operation = %applied, "journaled");
        for entry in self.redo.drain(..) {
            release(&entry.operation);
        }
        self.push_undo(JournalEntry {
            operation: applied,
            recorded_at: SystemTime::now(),
        });
        Ok(())
    }

    /// Revert the most recent operation and return it.
    pub fn undo(&mut self) -> Result<Operation> {
        let entry = self.undo.pop_back().ok_or(JournalError::NothingToUndo)?;
        if let Err(err) = revert(&entry.operation) {
            self.undo.push_back(entry);
            return Err(err);
        }
        debug!(operation = %entry.operation, "undone");
        let operation = entry.operation.clone();
        self.redo.push(entry);
        Ok(operation)
    }

    /// Apply the most recently undone operation again and return it.
    pub fn redo(&mut self) -> Result<Operation> {
        let entry = self.redo.pop().ok_or(JournalError::NothingToRedo)?;
        let applied = match self.apply(entry.operation.request()) {
            Ok(applied) => applied,
            Err(err) => {
                self.redo.push(entry);
                return Err(err);
            }
        };
        debug!(operation = %applied, "redone");
        self.push_undo(JournalEntry {
            operation: applied.clone(),
            recorded_at: SystemTime::now(),
        });
        Ok(applied)
    }

    fn push_undo(&mut self, entry: JournalEntry) {
        self.undo.push_back(entry);
        while self.undo.len() > self.limit {
            if let Some(evicted) = self.undo.pop_front() {
                debug!(operation = %evicted.operation, "evicted from journal");
                release(&evicted.operation);
            }
        }
    }

    /// Move whatever is at `path` into the stash, if anything.
    fn stash(&mut self, path: &Path) -> Result<Option<PathBuf>> {
        if !exists(path) {
            return Ok(None);
        }
        fs::create_dir_all(&self.stash_dir).during("create stash directory", &self.stash_dir)?;
        self.stash_counter += 1;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = self
            .stash_dir
            .join(format!("{}-{}", self.stash_counter, file_name));
        move_path(path, &target).during("stash", path)?;
        Ok(Some(target))
    }

    fn apply(&mut self, operation: Operation) -> Result<Operation> {
        match operation {
            Operation::Create { path, content, .. } => {
                let displaced = self.stash(&path)?;
                let written = match &content {
                    Content::File(bytes) => fs::write(&path, bytes),
                    Content::Dir => fs::create_dir_all(&path),
                };
                if let Err(source) = written {
                    rollback(&path, displaced.as_deref());
                    return Err(JournalError::Io {
                        action: "create",
                        path,
                        source,
                    });
                }
                Ok(Operation::Create {
                    path,
                    content,
                    displaced,
                })
            }
            Operation::Copy { from, to, .. } => {
                if !exists(&from) {
                    return Err(JournalError::Missing(from));
                }
                let displaced = self.stash(&to)?;
                if let Err(source) = copy_recursive(&from, &to) {
                    rollback(&to, displaced.as_deref());
                    return Err(JournalError::Io {
                        action: "copy",
                        path: from,
                        source,
                    });
                }
                Ok(Operation::Copy {
                    from,
                    to,
                    displaced,
                })
            }
            Operation::Move { from, to, .. } => {
                if !exists(&from) {
                    return Err(JournalError::Missing(from));
                }
                let displaced = self.stash(&to)?;
                if let Err(source) = move_path(&from, &to) {
                    if let Some(stashed) = &displaced {
                        let _ = move_path(stashed, &to);
                    }
                    return Err(JournalError::Io {
                        action: "move",
                        path: from,
                        source,
                    });
                }
                Ok(Operation::Move {
                    from,
                    to,
                    displaced,
                })
            }
            Operation::Delete { path, .. } => match self.stash(&path)? {
                Some(stash) => Ok(Operation::Delete {
                    path,
                    stash: Some(stash),
                }),
                None => Err(JournalError::Missing(path)),
            },
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if exists(&self.stash_dir) {
            if let Err(err) = fs::remove_dir_all(&self.stash_dir) {
                warn!(dir = %self.stash_dir.display(), "failed to remove stash: {err}");
            }
        }
    }
}

fn revert(operation: &Operation) -> Result<()> {
    match operation {
        Operation::Create {
            path, displaced, ..
        }
        | Operation::Copy {
            to: path,
            displaced,
            ..
        } => {
            if exists(path) {
                remove_path(path).during("remove", path)?;
            }
            restore(displaced.as_deref(), path)
        }
        Operation::Move {
            from,
            to,
            displaced,
        } => {
            move_path(to, from).during("move back", to)?;
            restore(displaced.as_deref(), to)
        }
        Operation::Delete { path, stash } => restore(stash.as_deref(), path),
    }
}

fn restore(stashed: Option<&Path>, path: &Path) -> Result<()> {
    match stashed {
        Some(stashed) => move_path(stashed, path).during("restore", path),
        None => Ok(()),
    }
}

/// Undo a half-applied change: drop whatever was written and put the stash back.
fn rollback(path: &Path, displaced: Option<&Path>) {
    if exists(path) {
        let _ = remove_path(path);
    }
    if let Err(err) = restore(displaced, path) {
        warn!("rollback failed: {err}");
    }
}

/// Delete the stashed data of an operation that can no longer be undone.
fn release(operation: &Operation) {
    if let Some(stashed) = operation.stashed() {
        if exists(stashed) {
            let _ = remove_path(stashed);
        }
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Rename, falling back to copy-and-remove across filesystems.
fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) if exists(from) && !exists(to) => {
            copy_recursive(from, to)?;
            remove_path(from)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    if fs::metadata(from)?.is_dir() {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(from, to).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Journal) {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().join(".stash"), 200);
        (dir, journal)
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_create_file_undo_redo() {
        let (dir, mut journal) = setup();
        let path = dir.path().join("a.txt");
        journal.create_file(&path, b"hello".to_vec()).unwrap();
        assert_eq!(read(&path), "hello");

        journal.undo().unwrap();
        assert!(!path.exists());
        assert_eq!((journal.undo_len(), journal.redo_len()), (0, 1));

        journal.redo().unwrap();
        assert_eq!(read(&path), "hello");
        assert_eq!((journal.undo_len(), journal.redo_len()), (1, 0));
    }

    #[test]
    fn test_overwrite_restores_previous_content() {
        let (dir, mut journal) = setup();
        let path = dir.path().join("a.txt");
        fs::write(&path, "old").unwrap();
        journal.create_file(&path, b"new".to_vec()).unwrap();
        assert_eq!(read(&path), "new");
        journal.undo().unwrap();
        assert_eq!(read(&path), "old");
    }

    #[test]
    fn test_create_existing_dir_is_not_recorded() {
        let (dir, mut journal) = setup();
        let sub = dir.path().join("sub");
        assert!(journal.create_dir(&sub).unwrap());
        assert!(!journal.create_dir(&sub).unwrap());
        assert_eq!(journal.undo_len(), 1);
        journal.undo().unwrap();
        assert!(!sub.exists());
    }

    #[test]
    fn test_copy_directory_and_undo() {
        let (dir, mut journal) = setup();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("inner")).unwrap();
        fs::write(src.join("inner/f.txt"), "x").unwrap();
        let dst = dir.path().join("dst");

        journal.copy(&src, &dst).unwrap();
        assert_eq!(read(&dst.join("inner/f.txt")), "x");
        journal.undo().unwrap();
        assert!(!dst.exists());
        assert!(src.join("inner/f.txt").exists());
    }

    #[test]
    fn test_move_onto_existing_and_undo() {
        let (dir, mut journal) = setup();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "A").unwrap();
        fs::write(&b, "B").unwrap();

        journal.rename(&a, &b).unwrap();
        assert!(!a.exists());
        assert_eq!(read(&b), "A");

        journal.undo().unwrap();
        assert_eq!(read(&a), "A");
        assert_eq!(read(&b), "B");

        journal.redo().unwrap();
        assert!(!a.exists());
        assert_eq!(read(&b), "A");
        journal.undo().unwrap();
        assert_eq!(read(&b), "B");
    }

    #[test]
    fn test_delete_and_undo() {
        let (dir, mut journal) = setup();
        let sub = dir.path().join("tree");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("leaf"), "green").unwrap();

        journal.delete(&sub).unwrap();
        assert!(!sub.exists());
        journal.undo().unwrap();
        assert_eq!(read(&sub.join("leaf")), "green");
    }

    #[test]
    fn test_failures_record_nothing() {
        let (dir, mut journal) = setup();
        let missing = dir.path().join("missing");
        assert!(matches!(journal.delete(&missing), Err(JournalError::Missing(_))));
        assert!(journal.rename(&missing, &dir.path().join("x")).is_err());

        let target = dir.path().join("keep.txt");
        fs::write(&target, "kept").unwrap();
        let bad = dir.path().join("no_such_dir").join("f.txt");
        assert!(journal.create_file(&bad, b"x".to_vec()).is_err());
        assert_eq!(journal.undo_len(), 0);
        assert_eq!(read(&target), "kept");
    }

    #[test]
    fn test_new_operation_clears_redo() {
        let (dir, mut journal) = setup();
        journal
            .create_file(&dir.path().join("1"), b"1".to_vec())
            .unwrap();
        journal.undo().unwrap();
        assert_eq!(journal.redo_len(), 1);
        journal
            .create_file(&dir.path().join("2"), b"2".to_vec())
            .unwrap();
        assert_eq!(journal.redo_len(), 0);
        assert!(matches!(journal.redo(), Err(JournalError::NothingToRedo)));
    }

    #[test]
    fn test_empty_stacks() {
        let (_dir, mut journal) = setup();
        let err = journal.undo().unwrap_err();
        assert_eq!(err.to_string(), "Nothing to undo");
        assert!(matches!(journal.redo(), Err(JournalError::NothingToRedo)));
    }

    #[test]
    fn test_limit_evicts_oldest_and_releases_stash() {
        let dir = tempfile::tempdir().unwrap();
        let stash = dir.path().join(".stash");
        let mut journal = Journal::new(&stash, 2);
        let path = dir.path().join("f");
        for i in 0..4 {
            journal.create_file(&path, vec![b'0' + i]).unwrap();
        }
        assert_eq!(journal.undo_len(), 2);
        // three overwrites stashed, only the two still undoable remain
        assert_eq!(fs::read_dir(&stash).unwrap().count(), 2);
        let oldest = journal.entries().next().unwrap();
        assert!(matches!(oldest.operation, Operation::Create { .. }));
    }

    #[test]
    fn test_drop_removes_stash() {
        let dir = tempfile::tempdir().unwrap();
        let stash = dir.path().join(".stash");
        let file = dir.path().join("f");
        fs::write(&file, "x").unwrap();
        {
            let mut journal = Journal::new(&stash, 10);
            journal.delete(&file).unwrap();
            assert!(stash.exists());
        }
        assert!(!stash.exists());
    }
}
