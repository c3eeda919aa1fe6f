//! Ordered append-only write queue.
//!
//! Every write for a session goes through one [`WriteQueue`]. Tasks drain in
//! FIFO order and a task leaves the queue only once its append succeeded, so
//! within one target file the on-disk order always equals the enqueue order.
//! A failed head task stalls the queue; nothing is written around it.

use std::collections::VecDeque;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LogError, Result};

/// Kinds of files a session writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// The row log.
    Log,
    /// The subtitle export.
    Subtitles,
    /// The structured export.
    Structured,
}

impl FileKind {
    /// File extension for this kind.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Log => "csv",
            Self::Subtitles => "srt",
            Self::Structured => "json",
        }
    }
}

/// Destination for appended content.
pub trait LogSink: Send {
    /// Append `content` to the file at `path`, creating it if needed.
    fn append(&mut self, path: &Path, content: &str) -> io::Result<()>;
}

/// A [`LogSink`] that appends to files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSink;

impl LogSink for FileSink {
    fn append(&mut self, path: &Path, content: &str) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()
    }
}

/// A pending write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTask {
    /// Target file.
    pub path: PathBuf,
    /// Content to append.
    pub content: String,
}

/// Ordered queue of appends for one session.
pub struct WriteQueue {
    dir: PathBuf,
    stem: String,
    tasks: VecDeque<WriteTask>,
    sink: Box<dyn LogSink>,
}

impl fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteQueue")
            .field("dir", &self.dir)
            .field("stem", &self.stem)
            .field("pending", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl WriteQueue {
    /// Create a queue writing `stem.<ext>` files under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self::with_sink(dir, stem, Box::new(FileSink))
    }

    /// Create a queue with a custom sink.
    #[must_use]
    pub fn with_sink(dir: impl Into<PathBuf>, stem: impl Into<String>, sink: Box<dyn LogSink>) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            tasks: VecDeque::new(),
            sink,
        }
    }

    /// Path of the file written for `kind`.
    #[must_use]
    pub fn target(&self, kind: FileKind) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, kind.extension()))
    }

    /// Directory the queue writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a task at the tail of the queue.
    pub fn enqueue(&mut self, content: impl Into<String>, kind: FileKind) {
        let path = self.target(kind);
        self.tasks.push_back(WriteTask {
            path,
            content: content.into(),
        });
    }

    /// Drain the queue in order, returning the number of writes performed.
    ///
    /// On failure the failing task stays at the head and the error is
    /// returned; tasks behind it are untouched.
    pub fn flush(&mut self) -> Result<usize> {
        let mut written = 0;
        while let Some(task) = self.tasks.front() {
            if let Err(source) = self.sink.append(&task.path, &task.content) {
                tracing::error!(
                    path = %task.path.display(),
                    pending = self.tasks.len(),
                    error = %source,
                    "Queued write failed; queue stalled"
                );
                return Err(LogError::write_failure(task.path.clone(), source));
            }
            self.tasks.pop_front();
            written += 1;
        }
        Ok(written)
    }

    /// Number of tasks waiting to be written.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Check if nothing is waiting to be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The task at the head of the queue, if any.
    #[must_use]
    pub fn head(&self) -> Option<&WriteTask> {
        self.tasks.front()
    }

    /// Drop every pending task, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.tasks.len();
        self.tasks.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink that records appends and fails while `fail` is set.
    #[derive(Clone, Default)]
    struct ScriptedSink {
        writes: Arc<Mutex<Vec<(PathBuf, String)>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl LogSink for ScriptedSink {
        fn append(&mut self, path: &Path, content: &str) -> io::Result<()> {
            if *self.fail.lock().unwrap() {
                return Err(io::Error::other("disk unavailable"));
            }
            self.writes
                .lock()
                .unwrap()
                .push((path.to_path_buf(), content.to_string()));
            Ok(())
        }
    }

    #[test]
    fn targets_share_stem() {
        let queue = WriteQueue::new("/rec", "recording_1");
        assert_eq!(queue.target(FileKind::Log), PathBuf::from("/rec/recording_1.csv"));
        assert_eq!(queue.target(FileKind::Subtitles), PathBuf::from("/rec/recording_1.srt"));
        assert_eq!(queue.target(FileKind::Structured), PathBuf::from("/rec/recording_1.json"));
    }

    #[test]
    fn empty_flush_is_a_no_op() {
        let sink = ScriptedSink::default();
        let mut queue = WriteQueue::with_sink("/rec", "s", Box::new(sink.clone()));
        assert_eq!(queue.flush().unwrap(), 0);
        assert!(sink.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn flush_preserves_enqueue_order() {
        let sink = ScriptedSink::default();
        let mut queue = WriteQueue::with_sink("/rec", "s", Box::new(sink.clone()));
        queue.enqueue("a", FileKind::Log);
        queue.enqueue("b", FileKind::Subtitles);
        queue.enqueue("c", FileKind::Log);

        assert_eq!(queue.flush().unwrap(), 3);
        let writes = sink.writes.lock().unwrap();
        let contents: Vec<_> = writes.iter().map(|(_, c)| c.as_str()).collect();
        assert_eq!(contents, ["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn failed_write_stalls_at_head() {
        let sink = ScriptedSink::default();
        let mut queue = WriteQueue::with_sink("/rec", "s", Box::new(sink.clone()));
        queue.enqueue("first", FileKind::Log);
        queue.enqueue("second", FileKind::Log);

        *sink.fail.lock().unwrap() = true;
        let err = queue.flush().unwrap_err();
        assert!(err.is_write_failure());
        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.head().unwrap().content, "first");

        *sink.fail.lock().unwrap() = false;
        assert_eq!(queue.flush().unwrap(), 2);
        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes[0].1, "first");
        assert_eq!(writes[1].1, "second");
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = WriteQueue::new(dir.path(), "session");
        queue.enqueue("one\n", FileKind::Log);
        queue.flush().unwrap();
        queue.enqueue("two\n", FileKind::Log);
        queue.flush().unwrap();

        let content = std::fs::read_to_string(queue.target(FileKind::Log)).unwrap();
        assert_eq!(content, "one\ntwo\n");
    }

    #[test]
    fn missing_directory_is_a_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = WriteQueue::new(dir.path().join("gone"), "session");
        queue.enqueue("row\n", FileKind::Log);
        assert!(queue.flush().unwrap_err().is_write_failure());
        assert_eq!(queue.pending(), 1);
    }
}
