//! Sources of outgoing files: explicit lists and (re)scanned directories

use crate::error::{Error, Result};
use crate::paths;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::path::PathBuf;
use walkdir::WalkDir;

/// A file queued for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub path: PathBuf,
    /// Scan root used to build a relative wire name (recursive mode)
    pub root: Option<PathBuf>,
    /// Fixed wire name, e.g. for a staged archive
    pub alias: Option<String>,
}

impl OutgoingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: None,
            alias: None,
        }
    }

    pub fn named(path: impl Into<PathBuf>, alias: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            root: None,
            alias: Some(alias.into()),
        }
    }

    pub fn wire_name(&self) -> Result<String> {
        match &self.alias {
            Some(a) => Ok(a.clone()),
            None => paths::wire_name(&self.path, self.root.as_deref()),
        }
    }
}

/// Directory scanner that only surfaces files it has not reported before
pub struct DirScanner {
    root: PathBuf,
    recursive: bool,
    seen: HashSet<PathBuf>,
}

impl DirScanner {
    pub fn new(root: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            root: root.into(),
            recursive,
            seen: HashSet::new(),
        }
    }

    /// New regular files since the previous scan, in file-name order.
    ///
    /// A walk error fails the whole scan and marks nothing as seen, so the
    /// next poll retries the same files.
    pub fn scan(&mut self) -> Result<Vec<OutgoingFile>> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut found = Vec::new();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| Error::Source {
                path: e.path().unwrap_or(self.root.as_path()).to_path_buf(),
                source: io::Error::from(e),
            })?;
            if !entry.file_type().is_file() || self.seen.contains(entry.path()) {
                continue;
            }
            found.push(OutgoingFile {
                path: entry.into_path(),
                root: self.recursive.then(|| self.root.clone()),
                alias: None,
            });
        }

        self.seen.extend(found.iter().map(|f| f.path.clone()));
        Ok(found)
    }
}

/// Ordered supply of files for the sender driver.
///
/// The head of the queue is only removed once the file is done with, so a
/// reconnect resumes at the same position.
pub enum PathSource {
    List(VecDeque<OutgoingFile>),
    Dir {
        scanner: DirScanner,
        queue: VecDeque<OutgoingFile>,
    },
}

impl PathSource {
    pub fn files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        PathSource::List(paths.into_iter().map(OutgoingFile::new).collect())
    }

    pub fn single(file: OutgoingFile) -> Self {
        PathSource::List(VecDeque::from([file]))
    }

    pub fn dir(root: impl Into<PathBuf>, recursive: bool) -> Self {
        PathSource::Dir {
            scanner: DirScanner::new(root, recursive),
            queue: VecDeque::new(),
        }
    }

    pub fn current(&self) -> Option<&OutgoingFile> {
        match self {
            PathSource::List(q) => q.front(),
            PathSource::Dir { queue, .. } => queue.front(),
        }
    }

    /// Drop the head after it was sent or skipped
    pub fn advance(&mut self) {
        match self {
            PathSource::List(q) => {
                q.pop_front();
            }
            PathSource::Dir { queue, .. } => {
                queue.pop_front();
            }
        }
    }

    /// Rescan for new files; true if any were queued
    pub fn refresh(&mut self) -> Result<bool> {
        match self {
            PathSource::List(_) => Ok(false),
            PathSource::Dir { scanner, queue } => {
                let found = scanner.scan()?;
                let any = !found.is_empty();
                queue.extend(found);
                Ok(any)
            }
        }
    }

    /// Whether polling may ever surface more files
    pub fn can_grow(&self) -> bool {
        matches!(self, PathSource::Dir { .. })
    }
}
