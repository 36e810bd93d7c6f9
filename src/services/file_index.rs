//! Background index of every file under a search directory.
//!
//! The index is built once per relink run by scanning the tree one directory
//! per task. Scans run on the tokio runtime, bounded by a semaphore sized to
//! the available parallelism; the build finishes when every directory scan has
//! been joined. A directory that cannot be read is logged and skipped, only a
//! missing or unreadable root aborts the build.
//!
//! Two entries are stored per file, the exact name and its lowercase form.
//! Lookups try the exact name first and fall back to the lowercase one. When
//! several files share a name, the one merged last wins; with concurrent scans
//! that order is not deterministic.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::{JoinHandle, JoinSet};

/// Errors that abort an index build
#[derive(Error, Debug)]
pub enum IndexBuildError {
    #[error("Search directory not found: {0}")]
    RootNotFound(Utf8PathBuf),

    #[error("Search path is not a directory: {0}")]
    RootNotDirectory(Utf8PathBuf),

    #[error("Cannot read search directory {path}: {source}")]
    RootUnreadable {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Search directory path is not valid UTF-8")]
    NonUtf8Root,

    #[error("Index build ended without producing a result")]
    Interrupted,
}

/// Tuning for an index build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    /// Maximum concurrent directory scans (at least 1).
    pub workers: usize,

    /// Descend into symlinked directories. Visited directories are tracked by
    /// canonical path so links that loop back are scanned once.
    pub follow_symlinks: bool,

    /// Deepest level scanned; the root is depth 0.
    pub max_depth: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            workers: available_workers(),
            follow_symlinks: false,
            max_depth: 64,
        }
    }
}

impl IndexOptions {
    /// Options from user settings; `worker_threads == 0` means available parallelism.
    pub fn from_settings(settings: &crate::models::RelinkSettings) -> Self {
        let workers = if settings.worker_threads == 0 {
            available_workers()
        } else {
            settings.worker_threads
        };

        Self {
            workers,
            follow_symlinks: settings.follow_symlinks,
            max_depth: settings.max_depth,
        }
    }
}

/// Hardware parallelism, never less than 1.
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

/// Filename → absolute path lookup table.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    exact: HashMap<String, Utf8PathBuf>,
    folded: HashMap<String, Utf8PathBuf>,
    directories_scanned: usize,
    directories_skipped: usize,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file under its exact and lowercase names.
    pub fn insert(&mut self, name: &str, path: Utf8PathBuf) {
        self.folded.insert(name.to_lowercase(), path.clone());
        self.exact.insert(name.to_string(), path);
    }

    /// Find a file by name: exact casing first, then case-insensitive.
    pub fn lookup(&self, filename: &str) -> Option<&Utf8Path> {
        self.exact
            .get(filename)
            .or_else(|| self.folded.get(&filename.to_lowercase()))
            .map(|path| path.as_path())
    }

    /// Number of distinct exact file names.
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    pub fn directories_scanned(&self) -> usize {
        self.directories_scanned
    }

    /// Directories that could not be read and were left out.
    pub fn directories_skipped(&self) -> usize {
        self.directories_skipped
    }

    /// Build an index of everything under `root`.
    ///
    /// Must run inside a tokio runtime. Relative roots are made absolute
    /// against the current directory so that every stored path is absolute.
    pub async fn build(root: &Utf8Path, options: &IndexOptions) -> Result<FileIndex, IndexBuildError> {
        let started = Instant::now();
        let root = absolute_root(root)?;

        let metadata = tokio::fs::metadata(&root).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IndexBuildError::RootNotFound(root.clone()),
            _ => IndexBuildError::RootUnreadable {
                path: root.clone(),
                source: e,
            },
        })?;
        if !metadata.is_dir() {
            return Err(IndexBuildError::RootNotDirectory(root));
        }

        tracing::info!(
            "Building file index for {} with {} workers",
            root,
            options.workers.max(1)
        );

        // The root is scanned up front: unlike subdirectories, failing to
        // read it is fatal.
        let root_listing = scan_directory(root.clone(), 0, options.follow_symlinks)
            .await
            .map_err(|source| IndexBuildError::RootUnreadable {
                path: root.clone(),
                source,
            })?;

        let index = crawl(&root, root_listing, options).await;

        tracing::info!(
            "File index built: {} files in {} directories ({} skipped) in {:.2}s",
            index.len(),
            index.directories_scanned,
            index.directories_skipped,
            started.elapsed().as_secs_f32()
        );

        Ok(index)
    }
}

/// Merge `root_listing` and everything below it into a new index.
///
/// Subdirectories that cannot be scanned are counted in
/// `directories_skipped` and left out.
async fn crawl(root: &Utf8Path, root_listing: DirectoryListing, options: &IndexOptions) -> FileIndex {
    let permits = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut scans: JoinSet<ScanResult> = JoinSet::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    if options.follow_symlinks {
        if let Ok(canonical) = tokio::fs::canonicalize(root).await {
            visited.insert(canonical);
        }
    }

    let mut index = FileIndex::new();
    let mut pending = vec![root_listing];

    loop {
        for listing in pending.drain(..) {
            index.directories_scanned += 1;
            for (name, path) in listing.files {
                index.insert(&name, path);
            }

            for subdir in listing.subdirs {
                let depth = listing.depth + 1;
                if depth > options.max_depth {
                    tracing::debug!("Not descending past max depth: {}", subdir);
                    continue;
                }

                if options.follow_symlinks {
                    match tokio::fs::canonicalize(&subdir).await {
                        Ok(canonical) => {
                            if !visited.insert(canonical) {
                                tracing::debug!("Skipping already visited directory: {}", subdir);
                                continue;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Skipping directory {}: {}", subdir, e);
                            index.directories_skipped += 1;
                            continue;
                        }
                    }
                }

                let permits = Arc::clone(&permits);
                let follow = options.follow_symlinks;
                scans.spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    let result = scan_directory(subdir.clone(), depth, follow).await;
                    ScanResult { dir: subdir, result }
                });
            }
        }

        let Some(joined) = scans.join_next().await else {
            break;
        };

        match joined {
            Ok(ScanResult { result: Ok(listing), .. }) => pending.push(listing),
            Ok(ScanResult { dir, result: Err(e) }) => {
                tracing::warn!("Error scanning {}: {}", dir, e);
                index.directories_skipped += 1;
            }
            Err(join_error) => {
                tracing::warn!("Directory scan task failed: {}", join_error);
                index.directories_skipped += 1;
            }
        }
    }

    index
}

struct ScanResult {
    dir: Utf8PathBuf,
    result: std::io::Result<DirectoryListing>,
}

/// Contents of one directory: its regular files and the subdirectories to visit next.
#[derive(Debug)]
struct DirectoryListing {
    depth: usize,
    files: Vec<(String, Utf8PathBuf)>,
    subdirs: Vec<Utf8PathBuf>,
}

async fn scan_directory(dir: Utf8PathBuf, depth: usize, follow_symlinks: bool) -> std::io::Result<DirectoryListing> {
    let mut listing = DirectoryListing {
        depth,
        files: Vec::new(),
        subdirs: Vec::new(),
    };

    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!("Skipping non UTF-8 file name in {}", dir);
            continue;
        };
        let path = dir.join(&name);

        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(e) => {
                tracing::debug!("Cannot stat {}: {}", path, e);
                continue;
            }
        };

        if file_type.is_file() {
            listing.files.push((name, path));
        } else if file_type.is_dir() {
            listing.subdirs.push(path);
        } else if file_type.is_symlink() {
            // Links to files are always indexed; links to directories only
            // when following is enabled.
            match tokio::fs::metadata(&path).await {
                Ok(target) if target.is_file() => listing.files.push((name, path)),
                Ok(target) if target.is_dir() && follow_symlinks => listing.subdirs.push(path),
                Ok(_) => {}
                Err(e) => tracing::debug!("Dangling symlink {}: {}", path, e),
            }
        }
    }

    Ok(listing)
}

fn absolute_root(root: &Utf8Path) -> Result<Utf8PathBuf, IndexBuildError> {
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }

    let absolute = std::path::absolute(root.as_std_path()).map_err(|source| IndexBuildError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;
    Utf8PathBuf::from_path_buf(absolute).map_err(|_| IndexBuildError::NonUtf8Root)
}

/// Result of polling an [`IndexBuild`].
#[derive(Debug)]
pub enum BuildPoll {
    Pending,
    Ready(Result<FileIndex, IndexBuildError>),
}

/// An index build running in the background.
///
/// The foreground polls it once per tick without blocking; dropping or
/// abandoning it aborts the build and discards whatever it had gathered.
#[derive(Debug)]
pub struct IndexBuild {
    task: JoinHandle<()>,
    result_rx: oneshot::Receiver<Result<FileIndex, IndexBuildError>>,
    started: Instant,
    root: Utf8PathBuf,
}

impl IndexBuild {
    /// Start building the index for `root` on `runtime`.
    pub fn spawn(runtime: &tokio::runtime::Handle, root: Utf8PathBuf, options: IndexOptions) -> Self {
        let (result_tx, result_rx) = oneshot::channel();
        let task_root = root.clone();

        let task = runtime.spawn(async move {
            let result = FileIndex::build(&task_root, &options).await;
            // The receiver is gone when the run was cancelled.
            let _ = result_tx.send(result);
        });

        Self {
            task,
            result_rx,
            started: Instant::now(),
            root,
        }
    }

    /// Check for completion without waiting.
    pub fn poll(&mut self) -> BuildPoll {
        match self.result_rx.try_recv() {
            Ok(result) => BuildPoll::Ready(result),
            Err(oneshot::error::TryRecvError::Empty) => BuildPoll::Pending,
            Err(oneshot::error::TryRecvError::Closed) => BuildPoll::Ready(Err(IndexBuildError::Interrupted)),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Stop the build without waiting for in-flight scans.
    pub fn abandon(self) {
        tracing::debug!("Abandoning index build for {}", self.root);
        self.task.abort();
    }
}

impl Drop for IndexBuild {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, root)
    }

    #[test]
    fn test_lookup_prefers_exact_case() {
        let mut index = FileIndex::new();
        index.insert("Foo.png", Utf8PathBuf::from("/a/Foo.png"));
        index.insert("foo.png", Utf8PathBuf::from("/b/foo.png"));

        assert_eq!(index.lookup("Foo.png"), Some(Utf8Path::new("/a/Foo.png")));
        assert_eq!(index.lookup("foo.png"), Some(Utf8Path::new("/b/foo.png")));
    }

    #[test]
    fn test_lookup_falls_back_to_case_insensitive() {
        let mut index = FileIndex::new();
        index.insert("Foo.png", Utf8PathBuf::from("/a/Foo.png"));

        assert_eq!(index.lookup("foo.png"), Some(Utf8Path::new("/a/Foo.png")));
        assert_eq!(index.lookup("FOO.PNG"), Some(Utf8Path::new("/a/Foo.png")));
        assert_eq!(index.lookup("bar.png"), None);
    }

    #[test]
    fn test_later_insert_wins() {
        let mut index = FileIndex::new();
        index.insert("tex.png", Utf8PathBuf::from("/first/tex.png"));
        index.insert("tex.png", Utf8PathBuf::from("/second/tex.png"));

        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("tex.png"), Some(Utf8Path::new("/second/tex.png")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_build_indexes_nested_files() {
        let (_temp_dir, root) = temp_root();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("top.png"), b"x").unwrap();
        fs::write(root.join("a/mid.wav"), b"x").unwrap();
        fs::write(root.join("a/b/c/deep.exr"), b"x").unwrap();

        let index = FileIndex::build(&root, &IndexOptions::default()).await.unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.lookup("deep.exr"), Some(root.join("a/b/c/deep.exr").as_path()));
        assert_eq!(index.directories_scanned(), 4);
        assert_eq!(index.directories_skipped(), 0);
    }

    #[tokio::test]
    async fn test_build_missing_root_fails() {
        let (_temp_dir, root) = temp_root();
        let missing = root.join("nope");

        let result = FileIndex::build(&missing, &IndexOptions::default()).await;
        assert!(matches!(result, Err(IndexBuildError::RootNotFound(_))));
    }

    #[tokio::test]
    async fn test_build_file_root_fails() {
        let (_temp_dir, root) = temp_root();
        let file = root.join("file.txt");
        fs::write(&file, b"x").unwrap();

        let result = FileIndex::build(&file, &IndexOptions::default()).await;
        assert!(matches!(result, Err(IndexBuildError::RootNotDirectory(_))));
    }

    #[tokio::test]
    async fn test_max_depth_limits_descent() {
        let (_temp_dir, root) = temp_root();
        fs::create_dir_all(root.join("one/two")).unwrap();
        fs::write(root.join("one/shallow.png"), b"x").unwrap();
        fs::write(root.join("one/two/deep.png"), b"x").unwrap();

        let options = IndexOptions {
            max_depth: 1,
            ..IndexOptions::default()
        };
        let index = FileIndex::build(&root, &options).await.unwrap();

        assert!(index.lookup("shallow.png").is_some());
        assert!(index.lookup("deep.png").is_none());
    }

    #[tokio::test]
    async fn test_vanished_subdirectory_is_skipped() {
        let (_temp_dir, root) = temp_root();
        fs::create_dir_all(root.join("kept")).unwrap();
        fs::create_dir_all(root.join("gone")).unwrap();
        fs::write(root.join("top.png"), b"x").unwrap();
        fs::write(root.join("kept/inner.png"), b"x").unwrap();

        // Listed while present, deleted before its own scan runs
        let listing = scan_directory(root.clone(), 0, false).await.unwrap();
        assert_eq!(listing.subdirs.len(), 2);
        fs::remove_dir(root.join("gone")).unwrap();

        let index = crawl(&root, listing, &IndexOptions::default()).await;

        assert!(index.lookup("top.png").is_some());
        assert!(index.lookup("inner.png").is_some());
        assert_eq!(index.directories_scanned(), 2);
        assert_eq!(index.directories_skipped(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_directory_link_is_skipped_when_following() {
        let (_temp_dir, root) = temp_root();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("textures");
        fs::create_dir_all(&target).unwrap();
        fs::write(root.join("top.png"), b"x").unwrap();
        std::os::unix::fs::symlink(&target, root.join("link")).unwrap();

        let listing = scan_directory(root.clone(), 0, true).await.unwrap();
        assert_eq!(listing.subdirs, vec![root.join("link")]);
        fs::remove_dir(&target).unwrap();

        let options = IndexOptions {
            follow_symlinks: true,
            ..IndexOptions::default()
        };
        let index = crawl(&root, listing, &options).await;

        assert!(index.lookup("top.png").is_some());
        assert_eq!(index.directories_scanned(), 1);
        assert_eq!(index.directories_skipped(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_terminates() {
        let (_temp_dir, root) = temp_root();
        fs::create_dir_all(root.join("loop")).unwrap();
        fs::write(root.join("loop/inside.png"), b"x").unwrap();
        std::os::unix::fs::symlink(&root, root.join("loop/back")).unwrap();

        let options = IndexOptions {
            follow_symlinks: true,
            ..IndexOptions::default()
        };
        let index = FileIndex::build(&root, &options).await.unwrap();

        assert!(index.lookup("inside.png").is_some());
        assert_eq!(index.directories_scanned(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_background_build_polls_to_ready() {
        let (_temp_dir, root) = temp_root();
        fs::write(root.join("tex1.png"), b"x").unwrap();

        let mut build = IndexBuild::spawn(&tokio::runtime::Handle::current(), root.clone(), IndexOptions::default());

        let index = loop {
            match build.poll() {
                BuildPoll::Pending => tokio::time::sleep(Duration::from_millis(5)).await,
                BuildPoll::Ready(result) => break result.unwrap(),
            }
        };

        assert_eq!(index.lookup("tex1.png"), Some(root.join("tex1.png").as_path()));
    }
}
