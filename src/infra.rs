//! Infrastructure traits for abstracting I/O operations.
//!
//! The elimination and recovery engines only ever touch the working tree
//! through [`FileSystem`], and the probe only ever runs external programs
//! through [`CommandExecutor`]. Both have real implementations here; tests
//! swap in in-memory or scripted ones.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output};

/// Trait for abstracting filesystem operations.
///
/// This is the whole storage contract of the core: read full content,
/// write full content, delete, and exists, plus the directory helpers the
/// scanner and the run directory need.
pub trait FileSystem {
    /// Read the entire contents of a file into a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write a slice of bytes to a file, replacing any previous content.
    ///
    /// Missing parent directories are created.
    fn write(&self, path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Create a directory and all missing parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// List the direct children of a directory.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Size of a file in bytes.
    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

/// Real filesystem implementation that delegates to std::fs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Trait for abstracting command execution.
///
/// This trait allows for dependency injection of command execution operations,
/// enabling testing without running real commands.
pub trait CommandExecutor {
    /// Execute a command and return its exit status.
    fn status(&self, cmd: &mut Command) -> io::Result<ExitStatus>;

    /// Execute a command and return its output (stdout, stderr, status).
    fn output(&self, cmd: &mut Command) -> io::Result<Output>;

    /// Start a command without waiting for it.
    ///
    /// Used for commands that must run under a timeout or stay alive while
    /// other work happens (the serve process).
    fn spawn(&self, cmd: &mut Command) -> io::Result<Child>;

    /// Execute a command built with a closure and return its output.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bundle_slim::infra::{CommandExecutor, RealCommandExecutor};
    ///
    /// let executor = RealCommandExecutor;
    /// let output = executor.execute(|cmd| cmd.arg("--version"), "node")?;
    /// # Ok::<(), std::io::Error>(())
    /// ```
    fn execute<F>(&self, builder: F, program: &str) -> io::Result<Output>
    where
        F: FnOnce(&mut Command) -> &mut Command,
    {
        let mut cmd = Command::new(program);
        builder(&mut cmd);
        self.output(&mut cmd)
    }

    /// Build a command with a closure and start it.
    fn start<F>(&self, builder: F, program: &str) -> io::Result<Child>
    where
        F: FnOnce(&mut Command) -> &mut Command,
    {
        let mut cmd = Command::new(program);
        builder(&mut cmd);
        self.spawn(&mut cmd)
    }
}

/// Real command executor that delegates to std::process::Command.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealCommandExecutor;

impl CommandExecutor for RealCommandExecutor {
    fn status(&self, cmd: &mut Command) -> io::Result<ExitStatus> {
        cmd.status()
    }

    fn output(&self, cmd: &mut Command) -> io::Result<Output> {
        cmd.output()
    }

    fn spawn(&self, cmd: &mut Command) -> io::Result<Child> {
        cmd.spawn()
    }
}

/// Split a configured command line into the platform shell invocation.
///
/// Build and serve commands are configured as single strings
/// (`"npm run build"`), so they always go through the shell.
pub fn shell_invocation(command_line: &str) -> (&'static str, Vec<String>) {
    if cfg!(windows) {
        ("cmd", vec!["/C".to_string(), command_line.to_string()])
    } else {
        ("sh", vec!["-c".to_string(), command_line.to_string()])
    }
}

/// The program a command line starts with, used for PATH lookups.
pub fn leading_program(command_line: &str) -> Option<&str> {
    command_line
        .split_whitespace()
        .find(|token| !token.contains('='))
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory filesystem for unit tests.

    use super::FileSystem;
    use parking_lot::Mutex;
    use std::collections::{BTreeMap, BTreeSet};
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    pub(crate) struct MemoryFileSystem {
        files: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
        read_only: Arc<Mutex<BTreeSet<PathBuf>>>,
        write_budget: Arc<Mutex<BTreeMap<PathBuf, usize>>>,
    }

    impl MemoryFileSystem {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
            let fs = Self::new();
            for (path, content) in files {
                fs.insert(path, content);
            }
            fs
        }

        pub(crate) fn insert(&self, path: impl Into<PathBuf>, content: &str) {
            self.files
                .lock()
                .insert(path.into(), content.as_bytes().to_vec());
        }

        pub(crate) fn content(&self, path: impl AsRef<Path>) -> Option<String> {
            self.files
                .lock()
                .get(path.as_ref())
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        }

        pub(crate) fn deny_writes(&self, path: impl Into<PathBuf>) {
            self.read_only.lock().insert(path.into());
        }

        /// Allow `writes` more writes to `path`, then deny the rest
        pub(crate) fn deny_writes_after(&self, path: impl Into<PathBuf>, writes: usize) {
            self.write_budget.lock().insert(path.into(), writes);
        }
    }

    impl FileSystem for MemoryFileSystem {
        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            let files = self.files.lock();
            let bytes = files
                .get(path)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not found"))?;
            String::from_utf8(bytes.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        }

        fn write(&self, path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
            if self.read_only.lock().contains(path) {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "permission denied",
                ));
            }
            if let Some(left) = self.write_budget.lock().get_mut(path) {
                if *left == 0 {
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"));
                }
                *left -= 1;
            }
            self.files
                .lock()
                .insert(path.to_path_buf(), contents.as_ref().to_vec());
            Ok(())
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.files
                .lock()
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not found"))
        }

        fn exists(&self, path: &Path) -> bool {
            let is_file = self.files.lock().contains_key(path);
            is_file || self.is_dir(path)
        }

        fn is_dir(&self, path: &Path) -> bool {
            self.files
                .lock()
                .keys()
                .any(|file| file != path && file.starts_with(path))
        }

        fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
            Ok(())
        }

        fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            let files = self.files.lock();
            let mut children = BTreeSet::new();
            for file in files.keys() {
                if let Ok(rest) = file.strip_prefix(path) {
                    if let Some(first) = rest.components().next() {
                        if rest.components().count() > 0 && file != path {
                            children.insert(path.join(first.as_os_str()));
                        }
                    }
                }
            }
            if children.is_empty() {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
            }
            Ok(children.into_iter().collect())
        }

        fn file_size(&self, path: &Path) -> io::Result<u64> {
            self.files
                .lock()
                .get(path)
                .map(|bytes| bytes.len() as u64)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not found"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn test_real_filesystem_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("Button.tsx");

        let fs = RealFileSystem;
        fs.write(&file_path, b"export default function Button() {}")
            .unwrap();

        let read_content = fs.read_to_string(&file_path).unwrap();
        assert!(read_content.contains("Button"));
        assert_eq!(fs.file_size(&file_path).unwrap(), 35);
    }

    #[test]
    fn test_real_filesystem_remove_and_exists() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("Card.jsx");
        let fs = RealFileSystem;

        fs.write(&file_path, "x").unwrap();
        assert!(fs.exists(&file_path));

        fs.remove_file(&file_path).unwrap();
        assert!(!fs.exists(&file_path));
    }

    #[test]
    fn test_real_filesystem_list_dir_is_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let fs = RealFileSystem;

        fs.write(&temp_dir.path().join("b.js"), "b").unwrap();
        fs.write(&temp_dir.path().join("a.js"), "a").unwrap();
        fs.create_dir_all(&temp_dir.path().join("c")).unwrap();

        let entries = fs.list_dir(temp_dir.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.js", "b.js", "c"]);
        assert!(fs.is_dir(&temp_dir.path().join("c")));
    }

    #[test]
    fn test_real_filesystem_read_nonexistent_file_returns_error() {
        let fs = RealFileSystem;
        let result = fs.read_to_string(Path::new("/nonexistent/file.tsx"));
        assert!(result.is_err());
    }

    #[test]
    fn test_memory_filesystem_lists_direct_children_only() {
        let fs = memory::MemoryFileSystem::with_files([
            ("/app/src/App.tsx", "a"),
            ("/app/src/components/Button.tsx", "b"),
        ]);

        let children = fs.list_dir(Path::new("/app/src")).unwrap();
        assert_eq!(
            children,
            vec![
                PathBuf::from("/app/src/App.tsx"),
                PathBuf::from("/app/src/components")
            ]
        );
        assert!(fs.is_dir(Path::new("/app/src/components")));
        assert!(!fs.is_dir(Path::new("/app/src/App.tsx")));
    }

    #[test]
    fn test_memory_filesystem_denied_write_fails() {
        let fs = memory::MemoryFileSystem::new();
        fs.deny_writes("/locked.ts");
        let err = fs.write(Path::new("/locked.ts"), "x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_shell_invocation_wraps_command_line() {
        let (program, args) = shell_invocation("npm run build");
        if cfg!(windows) {
            assert_eq!(program, "cmd");
        } else {
            assert_eq!(program, "sh");
            assert_eq!(args, vec!["-c".to_string(), "npm run build".to_string()]);
        }
    }

    #[test]
    fn test_leading_program_skips_env_assignments() {
        assert_eq!(leading_program("npm run build"), Some("npm"));
        assert_eq!(leading_program("NODE_ENV=production vite build"), Some("vite"));
        assert_eq!(leading_program("   "), None);
    }

    #[test]
    #[cfg(unix)]
    fn test_real_command_executor_output_captures_stdout() {
        let executor = RealCommandExecutor;
        let output = executor.execute(|cmd| cmd.arg("hello"), "echo").unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[test]
    #[cfg(unix)]
    fn test_real_command_executor_start_spawns_child() {
        let executor = RealCommandExecutor;
        let mut child = executor
            .start(|cmd| cmd.args(["-c", "exit 0"]), "sh")
            .unwrap();
        assert!(child.wait().unwrap().success());
    }
}
