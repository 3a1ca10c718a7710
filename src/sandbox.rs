//! Sandbox for the dynamic analysis run.
//!
//! The instrumented suite never runs in the user's tree:
//! 1. Copy the project to a temp directory
//! 2. Overwrite spec files there with their instrumented versions
//! 3. Run the test command once, with the sandbox copy as cwd
//! 4. Read the probe payload from the metadata directory
//!
//! Child output goes to log files in the metadata directory rather than
//! pipes, so a chatty suite cannot block on a full pipe while we wait.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;
use walkdir::WalkDir;

// ============================================================================
// Errors
// ============================================================================

/// Errors from creating a sandbox or running a command in it.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox IO error: {0}")]
    Io(#[from] io::Error),

    #[error("command is empty")]
    EmptyCommand,

    #[error("command not found: {program}")]
    CommandNotFound { program: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

pub type SandboxResult<T> = Result<T, SandboxError>;

// ============================================================================
// Sandbox Configuration
// ============================================================================

/// Configuration for sandbox creation and operation.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Custom directory for sandbox (default: system temp).
    pub sandbox_dir: Option<PathBuf>,
    /// Whether to preserve sandbox on failure.
    pub keep_sandbox: bool,
    /// Command timeout.
    pub timeout: Duration,
    /// Additional environment variables for the command.
    pub extra_env: HashMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            sandbox_dir: None,
            keep_sandbox: false,
            timeout: Duration::from_secs(600),
            extra_env: HashMap::new(),
        }
    }
}

impl SandboxConfig {
    /// Enable keep_sandbox flag.
    pub fn keep_on_failure(mut self) -> Self {
        self.keep_sandbox = true;
        self
    }

    /// Set command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an environment variable for the command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// File Filtering
// ============================================================================

/// Directories never copied into the sandbox.
const EXCLUDE_DIRS: &[&str] = &[".git", ".respec", "tmp", "log", "coverage", "node_modules"];

/// Multi-component directory paths never copied into the sandbox.
const EXCLUDE_PATHS: &[&[&str]] = &[&["vendor", "bundle"]];

/// Check if a path (relative to the project root) should be excluded.
pub(crate) fn should_exclude(relative: &Path) -> bool {
    let names: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect();

    if names.iter().any(|n| EXCLUDE_DIRS.contains(&n.as_ref())) {
        return true;
    }
    EXCLUDE_PATHS.iter().any(|pattern| {
        names
            .windows(pattern.len())
            .any(|w| w.iter().zip(pattern.iter()).all(|(a, b)| a == b))
    })
}

// ============================================================================
// Symlink Handling
// ============================================================================

/// Result of checking a symlink.
#[derive(Debug)]
enum SymlinkCheck {
    /// Symlink points within the project; copy the target content.
    WithinProject(PathBuf),
    /// Symlink points outside the project; skip it.
    OutsideProject(PathBuf),
    /// Loops, broken links, permission errors.
    Error(io::Error),
}

fn check_symlink(path: &Path, project_root: &Path) -> SymlinkCheck {
    let canonical = match path.canonicalize() {
        Ok(p) => p,
        Err(e) => return SymlinkCheck::Error(e),
    };
    if canonical.starts_with(project_root) {
        SymlinkCheck::WithinProject(canonical)
    } else {
        SymlinkCheck::OutsideProject(canonical)
    }
}

// ============================================================================
// Sandbox Handle
// ============================================================================

/// Handle for a sandbox directory, managing its lifecycle.
///
/// Layout: `<root>/workspace/` mirrors the project, `<root>/.respec_meta/`
/// holds the helper, the payload and command logs. The directory is removed
/// on drop unless [`persist`](Self::persist) was called.
pub struct SandboxHandle {
    temp_dir: Option<TempDir>,
    sandbox_root: PathBuf,
    workspace_dir: PathBuf,
    meta_dir: PathBuf,
    original_root: PathBuf,
    config: SandboxConfig,
    copied_files: Vec<String>,
}

impl SandboxHandle {
    /// Create a new sandbox by copying the project.
    pub fn create(project_root: &Path, config: SandboxConfig) -> SandboxResult<Self> {
        let project_root = project_root.canonicalize()?;

        let temp_dir = if let Some(ref base) = config.sandbox_dir {
            TempDir::with_prefix_in("respec_sandbox_", base)?
        } else {
            TempDir::with_prefix("respec_sandbox_")?
        };

        let sandbox_root = temp_dir.path().to_path_buf();
        let workspace_dir = sandbox_root.join("workspace");
        let meta_dir = sandbox_root.join(".respec_meta");
        fs::create_dir_all(&workspace_dir)?;
        fs::create_dir_all(&meta_dir)?;

        let mut handle = SandboxHandle {
            temp_dir: Some(temp_dir),
            sandbox_root,
            workspace_dir,
            meta_dir,
            original_root: project_root,
            config,
            copied_files: Vec::new(),
        };
        handle.copy_project_files()?;
        debug!(
            sandbox = %handle.sandbox_root.display(),
            files = handle.copied_files.len(),
            "created sandbox"
        );
        Ok(handle)
    }

    fn copy_project_files(&mut self) -> SandboxResult<()> {
        let root = self.original_root.clone();
        for entry in WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.path()
                    .strip_prefix(&root)
                    .map(|rel| !should_exclude(rel))
                    .unwrap_or(true)
            })
        {
            let entry = entry.map_err(io::Error::other)?;
            let source_path = entry.path();
            if source_path == root {
                continue;
            }
            let relative_path = source_path.strip_prefix(&root).map_err(io::Error::other)?;
            let dest_path = self.workspace_dir.join(relative_path);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest_path)?;
                continue;
            }

            let copy_from = if entry.path_is_symlink() {
                match check_symlink(source_path, &root) {
                    SymlinkCheck::WithinProject(target) if target.is_file() => target,
                    SymlinkCheck::WithinProject(_) => continue,
                    SymlinkCheck::OutsideProject(target) => {
                        warn!(
                            "Skipping symlink outside project: {} -> {}",
                            source_path.display(),
                            target.display()
                        );
                        continue;
                    }
                    SymlinkCheck::Error(e) => {
                        warn!("Error reading symlink {}: {}", source_path.display(), e);
                        continue;
                    }
                }
            } else if entry.file_type().is_file() {
                source_path.to_path_buf()
            } else {
                continue;
            };

            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&copy_from, &dest_path)?;
            self.copied_files
                .push(relative_path.to_string_lossy().to_string());
        }
        Ok(())
    }

    /// Get the sandbox root directory.
    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    /// Get the project copy within the sandbox.
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// Get the metadata directory within the sandbox.
    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    /// Get the original project root.
    pub fn original_root(&self) -> &Path {
        &self.original_root
    }

    /// Files copied, relative to the project root.
    pub fn copied_files(&self) -> &[String] {
        &self.copied_files
    }

    /// Set an environment variable for later commands.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.extra_env.insert(key.into(), value.into());
    }

    /// Replace the sandbox copy of `relative` with `content`.
    pub fn write_file(&self, relative: &str, content: &str) -> SandboxResult<()> {
        let path = self.workspace_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Run a command in the sandbox copy.
    ///
    /// Respects the configured timeout. A command that exceeds it is killed
    /// and reported with `timed_out` set.
    pub fn run_command(&self, command: &[String]) -> SandboxResult<CommandOutcome> {
        let (program, args) = command.split_first().ok_or(SandboxError::EmptyCommand)?;
        let resolved = which::which_in(program, std::env::var_os("PATH"), &self.workspace_dir)
            .map_err(|_| SandboxError::CommandNotFound {
                program: program.clone(),
            })?;

        let stdout_log = self.meta_dir.join("command.stdout.log");
        let stderr_log = self.meta_dir.join("command.stderr.log");

        let mut cmd = Command::new(&resolved);
        cmd.args(args)
            .current_dir(&self.workspace_dir)
            .stdin(Stdio::null())
            .stdout(File::create(&stdout_log)?)
            .stderr(File::create(&stderr_log)?);

        cmd.env("RESPEC_SANDBOX", "1");
        for (key, value) in &self.config.extra_env {
            cmd.env(key, value);
        }

        let start = Instant::now();
        let timeout = self.config.timeout;
        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Wait with timeout using OS-level waiting (no polling)
        let (exit_code, success, timed_out) = match child.wait_timeout(timeout)? {
            Some(status) => (status.code(), status.success(), false),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    "Command timed out after {:?}: {:?}",
                    start.elapsed(),
                    command
                );
                (None, false, true)
            }
        };

        Ok(CommandOutcome {
            success,
            exit_code,
            timed_out,
            duration: start.elapsed(),
            command: command.to_vec(),
            stdout_log,
            stderr_log,
        })
    }

    /// Mark this sandbox to be preserved (not cleaned up on drop).
    pub fn persist(&mut self) {
        if let Some(temp_dir) = self.temp_dir.take() {
            let path = temp_dir.keep();
            self.sandbox_root = path.clone();
            self.workspace_dir = path.join("workspace");
            self.meta_dir = path.join(".respec_meta");
        }
    }

    /// Explicitly dispose the sandbox.
    ///
    /// If keep_sandbox is configured and there was an error, the sandbox is
    /// preserved and its path returned.
    pub fn dispose(mut self, had_error: bool) -> Option<PathBuf> {
        if had_error && self.config.keep_sandbox {
            self.persist();
            Some(self.sandbox_root.clone())
        } else {
            None
        }
    }
}

// ============================================================================
// Command Outcome
// ============================================================================

/// Result of running a command in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Whether the command was killed for exceeding the timeout.
    pub timed_out: bool,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub command: Vec<String>,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

impl CommandOutcome {
    /// Last `max_bytes` of the command's stderr, for log messages.
    pub fn stderr_tail(&self, max_bytes: u64) -> String {
        read_tail(&self.stderr_log, max_bytes).unwrap_or_default()
    }

    pub fn stdout(&self) -> String {
        fs::read_to_string(&self.stdout_log).unwrap_or_default()
    }
}

fn read_tail(path: &Path, max_bytes: u64) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(max_bytes)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

/// Serde helper for serializing `Duration` as `f64` seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

// ============================================================================
// Tests
// ============================================================================
