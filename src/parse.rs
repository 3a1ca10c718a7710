//! Turning source files into syntax trees.
//!
//! respec does not parse Ruby itself. An [`AstProvider`] produces the
//! S-expression dump `respec_syntax::parse_sexp` reads:
//!
//! - [`RubyAstProvider`] runs the bundled `ast_dump.rb` script (needs the
//!   `parser` gem) once per file.
//! - [`DumpFileProvider`] reads a dump stored next to the file as
//!   `FILE.sexp`, for offline runs and tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use respec_core::error::RespecError;
use respec_core::patch::ContentHash;
use respec_syntax::{parse_sexp, SyntaxError, SyntaxResult, Tree};
use tempfile::TempDir;
use tracing::debug;

/// Embedded dump script.
const DUMP_SCRIPT: &str = include_str!("ast_dump.rb");

/// File name the dump script is written under.
const DUMP_SCRIPT_NAME: &str = "respec_ast_dump.rb";

/// Extension appended to a source path to find its stored dump.
pub const DUMP_EXTENSION: &str = "sexp";

// ============================================================================
// Source Files
// ============================================================================

/// A file read for conversion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the project root, `/`-separated. Part of every node
    /// identity in this file.
    pub path: String,
    /// Where the file lives on disk.
    pub abs_path: PathBuf,
    pub content: String,
    /// Hash of `content` as read, checked again before writing back.
    pub hash: ContentHash,
}

impl SourceFile {
    /// Read `abs_path`, naming it relative to `project_root` when possible.
    pub fn read(project_root: &Path, abs_path: &Path) -> Result<Self, RespecError> {
        let bytes = fs::read(abs_path)
            .map_err(|_| RespecError::file_not_found(abs_path.display().to_string()))?;
        let hash = ContentHash::compute(&bytes);
        let content = String::from_utf8(bytes).map_err(|_| {
            RespecError::parse_failed(abs_path.display().to_string(), "file is not valid UTF-8")
        })?;
        Ok(SourceFile {
            path: relative_path(project_root, abs_path),
            abs_path: abs_path.to_path_buf(),
            content,
            hash,
        })
    }
}

fn relative_path(project_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(project_root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Providers
// ============================================================================

/// Produces the syntax tree of one file.
pub trait AstProvider {
    fn parse(&self, file: &SourceFile) -> SyntaxResult<Tree>;
}

/// Reads `FILE.sexp` next to each file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpFileProvider;

impl DumpFileProvider {
    /// Where the dump for `source` is expected.
    pub fn dump_path(source: &Path) -> PathBuf {
        let mut name = source.as_os_str().to_owned();
        name.push(".");
        name.push(DUMP_EXTENSION);
        PathBuf::from(name)
    }
}

impl AstProvider for DumpFileProvider {
    fn parse(&self, file: &SourceFile) -> SyntaxResult<Tree> {
        let dump_path = Self::dump_path(&file.abs_path);
        let dump = fs::read_to_string(&dump_path).map_err(|e| {
            SyntaxError::producer(format!("cannot read {}: {}", dump_path.display(), e))
        })?;
        parse_sexp(&file.path, &file.content, &dump)
    }
}

/// Runs `ast_dump.rb` under the configured interpreter.
#[derive(Debug)]
pub struct RubyAstProvider {
    program: PathBuf,
    args: Vec<String>,
    script: PathBuf,
    // Holds the materialized script; removed on drop.
    _script_dir: TempDir,
}

impl RubyAstProvider {
    /// Resolve the interpreter and materialize the dump script.
    ///
    /// `command` is the interpreter argv; the script path and the file path
    /// are appended to it for each file.
    pub fn new(command: &[String]) -> SyntaxResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SyntaxError::producer("parser command is empty"))?;
        let program = which::which(program).map_err(|e| {
            SyntaxError::producer(format!("cannot find parser command '{}': {}", program, e))
        })?;
        let script_dir = TempDir::with_prefix("respec_parser_")
            .map_err(|e| SyntaxError::producer(format!("cannot create temp dir: {}", e)))?;
        let script = materialize_dump_script(script_dir.path())
            .map_err(|e| SyntaxError::producer(format!("cannot write dump script: {}", e)))?;
        debug!(program = %program.display(), script = %script.display(), "AST provider ready");
        Ok(RubyAstProvider {
            program,
            args: args.to_vec(),
            script,
            _script_dir: script_dir,
        })
    }
}

impl AstProvider for RubyAstProvider {
    fn parse(&self, file: &SourceFile) -> SyntaxResult<Tree> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.script)
            .arg(&file.abs_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                SyntaxError::producer(format!("cannot run {}: {}", self.program.display(), e))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyntaxError::producer(stderr.trim().to_string()));
        }
        let dump = String::from_utf8(output.stdout)
            .map_err(|_| SyntaxError::producer("AST dump is not valid UTF-8"))?;
        debug!(path = %file.path, bytes = dump.len(), "read AST dump");
        parse_sexp(&file.path, &file.content, &dump)
    }
}

/// Write the dump script into `dir`, returning its path.
fn materialize_dump_script(dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(DUMP_SCRIPT_NAME);
    fs::write(&path, DUMP_SCRIPT)?;
    Ok(path)
}
