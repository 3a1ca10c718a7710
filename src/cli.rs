//! The `convert` pipeline.
//!
//! Expands the requested paths, parses every file, runs the dynamic pass
//! once for the whole batch, converts each file, and writes changed files
//! back. The binary is a thin shell over [`run_convert`].

use std::fs;
use std::path::{Path, PathBuf};

use respec_analysis::{AnalysisRegistry, RuntimeData};
use respec_core::error::RespecError;
use respec_core::output::{ConvertResponse, FileResult};
use respec_core::patch::ContentHash;
use respec_syntax::Tree;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::convert::{collect_requests, convert_tree, FileConversion};
use crate::dynamic::{AnalysisUnit, DynamicAnalyzer};
use crate::parse::{AstProvider, SourceFile};
use crate::sandbox::should_exclude;

/// Per-run inputs that are not configuration.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub project_root: PathBuf,
    /// Files or directories, absolute or relative to `project_root`. Empty
    /// means the whole project.
    pub paths: Vec<PathBuf>,
    pub dry_run: bool,
}

/// A file that made it through parsing.
struct ParsedFile {
    file: SourceFile,
    tree: Tree,
}

enum Loaded {
    Parsed(ParsedFile),
    Failed { path: String, message: String },
}

/// Run a conversion over `options.paths`.
///
/// Parse failures are recorded per file and do not stop the run. Errors are
/// returned for bad arguments (missing paths, paths outside the project) and
/// for write-back failures.
pub fn run_convert(
    options: &ConvertOptions,
    config: &Config,
    provider: &dyn AstProvider,
) -> Result<ConvertResponse, RespecError> {
    let root = fs::canonicalize(&options.project_root).map_err(|_| {
        RespecError::file_not_found(options.project_root.display().to_string())
    })?;
    let files = expand_paths(&root, &options.paths, &config.convert.spec_suffix)?;
    info!(files = files.len(), root = %root.display(), "converting");

    let mut loaded = Vec::with_capacity(files.len());
    for abs_path in &files {
        loaded.push(load(&root, abs_path, provider)?);
    }

    let rules = &config.convert.rules;
    let runtime = if config.analysis.enabled {
        let parsed: Vec<&ParsedFile> = loaded
            .iter()
            .filter_map(|entry| match entry {
                Loaded::Parsed(parsed) => Some(parsed),
                Loaded::Failed { .. } => None,
            })
            .collect();
        let registries = parsed
            .iter()
            .map(|p| collect_requests(&p.tree, rules))
            .collect::<Result<Vec<AnalysisRegistry>, _>>()?;
        let units: Vec<AnalysisUnit<'_>> = parsed
            .iter()
            .zip(&registries)
            .map(|(p, registry)| AnalysisUnit {
                tree: &p.tree,
                registry,
            })
            .collect();
        DynamicAnalyzer::new(config.analysis.clone()).analyze(&root, &units)
    } else {
        debug!("dynamic analysis disabled");
        RuntimeData::empty()
    };

    let mut results = Vec::with_capacity(loaded.len());
    let mut writes = Vec::new();
    for entry in &loaded {
        match entry {
            Loaded::Parsed(parsed) => {
                let conversion = convert_tree(&parsed.tree, rules, &runtime);
                info!(
                    path = %parsed.file.path,
                    conversions = conversion.conversions.len(),
                    notices = conversion.notices.len(),
                    "converted file"
                );
                results.push(file_result(&parsed.file.path, &conversion));
                if conversion.changed {
                    writes.push((&parsed.file, conversion.source));
                }
            }
            Loaded::Failed { path, message } => results.push(FileResult {
                path: path.clone(),
                status: "parse_error".to_string(),
                changed: false,
                conversions: Vec::new(),
                notices: Vec::new(),
                error: Some(message.clone()),
            }),
        }
    }

    if options.dry_run {
        debug!(files = writes.len(), "dry run; nothing written");
    } else {
        write_back(&writes)?;
    }

    Ok(ConvertResponse::new(
        results,
        options.dry_run,
        !runtime.is_empty(),
    ))
}

fn load(root: &Path, abs_path: &Path, provider: &dyn AstProvider) -> Result<Loaded, RespecError> {
    let file = match SourceFile::read(root, abs_path) {
        Ok(file) => file,
        Err(RespecError::ParseFailed { file, message }) => {
            warn!(path = %file, error = %message, "cannot read source");
            return Ok(Loaded::Failed {
                path: relative_display(root, abs_path).unwrap_or(file),
                message,
            });
        }
        Err(err) => return Err(err),
    };
    match provider.parse(&file) {
        Ok(tree) => Ok(Loaded::Parsed(ParsedFile { file, tree })),
        Err(err) => {
            warn!(path = %file.path, error = %err, "parse failed");
            Ok(Loaded::Failed {
                path: file.path,
                message: err.to_string(),
            })
        }
    }
}

fn file_result(path: &str, conversion: &FileConversion) -> FileResult {
    FileResult {
        path: path.to_string(),
        status: if conversion.changed {
            "converted"
        } else {
            "unchanged"
        }
        .to_string(),
        changed: conversion.changed,
        conversions: conversion.conversions.clone(),
        notices: conversion.notices.clone(),
        error: None,
    }
}

fn relative_display(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

// ============================================================================
// Path Expansion
// ============================================================================

/// Resolve `paths` to a sorted, deduplicated list of files under `root`.
///
/// Named files are taken as they are; directories contribute every file
/// ending in `suffix`, skipping the directories the sandbox skips.
pub fn expand_paths(
    root: &Path,
    paths: &[PathBuf],
    suffix: &str,
) -> Result<Vec<PathBuf>, RespecError> {
    let requested: Vec<PathBuf> = if paths.is_empty() {
        vec![root.to_path_buf()]
    } else {
        paths
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
            .collect()
    };

    let mut files = Vec::new();
    for path in requested {
        let path = fs::canonicalize(&path)
            .map_err(|_| RespecError::file_not_found(path.display().to_string()))?;
        if !path.starts_with(root) {
            return Err(RespecError::invalid_args(format!(
                "{} is outside the project root {}",
                path.display(),
                root.display()
            )));
        }
        if path.is_file() {
            files.push(path);
            continue;
        }
        for entry in WalkDir::new(&path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.path()
                    .strip_prefix(root)
                    .map(|rel| !should_exclude(rel))
                    .unwrap_or(true)
            })
        {
            let entry = entry.map_err(|e| RespecError::internal(format!("walk failed: {}", e)))?;
            if entry.file_type().is_file()
                && entry.file_name().to_string_lossy().ends_with(suffix)
            {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

// ============================================================================
// Write-back
// ============================================================================

/// Write converted files, refusing to touch any of them if one changed on
/// disk since it was read.
fn write_back(writes: &[(&SourceFile, String)]) -> Result<(), RespecError> {
    for (file, _) in writes {
        let current = fs::read(&file.abs_path).map_err(|e| RespecError::ApplyError {
            message: format!("cannot re-read file: {}", e),
            file: Some(file.path.clone()),
        })?;
        if ContentHash::compute(&current) != file.hash {
            return Err(RespecError::ApplyError {
                message: "file changed on disk since it was read".to_string(),
                file: Some(file.path.clone()),
            });
        }
    }
    for (file, content) in writes {
        fs::write(&file.abs_path, content).map_err(|e| RespecError::ApplyError {
            message: format!("cannot write file: {}", e),
            file: Some(file.path.clone()),
        })?;
        debug!(path = %file.path, bytes = content.len(), "wrote file");
    }
    Ok(())
}
