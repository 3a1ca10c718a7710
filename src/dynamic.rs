//! Batch dynamic analysis.
//!
//! One run covers every file: all requested nodes are instrumented, the
//! sandboxed suite is started once, and the probe payload comes back as a
//! single [`RuntimeData`]. Anything that goes wrong on the way (spawn
//! failure, timeout, non-zero exit, missing or garbled payload) degrades to
//! empty runtime data, which leaves every rule on its static answer.

use std::fs;
use std::path::Path;

use respec_analysis::{
    instrument, write_helper, AnalysisError, AnalysisRegistry, RuntimeData, OUTPUT_ENV,
};
use respec_syntax::Tree;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::sandbox::{SandboxConfig, SandboxError, SandboxHandle};

/// File in the sandbox metadata directory the probe writes to.
const PAYLOAD_FILE: &str = "runtime_data.json";

/// How much of the command's stderr to quote in a failure.
const STDERR_TAIL_BYTES: u64 = 2048;

/// Why a dynamic run produced no runtime data.
#[derive(Debug, Error)]
pub enum DynamicError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("test command timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("test command failed with exit code {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("test command wrote no runtime payload")]
    MissingPayload,
}

/// One parsed file and the requests collected on it.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisUnit<'a> {
    pub tree: &'a Tree,
    pub registry: &'a AnalysisRegistry,
}

/// Runs the instrumented project once.
#[derive(Debug, Clone)]
pub struct DynamicAnalyzer {
    config: AnalysisConfig,
}

impl DynamicAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        DynamicAnalyzer { config }
    }

    /// Runtime facts for `units`, or empty data if they cannot be had.
    pub fn analyze(&self, project_root: &Path, units: &[AnalysisUnit<'_>]) -> RuntimeData {
        if units.iter().all(|unit| unit.registry.is_empty()) {
            debug!("no analysis requests; skipping dynamic run");
            return RuntimeData::empty();
        }
        match self.try_analyze(project_root, units) {
            Ok(data) => {
                info!(nodes = data.len(), "loaded runtime facts");
                data
            }
            Err(err) => {
                warn!(error = %err, "dynamic analysis unavailable; using static classification");
                RuntimeData::empty()
            }
        }
    }

    /// Same as [`analyze`](Self::analyze), but reporting why a run failed.
    pub fn try_analyze(
        &self,
        project_root: &Path,
        units: &[AnalysisUnit<'_>],
    ) -> Result<RuntimeData, DynamicError> {
        let sandbox_config = SandboxConfig {
            keep_sandbox: self.config.keep_sandbox,
            timeout: self.config.timeout(),
            ..SandboxConfig::default()
        };
        let mut sandbox = SandboxHandle::create(project_root, sandbox_config)?;
        let result = self.run_in(&mut sandbox, units);
        if let Some(kept) = sandbox.dispose(result.is_err()) {
            warn!(path = %kept.display(), "kept sandbox of failed analysis run");
        }
        result
    }

    fn run_in(
        &self,
        sandbox: &mut SandboxHandle,
        units: &[AnalysisUnit<'_>],
    ) -> Result<RuntimeData, DynamicError> {
        let mut probes = 0;
        for unit in units.iter().filter(|unit| !unit.registry.is_empty()) {
            let instrumented = instrument(unit.tree, unit.registry);
            probes += instrumented.instrumented.len();
            sandbox.write_file(unit.tree.path(), &instrumented.source)?;
        }
        info!(files = units.len(), probes, "instrumented project");

        let helper = write_helper(sandbox.meta_dir())?;
        let payload_path = sandbox.meta_dir().join(PAYLOAD_FILE);
        let rubyopt = match std::env::var("RUBYOPT") {
            Ok(existing) if !existing.is_empty() => {
                format!("-r{} {}", helper.display(), existing)
            }
            _ => format!("-r{}", helper.display()),
        };
        sandbox.set_env("RUBYOPT", rubyopt);
        sandbox.set_env(OUTPUT_ENV, payload_path.display().to_string());

        let outcome = sandbox.run_command(&self.config.command)?;
        debug!(
            exit_code = ?outcome.exit_code,
            duration = ?outcome.duration,
            "test command finished"
        );
        if outcome.timed_out {
            return Err(DynamicError::TimedOut {
                secs: self.config.timeout_secs,
            });
        }
        if !outcome.success {
            return Err(DynamicError::Failed {
                exit_code: outcome.exit_code,
                stderr: outcome.stderr_tail(STDERR_TAIL_BYTES),
            });
        }

        let raw = fs::read_to_string(&payload_path).map_err(|_| DynamicError::MissingPayload)?;
        Ok(RuntimeData::load(&raw)?)
    }
}
