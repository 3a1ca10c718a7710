//! The Ruby side of the probe.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AnalysisResult;

/// Name of the probe method the injector calls.
pub const PROBE_NAME: &str = "respec_analyze";

/// Environment variable naming the file the helper writes its payload to.
pub const OUTPUT_ENV: &str = "RESPEC_ANALYSIS_OUTPUT";

/// File name the helper is written under.
pub const HELPER_FILE_NAME: &str = "respec_analysis_helper.rb";

/// Embedded helper script.
const HELPER_SCRIPT: &str = include_str!("analysis_helper.rb");

/// Materialize the helper script into `dir`, returning its path.
pub fn write_helper(dir: &Path) -> AnalysisResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(HELPER_FILE_NAME);
    fs::write(&path, HELPER_SCRIPT)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn helper_defines_probe_and_reads_output_env() {
        assert!(HELPER_SCRIPT.contains(&format!("def {}(", PROBE_NAME)));
        assert!(HELPER_SCRIPT.contains(OUTPUT_ENV));
    }

    #[test]
    fn write_helper_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = write_helper(&temp.path().join("support")).unwrap();
        assert_eq!(path.file_name().unwrap(), HELPER_FILE_NAME);
        assert_eq!(fs::read_to_string(path).unwrap(), HELPER_SCRIPT);
    }
}
