//! Canonical on-disk locations for a target under a project root.

use std::path::{Path, PathBuf};

use crate::core::types::Target;

/// All paths derived from the project root and target identifier.
#[derive(Debug, Clone)]
pub struct TargetPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub scratch_dir: PathBuf,
    pub attempts_dir: PathBuf,
    pub input_path: PathBuf,
    pub reference_path: PathBuf,
    pub routine_path: PathBuf,
    pub output_path: PathBuf,
}

impl TargetPaths {
    pub fn new(root: impl Into<PathBuf>, target: &Target, unit_extension: &str) -> Self {
        let root = root.into();
        let state_dir = root.join(".parsegen");
        let data_dir = root.join("data").join(target.as_str());
        Self {
            root: root.clone(),
            config_path: state_dir.join("config.toml"),
            scratch_dir: state_dir.join("scratch"),
            attempts_dir: state_dir.join("attempts"),
            state_dir,
            input_path: data_dir.join(format!("{target}_sample.pdf")),
            reference_path: data_dir.join(format!("{target}_sample.csv")),
            routine_path: root
                .join("custom_parsers")
                .join(format!("{target}_parser.{unit_extension}")),
            output_path: root.join("output").join(format!("{target}_output.csv")),
        }
    }

    /// Directory for one attempt's artifacts.
    pub fn attempt_dir(&self, run_id: &str, attempt: u32) -> PathBuf {
        self.attempts_dir.join(run_id).join(attempt.to_string())
    }
}

/// Location of the config file for a root, independent of any target.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(".parsegen").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_keyed_by_target() {
        let target = Target::parse("icici").expect("target");
        let paths = TargetPaths::new("/work", &target, "py");

        assert_eq!(
            paths.input_path,
            Path::new("/work/data/icici/icici_sample.pdf")
        );
        assert_eq!(
            paths.reference_path,
            Path::new("/work/data/icici/icici_sample.csv")
        );
        assert_eq!(
            paths.routine_path,
            Path::new("/work/custom_parsers/icici_parser.py")
        );
        assert_eq!(paths.output_path, Path::new("/work/output/icici_output.csv"));
        assert_eq!(paths.config_path, config_path(Path::new("/work")));
        assert!(
            paths
                .attempt_dir("run-1", 2)
                .ends_with(".parsegen/attempts/run-1/2")
        );
    }
}
