use crate::models::OutputFiles;
use camino::{Utf8Path, Utf8PathBuf};

/// Suffix of the summary table written next to the input.
pub const SUMMARY_SUFFIX: &str = "-summary.tsv";

/// Suffix of the calculation table written next to the input.
pub const CALCULATION_SUFFIX: &str = "-cal.tsv";

/// Output files the external tool is expected to write for an input.
///
/// For `<dir>/<base>.<ext>` these are `<dir>/<base>-summary.tsv` and
/// `<dir>/<base>-cal.tsv`. Nothing is stored; the paths are derived again
/// whenever they are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub summary: Utf8PathBuf,
    pub calculation: Utf8PathBuf,
}

impl ArtifactPaths {
    pub fn for_input(input_path: &Utf8Path) -> Self {
        let dir = input_path.parent().unwrap_or_else(|| Utf8Path::new(""));
        let base = input_path.file_stem().unwrap_or_default();

        Self {
            summary: dir.join(format!("{}{}", base, SUMMARY_SUFFIX)),
            calculation: dir.join(format!("{}{}", base, CALCULATION_SUFFIX)),
        }
    }

    /// Keep only the artifacts that exist right now.
    ///
    /// Each file is checked on its own; a missing one is simply left out.
    pub fn existing(&self) -> OutputFiles {
        OutputFiles {
            summary: Self::if_exists(&self.summary),
            calculation: Self::if_exists(&self.calculation),
        }
    }

    fn if_exists(path: &Utf8Path) -> Option<Utf8PathBuf> {
        if path.is_file() {
            Some(path.to_path_buf())
        } else {
            tracing::debug!("Expected artifact not present: {}", path);
            None
        }
    }
}
