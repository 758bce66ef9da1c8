use crate::models::{ExecutableSettings, ModeSetting};
use camino::{Utf8Path, Utf8PathBuf};
use std::path::absolute;
use thiserror::Error;

/// Where the application is running from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// Running from a source checkout (`cargo run`).
    Development,
    /// Running from an installed or bundled build.
    Packaged,
}

impl RuntimeMode {
    /// Pick the runtime mode.
    ///
    /// An explicit setting wins. Otherwise debug builds are treated as
    /// development and release builds as packaged.
    pub fn detect(setting: ModeSetting) -> Self {
        match setting {
            ModeSetting::Development => RuntimeMode::Development,
            ModeSetting::Packaged => RuntimeMode::Packaged,
            ModeSetting::Auto => {
                if cfg!(debug_assertions) {
                    RuntimeMode::Development
                } else {
                    RuntimeMode::Packaged
                }
            }
        }
    }

    pub fn is_packaged(&self) -> bool {
        matches!(self, RuntimeMode::Packaged)
    }
}

/// Errors from locating the external tool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("External tool not found at {path}")]
    ExecutableNotFound { path: Utf8PathBuf },
}

/// Append the platform executable suffix (`.exe` on Windows) if it is missing.
pub fn executable_file_name(name: &str) -> String {
    let suffix = std::env::consts::EXE_SUFFIX;
    if suffix.is_empty() || name.to_ascii_lowercase().ends_with(suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

/// Resolve the path of the external tool.
///
/// Pure: picks the base directory for `mode` and joins the platform file
/// name. Existence is checked separately by [`locate_executable`].
pub fn resolve_executable_path(
    mode: RuntimeMode,
    development_base_dir: &Utf8Path,
    packaged_base_dir: &Utf8Path,
    executable_name: &str,
) -> Utf8PathBuf {
    let base = if mode.is_packaged() {
        packaged_base_dir
    } else {
        development_base_dir
    };

    base.join(executable_file_name(executable_name))
}

/// Resolve the external tool and confirm it exists.
///
/// Called fresh for every run. The error carries the absolute path that was
/// tried so the UI can show it.
pub fn locate_executable(
    mode: RuntimeMode,
    development_base_dir: &Utf8Path,
    packaged_base_dir: &Utf8Path,
    executable_name: &str,
) -> Result<Utf8PathBuf, ResolveError> {
    let resolved = resolve_executable_path(
        mode,
        development_base_dir,
        packaged_base_dir,
        executable_name,
    );
    let path = make_absolute(&resolved);

    if path.is_file() {
        tracing::debug!("Resolved external tool: {}", path);
        Ok(path)
    } else {
        tracing::warn!("External tool missing at {}", path);
        Err(ResolveError::ExecutableNotFound { path })
    }
}

fn make_absolute(path: &Utf8Path) -> Utf8PathBuf {
    absolute(path)
        .ok()
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Base directories and name used to find the external tool.
///
/// Built once from [`ExecutableSettings`]; [`ExecutableLocator::locate`] still
/// hits the filesystem on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableLocator {
    pub mode: RuntimeMode,
    pub development_dir: Utf8PathBuf,
    pub packaged_dir: Utf8PathBuf,
    pub name: String,
}

impl ExecutableLocator {
    pub fn new(
        mode: RuntimeMode,
        development_dir: impl Into<Utf8PathBuf>,
        packaged_dir: impl Into<Utf8PathBuf>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            development_dir: development_dir.into(),
            packaged_dir: packaged_dir.into(),
            name: name.into(),
        }
    }

    /// Build a locator from settings, filling in the default directories.
    ///
    /// Development: `<crate root>/bin`. Packaged: `bin` next to the running
    /// executable.
    pub fn from_settings(settings: &ExecutableSettings) -> Self {
        let development_dir = settings
            .development_dir
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("bin"));

        let packaged_dir = settings
            .packaged_dir
            .clone()
            .unwrap_or_else(default_packaged_dir);

        Self::new(
            RuntimeMode::detect(settings.mode),
            development_dir,
            packaged_dir,
            settings.name.clone(),
        )
    }

    pub fn resolve(&self) -> Utf8PathBuf {
        resolve_executable_path(
            self.mode,
            &self.development_dir,
            &self.packaged_dir,
            &self.name,
        )
    }

    pub fn locate(&self) -> Result<Utf8PathBuf, ResolveError> {
        locate_executable(
            self.mode,
            &self.development_dir,
            &self.packaged_dir,
            &self.name,
        )
    }
}

fn default_packaged_dir() -> Utf8PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("bin")))
        .and_then(|dir| Utf8PathBuf::try_from(dir).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("bin"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_development_path() {
        let path = resolve_executable_path(
            RuntimeMode::Development,
            Utf8Path::new("/src/app/bin"),
            Utf8Path::new("/opt/app/bin"),
            "calc-engine",
        );
        assert!(path.starts_with("/src/app/bin"));
    }

    #[test]
    fn test_resolve_packaged_path() {
        let path = resolve_executable_path(
            RuntimeMode::Packaged,
            Utf8Path::new("/src/app/bin"),
            Utf8Path::new("/opt/app/bin"),
            "calc-engine",
        );
        assert!(path.starts_with("/opt/app/bin"));
        assert!(path.as_str().contains("calc-engine"));
    }

    #[test]
    fn test_executable_file_name_suffix() {
        let name = executable_file_name("calc-engine");
        if cfg!(windows) {
            assert_eq!(name, "calc-engine.exe");
            assert_eq!(executable_file_name("calc-engine.EXE"), "calc-engine.EXE");
        } else {
            assert_eq!(name, "calc-engine");
        }
    }

    #[test]
    fn test_explicit_mode_wins() {
        assert_eq!(RuntimeMode::detect(ModeSetting::Packaged), RuntimeMode::Packaged);
        assert_eq!(
            RuntimeMode::detect(ModeSetting::Development),
            RuntimeMode::Development
        );
    }

    #[test]
    fn test_locate_missing_executable() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let err = locate_executable(RuntimeMode::Development, &dir, &dir, "missing-tool")
            .unwrap_err();
        let ResolveError::ExecutableNotFound { path } = err;
        assert!(path.is_absolute());
        assert!(path.as_str().contains("missing-tool"));
    }

    #[test]
    fn test_locate_existing_executable() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let exe = dir.join(executable_file_name("tool"));
        std::fs::write(&exe, b"").unwrap();

        let found = locate_executable(RuntimeMode::Packaged, Utf8Path::new("/nowhere"), &dir, "tool")
            .unwrap();
        assert_eq!(found, exe);
    }

    #[test]
    fn test_locator_checks_fresh_each_time() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let locator = ExecutableLocator::new(RuntimeMode::Development, dir.clone(), dir.clone(), "tool");

        assert!(locator.locate().is_err());

        std::fs::write(dir.join(executable_file_name("tool")), b"").unwrap();
        assert!(locator.locate().is_ok());
    }
}
