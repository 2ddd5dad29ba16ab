//! Locating the bundled proxy binary and materializing it into the data
//! directory with the executable bit set.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::TorError;

/// Environment override naming the bundled proxy binary. Takes precedence
/// over the copy shipped next to the running executable.
pub const BUNDLE_ENV: &str = "PLUME_TOR_BUNDLE";

#[cfg(windows)]
const BINARY_NAME: &str = "tor.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "tor";

/// Copies the bundled proxy binary into `data_dir` and returns the
/// materialized path. Fails when no bundle can be located; callers fall back
/// to an externally managed instance.
pub fn materialize_binary(data_dir: &Path) -> Result<PathBuf, TorError> {
    let source = bundled_source()
        .ok_or_else(|| TorError::NoBinary("no bundled proxy binary found".into()))?;
    materialize_from(&source, data_dir)
}

/// Resolution order: [`BUNDLE_ENV`], then `tor` next to the running
/// executable.
fn bundled_source() -> Option<PathBuf> {
    if let Ok(path) = env::var(BUNDLE_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
        log::warn!("{BUNDLE_ENV} points at {} which is not a file", path.display());
    }
    let exe = env::current_exe().ok()?;
    let candidate = exe.parent()?.join(BINARY_NAME);
    candidate.is_file().then_some(candidate)
}

pub(crate) fn materialize_from(source: &Path, data_dir: &Path) -> Result<PathBuf, TorError> {
    fs::create_dir_all(data_dir)?;
    let file_name = source
        .file_name()
        .ok_or_else(|| TorError::NoBinary(format!("invalid bundle path {}", source.display())))?;
    let dest = data_dir.join(file_name);
    fs::copy(source, &dest)?;
    set_executable(&dest)?;
    log::debug!("materialized proxy binary at {}", dest.display());
    Ok(dest)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), TorError> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), TorError> {
    Ok(())
}
