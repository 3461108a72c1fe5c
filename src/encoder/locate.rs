use std::path::{Path, PathBuf};

use tracing::debug;

/// Name used when falling back to the system search path
pub const DEFAULT_ENCODER: &str = "ffmpeg";

/// File name of a bundled encoder shipped next to the application
pub fn bundled_file_name() -> String {
    format!("{}{}", DEFAULT_ENCODER, std::env::consts::EXE_SUFFIX)
}

/// Pick the encoder executable for a host
///
/// An explicit path always wins. Otherwise an encoder sitting next to the
/// running program is preferred, and the bare name is left to the system
/// search path.
pub fn resolve_encoder(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        debug!("Using configured encoder {:?}", path);
        return path.to_path_buf();
    }

    let adjacent = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .and_then(|dir| find_in_dir(&dir));

    match adjacent {
        Some(path) => {
            debug!("Using encoder bundled next to the application: {:?}", path);
            path
        }
        None => PathBuf::from(DEFAULT_ENCODER),
    }
}

/// Look for a bundled encoder inside `dir`
pub fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    let candidate = dir.join(bundled_file_name());
    candidate.is_file().then_some(candidate)
}
