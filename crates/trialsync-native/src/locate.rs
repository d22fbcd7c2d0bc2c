//! Session folder lookup across rig data roots

use std::fs;
use std::path::{Path, PathBuf};

use trialsync_core::error::AvailabilityError;
use trialsync_core::session::{Session, SessionDate};

use crate::config::AcquisitionConfig;
use crate::error::{SyncError, SyncResult};

/// Expand `{h2o}` and `{date}` (YYYYMMDD) in a folder template
#[must_use]
pub fn expand_template(template: &str, water_restriction: &str, date: SessionDate) -> String {
    template
        .replace("{h2o}", water_restriction)
        .replace("{date}", &date.compact())
}

/// First existing `<root>/<h2o>/<template>` folder, roots and templates
/// tried in configuration order.
///
/// # Errors
///
/// Returns [`AvailabilityError::SessionFolderNotFound`] if no candidate
/// exists.
pub fn locate_session_dir(config: &AcquisitionConfig, water_restriction: &str, date: SessionDate) -> SyncResult<PathBuf> {
    for root in &config.rig_roots {
        for template in &config.session_dir_templates {
            let candidate = root
                .join(water_restriction)
                .join(expand_template(template, water_restriction, date));
            if candidate.is_dir() {
                tracing::debug!("Session folder for {}/{}: {}", water_restriction, date, candidate.display());
                return Ok(candidate);
            }
        }
    }

    Err(AvailabilityError::SessionFolderNotFound {
        water_restriction: water_restriction.to_string(),
        date: date.compact(),
    }
    .into())
}

/// The acquisition file in `dir` whose name ends with `suffix`; the first
/// in name order if several match.
///
/// # Errors
///
/// Returns [`SyncError::Io`] if the folder cannot be listed and
/// [`AvailabilityError::StreamNotFound`] if no file matches.
pub fn find_stream(dir: &Path, suffix: &str, session: &Session) -> SyncResult<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(suffix)))
        .collect();
    matches.sort();

    matches
        .into_iter()
        .next()
        .ok_or_else(|| AvailabilityError::StreamNotFound { session: session.key }.into())
}
