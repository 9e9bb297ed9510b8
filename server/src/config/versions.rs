//! Windows version mapping
//!
//! The UI offers friendly version strings; the container image expects its
//! own short flags. Unrecognized values pass through lowercased and trimmed
//! so new image tags keep working without a server update.

use crate::config::schema::GuestConfig;

/// UI version string -> backend flag table.
const VERSION_MAP: &[(&str, &str)] = &[
    // Windows 11
    ("11", "11"),
    ("11-pro", "11"),
    ("11-enterprise", "11e"),
    ("11-ltsc", "11l"),
    // Windows 10
    ("10", "10"),
    ("10-pro", "10"),
    ("10-enterprise", "10e"),
    ("10-ltsc", "10l"),
    // Legacy Windows
    ("8-enterprise", "8e"),
    ("8.1-enterprise", "8e"),
    ("7-ultimate", "7u"),
    ("vista-ultimate", "vu"),
    ("xp", "xp"),
    ("2000", "2k"),
    // Windows Server
    ("2025", "2025"),
    ("2022", "2022"),
    ("2019", "2019"),
    ("2016", "2016"),
    ("2012", "2012"),
    ("2008", "2008"),
    ("2003", "2003"),
];

/// The full UI-to-backend version table, for the API listing.
pub fn version_map() -> &'static [(&'static str, &'static str)] {
    VERSION_MAP
}

/// Normalize a UI-provided Windows version to the backend flag.
pub fn normalize_version(version: &str) -> String {
    let v = version.trim().to_lowercase();
    if v.is_empty() {
        return v;
    }
    VERSION_MAP
        .iter()
        .find(|(ui, _)| *ui == v)
        .map(|(_, flag)| flag.to_string())
        .unwrap_or(v)
}

/// Apply version normalization to a configuration record in place.
///
/// The one permitted in-place mutation of a request's config; everything
/// downstream treats the record as immutable.
pub fn apply_version_mapping(config: &mut GuestConfig) {
    if config.version.is_empty() {
        return;
    }
    let normalized = normalize_version(&config.version);
    if normalized != config.version {
        tracing::info!(
            from = %config.version,
            to = %normalized,
            "Normalizing Windows version"
        );
        config.version = normalized;
    }
}
