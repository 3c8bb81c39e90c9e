//! Error types for opening and rewriting image archives

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors surfaced by [`crate::DockerImage`]
#[derive(Error, Debug)]
pub enum ImageError {
    /// archive path does not exist
    #[error("tarball not found at {}", .0.display())]
    NotFound(PathBuf),

    /// i/o or tar/gzip decoding error while reading an existing archive
    #[error("failed to read archive {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest.json not found in the tarball")]
    ManifestMissing,

    /// an entry that should hold JSON could not be parsed
    #[error("malformed JSON in {name}: {source}")]
    MalformedJson {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid manifest.json format: expected a non-empty array")]
    InvalidManifestFormat,

    #[error("'Config' field not found in manifest.json")]
    ConfigFieldMissing,

    #[error("image configuration file '{0}' not found in the tarball")]
    ConfigFileMissing(String),

    /// writing the replacement archive failed; the original is untouched
    #[error("failed to write new archive at {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// both rename and copy fallback failed; the new archive is left at `temp_path`.
    /// A copy that failed partway may leave `dest` truncated or partially written.
    #[error(
        "failed to replace {} (new archive left at {}): {source}",
        .dest.display(),
        .temp_path.display()
    )]
    ReplaceFailure {
        temp_path: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ImageError {
    pub(crate) fn malformed_json(name: &str, source: serde_json::Error) -> Self {
        ImageError::MalformedJson {
            name: name.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_missing_names_entry() {
        let err = ImageError::ConfigFileMissing("abc123.json".to_string());
        assert!(err.to_string().contains("abc123.json"));
    }

    #[test]
    fn test_replace_failure_reports_temp_path() {
        let err = ImageError::ReplaceFailure {
            temp_path: PathBuf::from("/data/.image.tar.x1y2.tmp"),
            dest: PathBuf::from("/data/image.tar"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/.image.tar.x1y2.tmp"));
        assert!(msg.contains("/data/image.tar"));
    }
}
