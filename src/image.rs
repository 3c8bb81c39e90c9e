use log::info;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::archive::{self, EntryMap};
use crate::error::Result;
use crate::manifest::{self, MANIFEST_NAME};
use crate::replace;

/// An opened `docker save` archive.
///
/// Opening reads every entry into memory and resolves the manifest and the
/// image config. All reads are served from that state; [`DockerImage::set_tags`]
/// is the only operation that touches the file again.
///
/// A handle is not synchronized: share it across threads only behind a lock.
#[derive(Debug)]
pub struct DockerImage {
    path: PathBuf,
    entries: EntryMap,
    manifest: Value,
    config: Value,
}

impl DockerImage {
    /// Read and resolve the archive at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = archive::read_archive(&path)?;
        let (manifest, config) = manifest::resolve(&entries)?;

        let image = DockerImage {
            path,
            entries,
            manifest,
            config,
        };
        info!(
            "Opened {} ({} entries, {} tags, {} layers)",
            image.path.display(),
            image.entries.len(),
            image.tags().len(),
            image.layers().len()
        );
        Ok(image)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All file entries of the archive, in archive order
    pub fn entries(&self) -> &EntryMap {
        &self.entries
    }

    /// The parsed manifest.json array
    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    /// The parsed image configuration
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// `RepoTags` of the first image; empty if absent or not an array
    pub fn tags(&self) -> Vec<String> {
        self.first_image_list(manifest::repo_tags)
    }

    /// `Layers` of the first image; empty if absent or not an array
    pub fn layers(&self) -> Vec<String> {
        self.first_image_list(manifest::layers)
    }

    fn first_image_list(&self, field: fn(&Value) -> Option<Vec<String>>) -> Vec<String> {
        manifest::first_image(&self.manifest)
            .ok()
            .and_then(field)
            .unwrap_or_default()
    }

    /// Replace the tags of the first image and rewrite the archive in place.
    ///
    /// The new archive is fully written next to the original before it
    /// replaces it, so on error the file on disk is the original one.
    pub fn set_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Result<()> {
        let tags: Vec<String> = tags.iter().map(|t| t.as_ref().to_string()).collect();

        manifest::set_repo_tags(&mut self.manifest, &tags)?;
        let bytes = manifest::to_bytes(&self.manifest)?;
        self.entries.set_data(MANIFEST_NAME, bytes);

        replace::replace_archive(&self.entries, &self.path)?;
        info!("Set {} tags on {}", tags.len(), self.path.display());
        Ok(())
    }
}
