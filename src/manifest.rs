use log::debug;
use serde_json::Value;

use crate::archive::EntryMap;
use crate::error::{ImageError, Result};

/// Name of the manifest entry at the root of a `docker save` archive
pub const MANIFEST_NAME: &str = "manifest.json";

const CONFIG_FIELD: &str = "Config";
const REPO_TAGS_FIELD: &str = "RepoTags";
const LAYERS_FIELD: &str = "Layers";

/// Parse an entry body as JSON, naming the entry on failure
fn parse_json(name: &str, bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| ImageError::malformed_json(name, e))
}

/// The first image descriptor of a manifest, if the manifest is a non-empty array
pub fn first_image(manifest: &Value) -> Result<&Value> {
    manifest
        .as_array()
        .and_then(|images| images.first())
        .ok_or(ImageError::InvalidManifestFormat)
}

/// Mutable access to the first image descriptor, which must be a JSON object
pub fn first_image_mut(manifest: &mut Value) -> Result<&mut serde_json::Map<String, Value>> {
    manifest
        .as_array_mut()
        .and_then(|images| images.first_mut())
        .and_then(Value::as_object_mut)
        .ok_or(ImageError::InvalidManifestFormat)
}

/// Entry name of the image configuration referenced by `Config`
pub fn config_path(image: &Value) -> Result<&str> {
    image
        .get(CONFIG_FIELD)
        .and_then(Value::as_str)
        .ok_or(ImageError::ConfigFieldMissing)
}

/// Read a field holding an array of strings.
///
/// `None` means the field is absent or not an array; `Some(vec![])` means the
/// field is present and empty. Non-string items are kept as their JSON text.
pub fn string_list(image: &Value, field: &str) -> Option<Vec<String>> {
    let items = image.get(field)?.as_array()?;
    Some(
        items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
    )
}

pub fn repo_tags(image: &Value) -> Option<Vec<String>> {
    string_list(image, REPO_TAGS_FIELD)
}

pub fn layers(image: &Value) -> Option<Vec<String>> {
    string_list(image, LAYERS_FIELD)
}

/// Replace `RepoTags` of the first image, leaving every other field and image untouched
pub fn set_repo_tags(manifest: &mut Value, tags: &[String]) -> Result<()> {
    let image = first_image_mut(manifest)?;
    let tags = tags.iter().cloned().map(Value::String).collect();
    image.insert(REPO_TAGS_FIELD.to_string(), Value::Array(tags));
    Ok(())
}

/// Serialize a manifest the way it is stored back into the archive
pub fn to_bytes(manifest: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(manifest).map_err(|e| ImageError::malformed_json(MANIFEST_NAME, e))
}

/// Locate and parse manifest.json, then resolve and parse the config it names.
/// Returns `(manifest, config)`.
pub fn resolve(entries: &EntryMap) -> Result<(Value, Value)> {
    let manifest_bytes = entries.data(MANIFEST_NAME).ok_or(ImageError::ManifestMissing)?;
    let manifest = parse_json(MANIFEST_NAME, manifest_bytes)?;

    let config_name = config_path(first_image(&manifest)?)?;
    let config_bytes = entries
        .data(config_name)
        .ok_or_else(|| ImageError::ConfigFileMissing(config_name.to_string()))?;
    let config = parse_json(config_name, config_bytes)?;

    debug!("Resolved image config {}", config_name);
    Ok((manifest, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Entry;
    use serde_json::json;

    fn entries_with(manifest: &str, extra: &[(&str, &str)]) -> EntryMap {
        let mut entries = EntryMap::new();
        entries.insert(MANIFEST_NAME, Entry::file(manifest.as_bytes().to_vec()));
        for (name, body) in extra {
            entries.insert(*name, Entry::file(body.as_bytes().to_vec()));
        }
        entries
    }

    #[test]
    fn test_resolve_manifest() {
        let manifest_json = r#"[{
            "Config": "abc123.json",
            "RepoTags": ["alpine:latest"],
            "Layers": [
                "layer1/layer.tar",
                "layer2/layer.tar",
                "layer3/layer.tar"
            ]
        }]"#;
        let entries = entries_with(manifest_json, &[("abc123.json", r#"{"os":"linux"}"#)]);

        let (manifest, config) = resolve(&entries).unwrap();
        let image = first_image(&manifest).unwrap();
        assert_eq!(repo_tags(image), Some(vec!["alpine:latest".to_string()]));
        let layers = layers(image).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], "layer1/layer.tar");
        assert_eq!(layers[2], "layer3/layer.tar");
        assert_eq!(config["os"], "linux");
    }

    #[test]
    fn test_resolve_errors() {
        let err = resolve(&EntryMap::new()).unwrap_err();
        assert!(matches!(err, ImageError::ManifestMissing));

        let err = resolve(&entries_with("[{", &[])).unwrap_err();
        assert!(matches!(err, ImageError::MalformedJson { ref name, .. } if name == MANIFEST_NAME));

        let err = resolve(&entries_with("[]", &[])).unwrap_err();
        assert!(matches!(err, ImageError::InvalidManifestFormat));

        let err = resolve(&entries_with(r#"{"Config":"c.json"}"#, &[])).unwrap_err();
        assert!(matches!(err, ImageError::InvalidManifestFormat));

        let err = resolve(&entries_with(r#"[{"RepoTags":[]}]"#, &[])).unwrap_err();
        assert!(matches!(err, ImageError::ConfigFieldMissing));

        let err = resolve(&entries_with(r#"[{"Config":"gone.json"}]"#, &[])).unwrap_err();
        assert!(matches!(err, ImageError::ConfigFileMissing(ref name) if name == "gone.json"));

        let err =
            resolve(&entries_with(r#"[{"Config":"c.json"}]"#, &[("c.json", "not json")])).unwrap_err();
        assert!(matches!(err, ImageError::MalformedJson { ref name, .. } if name == "c.json"));
    }

    #[test]
    fn test_absent_vs_empty_lists() {
        let image = json!({"Config": "c.json", "RepoTags": [], "Layers": "oops"});
        assert_eq!(repo_tags(&image), Some(vec![]));
        assert_eq!(layers(&image), None);
        assert_eq!(repo_tags(&json!({"Config": "c.json"})), None);
    }

    #[test]
    fn test_string_list_renders_scalars() {
        let image = json!({"RepoTags": ["a:1", 2, true]});
        assert_eq!(
            repo_tags(&image),
            Some(vec!["a:1".to_string(), "2".to_string(), "true".to_string()])
        );
    }

    #[test]
    fn test_set_repo_tags_preserves_other_fields() {
        let mut manifest = json!([
            {"Config": "c.json", "RepoTags": ["a:1"], "Layers": ["l1.tar"], "LayerSources": {"x": 1}},
            {"Config": "d.json", "RepoTags": ["other:1"]}
        ]);
        set_repo_tags(&mut manifest, &["b:1".to_string(), "b:2".to_string()]).unwrap();

        assert_eq!(
            manifest,
            json!([
                {"Config": "c.json", "RepoTags": ["b:1", "b:2"], "Layers": ["l1.tar"], "LayerSources": {"x": 1}},
                {"Config": "d.json", "RepoTags": ["other:1"]}
            ])
        );

        let keys: Vec<_> = manifest[0].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["Config", "RepoTags", "Layers", "LayerSources"]);
    }

    #[test]
    fn test_set_repo_tags_requires_object_array() {
        let mut manifest = json!([]);
        assert!(matches!(
            set_repo_tags(&mut manifest, &[]),
            Err(ImageError::InvalidManifestFormat)
        ));

        let mut manifest = json!(["not an object"]);
        assert!(matches!(
            set_repo_tags(&mut manifest, &[]),
            Err(ImageError::InvalidManifestFormat)
        ));
    }

    #[test]
    fn test_to_bytes_roundtrips() {
        let manifest = json!([{"Config": "c.json", "RepoTags": ["a:1"]}]);
        let bytes = to_bytes(&manifest).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, manifest);
    }
}
