use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};

use crate::image::DockerImage;

pub struct RenderOptions {
    pub use_color: bool,
    /// Print the report as one JSON document
    pub json: bool,
}

/// Machine-readable form of the report
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageReport<'a> {
    repo_tags: Vec<String>,
    layers: Vec<String>,
    manifest: &'a Value,
    config: &'a Value,
}

/// Write a report of the image: config, tags, manifest, layers
pub fn render_image<W: Write>(
    writer: &mut W,
    image: &DockerImage,
    options: &RenderOptions,
) -> io::Result<()> {
    if options.json {
        let report = ImageReport {
            repo_tags: image.tags(),
            layers: image.layers(),
            manifest: image.manifest(),
            config: image.config(),
        };
        serde_json::to_writer_pretty(&mut *writer, &report)?;
        writeln!(writer)?;
        return writer.flush();
    }

    write_heading(writer, "Docker Image Configuration", options)?;
    write_json(writer, image.config())?;

    write_heading(writer, "Repository Tags", options)?;
    write_list(writer, &image.tags(), "No tags found.", options)?;

    write_heading(writer, "Docker Image Manifest", options)?;
    write_json(writer, image.manifest())?;

    write_heading(writer, "Docker Image Layers", options)?;
    write_list(writer, &image.layers(), "No layers found.", options)?;

    writer.flush()
}

fn write_heading<W: Write>(writer: &mut W, title: &str, options: &RenderOptions) -> io::Result<()> {
    let line = format!("--- {} ---", title);
    writeln!(writer)?;
    if options.use_color {
        writeln!(writer, "{}", line.bold().cyan())
    } else {
        writeln!(writer, "{}", line)
    }
}

fn write_json<W: Write>(writer: &mut W, value: &Value) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer)
}

fn write_list<W: Write>(
    writer: &mut W,
    items: &[String],
    empty: &str,
    options: &RenderOptions,
) -> io::Result<()> {
    if items.is_empty() {
        if options.use_color {
            return writeln!(writer, "{}", empty.dimmed());
        }
        return writeln!(writer, "{}", empty);
    }

    for item in items {
        if options.use_color {
            writeln!(writer, "- {}", item.green())?;
        } else {
            writeln!(writer, "- {}", item)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::{Path, PathBuf};
    use tar::{Builder, Header};

    fn create_image(dir: &Path, manifest: &str) -> PathBuf {
        let path = dir.join("image.tar");
        let mut builder = Builder::new(File::create(&path).unwrap());
        for (name, data) in [("manifest.json", manifest), ("config.json", r#"{"os":"linux"}"#)] {
            let mut header = Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data.as_bytes()).unwrap();
        }
        builder.finish().unwrap();
        path
    }

    fn render(image: &DockerImage, use_color: bool, json: bool) -> String {
        let mut out = Vec::new();
        render_image(&mut out, image, &RenderOptions { use_color, json }).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_render_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_image(
            dir.path(),
            r#"[{"Config":"config.json","RepoTags":["app:1"],"Layers":["l1.tar","l2.tar"]}]"#,
        );
        let image = DockerImage::open(&path).unwrap();

        let out = render(&image, false, false);
        assert!(out.contains("--- Docker Image Configuration ---"));
        assert!(out.contains("\"os\": \"linux\""));
        assert!(out.contains("--- Repository Tags ---\n- app:1\n"));
        assert!(out.contains("- l1.tar\n- l2.tar\n"));
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn test_render_empty_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_image(dir.path(), r#"[{"Config":"config.json"}]"#);
        let image = DockerImage::open(&path).unwrap();

        let out = render(&image, false, false);
        assert!(out.contains("No tags found."));
        assert!(out.contains("No layers found."));

        let colored = render(&image, true, false);
        assert!(colored.contains('\x1b'));
    }

    #[test]
    fn test_render_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_image(dir.path(), r#"[{"Config":"config.json","RepoTags":["app:1"]}]"#);
        let image = DockerImage::open(&path).unwrap();

        let out = render(&image, true, true);
        let doc: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["manifest"][0]["RepoTags"][0], "app:1");
        assert_eq!(doc["config"]["os"], "linux");
        assert_eq!(doc["repoTags"], serde_json::json!(["app:1"]));
        assert_eq!(doc["layers"], serde_json::json!([]));
    }
}
