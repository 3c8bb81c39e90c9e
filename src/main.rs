use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;

use retag::render::{self, RenderOptions};
use retag::DockerImage;

#[derive(Parser)]
#[command(name = "retag")]
#[command(about = "Inspect and rewrite the repository tags of Docker image archives")]
#[command(version = "0.1.0")]
struct Cli {
    /// Docker archive tar file (.tar, .tar.gz or .tgz)
    archive: PathBuf,

    /// Replace the repository tags with these (repeatable)
    #[arg(short, long = "tag", value_name = "TAG", conflicts_with = "clear_tags")]
    tags: Vec<String>,

    /// Remove all repository tags
    #[arg(long)]
    clear_tags: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// When to colorize output: auto, always, never
    #[arg(long, default_value = "auto")]
    color: String,

    /// Log progress to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // Determine if we should use color
    let use_color = match cli.color.as_str() {
        "always" => true,
        "never" => false,
        _ => atty::is(atty::Stream::Stdout),
    };

    let mut image = DockerImage::open(&cli.archive)
        .with_context(|| format!("Failed to open archive: {}", cli.archive.display()))?;

    if !cli.tags.is_empty() || cli.clear_tags {
        image
            .set_tags(cli.tags.as_slice())
            .with_context(|| format!("Failed to update tags in {}", cli.archive.display()))?;
        // Show what is now on disk
        image = DockerImage::open(&cli.archive)
            .with_context(|| format!("Failed to reopen archive: {}", cli.archive.display()))?;
    }

    let options = RenderOptions {
        use_color,
        json: cli.json,
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    render::render_image(&mut handle, &image, &options)?;

    Ok(())
}
