//! Read and retag `docker save` image archives.
//!
//! ```no_run
//! use retag::DockerImage;
//!
//! let mut image = DockerImage::open("image.tar")?;
//! println!("{:?}", image.tags());
//! image.set_tags(&["app:2.0", "app:latest"])?;
//! # Ok::<(), retag::ImageError>(())
//! ```

pub mod archive;
pub mod error;
pub mod image;
pub mod manifest;
pub mod render;
mod replace;

pub use error::{ImageError, Result};
pub use image::DockerImage;
