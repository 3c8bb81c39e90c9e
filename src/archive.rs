use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use tar::{Archive, Builder, EntryType, Header};

use crate::error::{ImageError, Result};

const DEFAULT_FILE_MODE: u32 = 0o644;

/// Check whether a path names a gzip-compressed archive
/// Only the file name is looked at, never the content.
/// Example: "image.tar.gz" -> true, "image.tar" -> false
pub fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}

/// What a stored entry is, as far as rewriting it is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    /// Symbolic link with its target
    Symlink(String),
    /// Hard link to another entry of the archive
    HardLink(String),
}

/// One non-directory entry of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Raw body bytes (empty for links)
    pub data: Vec<u8>,
    /// Unix permission bits from the tar header
    pub mode: u32,
    /// Modification time from the tar header
    pub mtime: u64,
    pub kind: EntryKind,
}

impl Entry {
    /// Create a regular file entry with default metadata
    pub fn file(data: Vec<u8>) -> Self {
        Entry {
            data,
            mode: DEFAULT_FILE_MODE,
            mtime: 0,
            kind: EntryKind::File,
        }
    }
}

/// Ordered mapping from archive-relative name to entry.
///
/// Names are unique. Inserting an existing name replaces its entry but keeps
/// the position where the name was first seen, so iteration order always
/// follows the source archive.
#[derive(Debug, Clone, Default)]
pub struct EntryMap {
    entries: Vec<(String, Entry)>,
    index: HashMap<String, usize>,
}

impl EntryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, name: impl Into<String>, entry: Entry) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&pos) => self.entries[pos].1 = entry,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, entry));
            }
        }
    }

    /// Replace the body of an entry, keeping its metadata.
    /// A name not yet present is added as a regular file.
    pub fn set_data(&mut self, name: &str, data: Vec<u8>) {
        match self.index.get(name) {
            Some(&pos) => {
                let entry = &mut self.entries[pos].1;
                entry.data = data;
                entry.kind = EntryKind::File;
            }
            None => self.insert(name, Entry::file(data)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&pos| &self.entries[pos].1)
    }

    /// Body bytes of the named entry
    pub fn data(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(|entry| entry.data.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read every non-directory entry of a tar (or .gz/.tgz) archive into memory
pub fn read_archive(path: &Path) -> Result<EntryMap> {
    if !path.exists() {
        return Err(ImageError::NotFound(path.to_path_buf()));
    }

    let read_error = |source| ImageError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_error)?;
    let reader = BufReader::new(file);

    let entries = if is_gzip_path(path) {
        read_entries(Archive::new(GzDecoder::new(reader)))
    } else {
        read_entries(Archive::new(reader))
    }
    .map_err(read_error)?;

    debug!("Read {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Names are kept as UTF-8 so they can be written back unchanged
fn utf8_name(path: &Path) -> io::Result<String> {
    path.to_str().map(str::to_string).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("entry name is not valid UTF-8: {}", path.display()),
        )
    })
}

fn read_entries<R: Read>(mut archive: Archive<R>) -> io::Result<EntryMap> {
    let mut entries = EntryMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = utf8_name(&entry.path()?)?;
        let header = entry.header();
        let mode = header.mode()?;
        let mtime = header.mtime()?;
        let entry_type = header.entry_type();

        let kind = match entry_type {
            EntryType::Regular | EntryType::Continuous => EntryKind::File,
            EntryType::Symlink | EntryType::Link => {
                let target = match entry.link_name()? {
                    Some(target) => utf8_name(&target)?,
                    None => String::new(),
                };
                if entry_type == EntryType::Symlink {
                    EntryKind::Symlink(target)
                } else {
                    EntryKind::HardLink(target)
                }
            }
            // Directories are dropped, as are devices, fifos and global pax headers
            _ => {
                debug!("Skipping {:?} entry {}", entry_type, name);
                continue;
            }
        };

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        debug!("Read entry {} ({} bytes)", name, data.len());

        entries.insert(name, Entry { data, mode, mtime, kind });
    }

    Ok(entries)
}

/// Serialize all entries, in map order, as a tar stream into `writer`.
/// With `gzip` set the stream is compressed. Returns the inner writer once
/// the archive (and compressor) are fully finished.
pub fn write_archive<W: Write>(entries: &EntryMap, writer: W, gzip: bool) -> io::Result<W> {
    if gzip {
        let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));
        append_entries(&mut builder, entries)?;
        builder.into_inner()?.finish()
    } else {
        let mut builder = Builder::new(writer);
        append_entries(&mut builder, entries)?;
        builder.into_inner()
    }
}

fn append_entries<W: Write>(builder: &mut Builder<W>, entries: &EntryMap) -> io::Result<()> {
    for (name, entry) in entries.iter() {
        let mut header = Header::new_gnu();
        header.set_mode(entry.mode);
        header.set_mtime(entry.mtime);

        match &entry.kind {
            EntryKind::File => {
                // Size goes in the header before the body
                header.set_entry_type(EntryType::Regular);
                header.set_size(entry.data.len() as u64);
                builder.append_data(&mut header, name, entry.data.as_slice())?;
            }
            EntryKind::Symlink(target) => {
                header.set_entry_type(EntryType::Symlink);
                header.set_size(0);
                builder.append_link(&mut header, name, target)?;
            }
            EntryKind::HardLink(target) => {
                header.set_entry_type(EntryType::Link);
                header.set_size(0);
                builder.append_link(&mut header, name, target)?;
            }
        }
        debug!("Wrote entry {} ({} bytes)", name, entry.data.len());
    }

    builder.finish()
}
