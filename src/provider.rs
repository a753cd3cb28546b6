//! File provider abstraction over the two supported input sources: an
//! ISO-9660 disc image, and a native directory tree (spec §6).
//!
//! The core never touches `std::fs` directly outside this module — every
//! walker and adapter is handed an already-open byte stream through a
//! `FileProvider`, so the same decode path runs unmodified against either
//! source.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::PathBuf;
use walkdir::WalkDir;

/// A stream that is both readable and seekable, the minimum the core's
/// file-backed readers need.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

pub trait FileProvider {
    /// Every path in the source, in an unspecified but stable order.
    fn list(&self) -> io::Result<Vec<String>>;
    fn open(&self, path: &str) -> io::Result<Box<dyn ReadSeek>>;
}

/// Walks a native directory tree with `walkdir`, the same crate the pack's
/// `nether-cli` reaches for over hand-rolled `std::fs::read_dir` recursion.
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileProvider for DirectoryProvider {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            out.push(relative);
        }
        out.sort();
        Ok(out)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(self.root.join(path))?))
    }
}

/// Reads a plain ISO-9660 volume: no Joliet or Rock Ridge extensions are
/// needed since the source discs are plain ISO-9660 (spec.md §6).
pub struct Iso9660Provider {
    image: PathBuf,
}

impl Iso9660Provider {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self { image: image.into() }
    }

    fn open_volume(&self) -> io::Result<cdfs::ISO9660<File>> {
        let file = File::open(&self.image)?;
        cdfs::ISO9660::new(file).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn walk_directory(
        dir: &cdfs::ISODirectory<File>,
        prefix: &str,
        out: &mut Vec<String>,
    ) -> io::Result<()> {
        for entry in dir.contents() {
            let entry = entry.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            match entry {
                cdfs::DirectoryEntry::File(file) => {
                    let name = file.identifier.trim_end_matches(";1");
                    out.push(format!("{prefix}{name}"));
                }
                cdfs::DirectoryEntry::Directory(subdir) => {
                    let name = subdir.identifier.clone();
                    if name == "." || name == ".." {
                        continue;
                    }
                    Self::walk_directory(&subdir, &format!("{prefix}{name}/"), out)?;
                }
            }
        }
        Ok(())
    }
}

impl FileProvider for Iso9660Provider {
    fn list(&self) -> io::Result<Vec<String>> {
        let volume = self.open_volume()?;
        let mut out = Vec::new();
        Self::walk_directory(&volume.root, "/", &mut out)?;
        out.sort();
        Ok(out)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn ReadSeek>> {
        let volume = self.open_volume()?;
        match volume
            .open(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        {
            Some(cdfs::DirectoryEntry::File(file)) => {
                let bytes = file
                    .read()
                    .bytes()
                    .collect::<Result<Vec<u8>, _>>()?;
                Ok(Box::new(io::Cursor::new(bytes)))
            }
            Some(cdfs::DirectoryEntry::Directory(_)) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path} is a directory, not a file"),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{path} not found in ISO-9660 volume"),
            )),
        }
    }
}
