//! Piece hashing and info dictionary construction.
//!
//! Content is hashed as one logical byte stream: files are read in a fixed
//! order, and a piece that is still incomplete when a file ends is continued
//! with the first bytes of the next file. Only the very last piece may be
//! shorter than the piece length.
//!
//! ```no_run
//! use metatorrent::torrent::builder::{build, BuildOptions};
//! use metatorrent::Diagnostics;
//!
//! let mut diagnostics = Diagnostics::new();
//! let info = build("./album".as_ref(), &BuildOptions::default(), &mut diagnostics).unwrap();
//! println!("{} pieces", info.total_pieces());
//! ```

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{debug, info};

use super::info::{FileEntry, FileLayout, Info};
use crate::bencode::BDict;
use crate::error::{BuildError, Diagnostics};

pub const MIN_PIECE_LENGTH: u32 = 32 * 1024;
pub const MAX_PIECE_LENGTH: u32 = 4096 * 1024;
pub const DEFAULT_PIECE_LENGTH: u32 = 256 * 1024;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Piece length in bytes.
    pub piece_length: u32,
    /// Include files and directories whose name starts with a dot.
    pub include_hidden: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            piece_length: DEFAULT_PIECE_LENGTH,
            include_hidden: true,
        }
    }
}

/// Checks a piece length in bytes against the 32 KiB to 4096 KiB range.
pub fn validate_piece_length(piece_length: u64) -> Result<u32, BuildError> {
    if (u64::from(MIN_PIECE_LENGTH)..=u64::from(MAX_PIECE_LENGTH)).contains(&piece_length) {
        Ok(piece_length as u32)
    } else {
        Err(BuildError::PieceLengthOutOfRange(piece_length))
    }
}

/// Carry-buffer SHA-1 hasher over a sequence of byte streams.
#[derive(Debug)]
pub struct PieceHasher {
    piece_length: usize,
    carry: Vec<u8>,
    pieces: Vec<u8>,
    checkpoint: Option<Checkpoint>,
}

/// Hasher state saved before a source is streamed in.
#[derive(Debug)]
struct Checkpoint {
    pieces_len: usize,
    carry_len: usize,
    /// Carry buffer set aside at the first flush; it starts with the
    /// `carry_len` bytes the rollback needs back.
    carry: Option<Vec<u8>>,
}

impl PieceHasher {
    pub fn new(piece_length: u32) -> Result<Self, BuildError> {
        let piece_length = validate_piece_length(u64::from(piece_length))? as usize;
        Ok(Self {
            piece_length,
            carry: Vec::with_capacity(piece_length),
            pieces: Vec::new(),
            checkpoint: None,
        })
    }

    /// Streams one source to its end and returns how many bytes it held.
    /// `origin` names the source in errors.
    pub fn update<R: Read>(&mut self, mut reader: R, origin: &Path) -> Result<u64, BuildError> {
        let mut chunk = vec![0u8; READ_CHUNK.min(self.piece_length)];
        let mut read = 0u64;
        loop {
            let want = (self.piece_length - self.carry.len()).min(chunk.len());
            let n = match reader.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(BuildError::UnreadableFile {
                        path: origin.to_path_buf(),
                        source,
                    })
                }
            };
            self.carry.extend_from_slice(&chunk[..n]);
            read += n as u64;

            if self.carry.len() > self.piece_length {
                return Err(BuildError::InvalidPieceLength {
                    carry: self.carry.len(),
                    piece_length: self.piece_length,
                });
            }
            if self.carry.len() == self.piece_length {
                self.flush_piece();
            }
        }
        Ok(read)
    }

    fn flush_piece(&mut self) {
        let digest = Sha1::digest(&self.carry);
        self.pieces.extend_from_slice(&digest);
        match &mut self.checkpoint {
            Some(checkpoint) if checkpoint.carry.is_none() => {
                let fresh = Vec::with_capacity(self.piece_length);
                checkpoint.carry = Some(std::mem::replace(&mut self.carry, fresh));
            }
            _ => self.carry.clear(),
        }
    }

    /// Remembers the current state so the next source can be undone.
    fn checkpoint(&mut self) {
        self.checkpoint = Some(Checkpoint {
            pieces_len: self.pieces.len(),
            carry_len: self.carry.len(),
            carry: None,
        });
    }

    fn commit(&mut self) {
        self.checkpoint = None;
    }

    fn rollback(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            self.pieces.truncate(checkpoint.pieces_len);
            if let Some(carry) = checkpoint.carry {
                self.carry = carry;
            }
            self.carry.truncate(checkpoint.carry_len);
        }
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len() / 20
    }

    /// Hashes the final partial piece, if any, and returns every digest.
    pub fn finish(mut self) -> Vec<u8> {
        if !self.carry.is_empty() {
            self.flush_piece();
        }
        self.pieces
    }
}

/// Accumulates files into an [`Info`].
#[derive(Debug)]
pub struct InfoBuilder {
    piece_length: u32,
    hasher: PieceHasher,
    files: Vec<FileEntry>,
}

impl InfoBuilder {
    pub fn new(piece_length: u32) -> Result<Self, BuildError> {
        Ok(Self {
            piece_length,
            hasher: PieceHasher::new(piece_length)?,
            files: Vec::new(),
        })
    }

    /// Hashes `reader` as the next file. A source that fails part way is
    /// rolled back, so the pieces read as if it had never been added.
    pub fn add_file<R: Read>(
        &mut self,
        path: Vec<String>,
        reader: R,
        origin: &Path,
    ) -> Result<u64, BuildError> {
        self.hasher.checkpoint();
        match self.hasher.update(reader, origin) {
            Ok(length) => {
                self.hasher.commit();
                debug!("hashed {:?}: {} bytes", origin, length);
                self.files.push(FileEntry::new(length, path));
                Ok(length)
            }
            Err(e) => {
                self.hasher.rollback();
                Err(e)
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Finishes a single-file info; the lengths of every added source are summed.
    pub fn finish_single(self, name: String) -> Result<Info, BuildError> {
        if self.files.is_empty() {
            return Err(BuildError::NoFiles);
        }
        let length = self.files.iter().map(|f| f.length).sum();
        Ok(self.finish(name, FileLayout::Single { length }))
    }

    pub fn finish_multi(mut self, name: String) -> Result<Info, BuildError> {
        if self.files.is_empty() {
            return Err(BuildError::NoFiles);
        }
        let files = std::mem::take(&mut self.files);
        Ok(self.finish(name, FileLayout::Multi { files }))
    }

    fn finish(self, name: String, layout: FileLayout) -> Info {
        let pieces = self.hasher.finish();
        info!(
            "built {:?}: {} pieces of {} bytes",
            name,
            pieces.len() / 20,
            self.piece_length
        );
        Info {
            name: name.into_bytes(),
            piece_length: self.piece_length,
            pieces,
            private: None,
            source: None,
            layout,
            extensions: BDict::new(),
        }
    }
}

/// Builds from a single file or, for a directory, from everything below it.
pub fn build(
    source: &Path,
    options: &BuildOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Info, BuildError> {
    if source.is_dir() {
        build_dir(source, options, diagnostics)
    } else {
        build_file(source, options.piece_length)
    }
}

pub fn build_file(path: &Path, piece_length: u32) -> Result<Info, BuildError> {
    let mut builder = InfoBuilder::new(piece_length)?;
    let file = File::open(path).map_err(|source| BuildError::UnopenableFile {
        path: path.to_path_buf(),
        source,
    })?;
    let name = file_name(path);
    builder.add_file(vec![name.clone()], file, path)?;
    builder.finish_single(name)
}

/// Builds a multi-file info from an explicit list of files.
///
/// Paths are canonicalized, de-duplicated and sorted; the deepest directory
/// shared by all of them becomes the root and supplies the name. Files that
/// cannot be opened are recorded and left out.
pub fn build_files(
    paths: &[PathBuf],
    piece_length: u32,
    diagnostics: &mut Diagnostics,
) -> Result<Info, BuildError> {
    let builder = InfoBuilder::new(piece_length)?;
    let mut files: Vec<PathBuf> = paths
        .iter()
        .filter_map(|path| match fs::canonicalize(path) {
            Ok(canonical) => Some(canonical),
            Err(source) => {
                diagnostics.record(BuildError::UnopenableFile {
                    path: path.clone(),
                    source,
                });
                None
            }
        })
        .collect();
    files.sort();
    files.dedup();

    let root = common_root(&files);
    hash_files(builder, &root, &files, diagnostics)
}

/// Builds a multi-file info from every file below `dir`, rooted at `dir`.
pub fn build_dir(
    dir: &Path,
    options: &BuildOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Info, BuildError> {
    let builder = InfoBuilder::new(options.piece_length)?;
    let root = fs::canonicalize(dir).map_err(|source| BuildError::UnopenableFile {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files = walk_dir(&root, options.include_hidden, diagnostics);
    files.sort();
    hash_files(builder, &root, &files, diagnostics)
}

fn hash_files(
    mut builder: InfoBuilder,
    root: &Path,
    files: &[PathBuf],
    diagnostics: &mut Diagnostics,
) -> Result<Info, BuildError> {
    for path in files {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(source) => {
                diagnostics.record(BuildError::UnopenableFile {
                    path: path.clone(),
                    source,
                });
                continue;
            }
        };
        // the handle moves into add_file and is closed when it returns
        if let Err(e) = builder.add_file(relative_segments(root, path), file, path) {
            diagnostics.record(e);
        }
    }
    builder.finish_multi(file_name(root))
}

/// Lists every regular file below `dir`. Symlinked directories are not followed.
pub fn walk_dir(dir: &Path, include_hidden: bool, diagnostics: &mut Diagnostics) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(source) => {
                diagnostics.record(BuildError::UnopenableFile {
                    path: current,
                    source,
                });
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !include_hidden && entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            match entry.file_type() {
                Ok(t) if t.is_dir() => pending.push(path),
                Ok(t) if t.is_file() => files.push(path),
                Ok(t) if t.is_symlink() && path.is_file() => files.push(path),
                _ => {}
            }
        }
    }
    files
}

fn common_root(files: &[PathBuf]) -> PathBuf {
    let mut parents = files.iter().filter_map(|f| f.parent());
    let Some(first) = parents.next() else {
        return PathBuf::new();
    };
    let mut root: Vec<Component> = first.components().collect();
    for parent in parents {
        let shared = root
            .iter()
            .zip(parent.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        root.truncate(shared);
    }
    root.iter().collect()
}

fn relative_segments(root: &Path, path: &Path) -> Vec<String> {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "torrent".to_string())
}
