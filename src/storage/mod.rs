use std::fmt::Display;
use std::path::Path;

use anyhow::Result;

pub mod block;
pub mod file_manager;

pub use block::{Block, BlockCursor, BlockId, BlockWriter};

/// The purpose of a block file. The kind is encoded in the file extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    Catalog,
    Record,
    Index,
}

impl FileKind {
    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Catalog => "catalog",
            FileKind::Record => "record",
            FileKind::Index => "index",
        }
    }

    /// Returns the kind of a file judging by its extension, if it is a known one.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name).extension()?.to_str()?;
        [FileKind::Catalog, FileKind::Record, FileKind::Index]
            .into_iter()
            .find(|kind| kind.extension() == extension)
    }
}

impl Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Block oriented storage. Blocks are addressed by `(file, block number)`,
/// block numbers are dense and every block has exactly `BLOCK_SIZE` bytes.
pub trait BlockStore: Send + Sync {
    fn file_exists(&self, file: &str) -> bool;

    /// Creates a file holding a single zeroed block.
    fn create_file(&self, file: &str, kind: FileKind) -> Result<()>;

    /// Returns a copy of the block. Fails if the block has not been written yet.
    fn read_block(&self, block_id: &BlockId) -> Result<Block>;

    /// Writes `bytes` into the block starting at `offset`, leaving the rest of the block as it was.
    /// Writing a block past the end of the file allocates it.
    fn write_block(&self, block_id: &BlockId, bytes: &[u8], offset: usize) -> Result<()>;
}
