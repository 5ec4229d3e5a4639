pub type BlockNo = u32;

pub const BLOCK_SIZE: usize = 4096;

/// Width of every fixed-length name field in the catalog file.
pub const NAME_LENGTH: usize = 32;
pub const MAX_ATTRIBUTES: usize = 32;

/// Block 0 of the catalog file always holds the header.
pub const HEADER_BLOCK_NO: BlockNo = 0;
/// Terminates the table descriptor list. Never a valid descriptor block.
pub const NULL_BLOCK_NO: BlockNo = 0;

pub const TOMBSTONE_MARK: u32 = 0x8000_0000;
pub const NEXT_BLOCK_MASK: u32 = !TOMBSTONE_MARK;

pub const CATALOG_FILE_NAME: &str = "meta.catalog";
