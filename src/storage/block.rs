use std::fmt::Display;

use anyhow::{Error, Result};

use crate::common::{BlockNo, BLOCK_SIZE};

const U32_SIZE: usize = std::mem::size_of::<u32>();

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub file: String,
    pub block_no: BlockNo,
}

impl BlockId {
    pub fn new(file: impl Into<String>, block_no: BlockNo) -> Self {
        Self {
            file: file.into(),
            block_no,
        }
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.file, self.block_no)
    }
}

/// An owned image of a single block.
#[derive(Clone)]
pub struct Block {
    data: Box<[u8; BLOCK_SIZE]>,
}

impl Block {
    pub fn zeroed() -> Self {
        Self {
            data: Box::new([0u8; BLOCK_SIZE]),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != BLOCK_SIZE {
            return Err(Error::msg(format!(
                "Expected a block of {} bytes, got {}",
                BLOCK_SIZE,
                bytes.len()
            )));
        }
        let mut block = Self::zeroed();
        block.data.copy_from_slice(bytes);
        Ok(block)
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Overwrites `bytes.len()` bytes starting at `offset`.
    pub fn patch(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        let end = offset + bytes.len();
        if end > BLOCK_SIZE {
            return Err(Error::msg(format!(
                "Write of {} bytes at offset {} exceeds block size {}",
                bytes.len(),
                offset,
                BLOCK_SIZE
            )));
        }
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn cursor(&self) -> BlockCursor<'_> {
        BlockCursor::new(self.data())
    }
}

/// Sequential reader over a block, positioned at the start.
pub struct BlockCursor<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> BlockCursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn reset_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self.pos + count;
        if end > self.buffer.len() {
            return Err(Error::msg(format!(
                "Attempted to read {} bytes at offset {}, but the block has only {} bytes",
                count,
                self.pos,
                self.buffer.len()
            )));
        }
        let bytes = &self.buffer[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; U32_SIZE];
        bytes.copy_from_slice(self.read_bytes(U32_SIZE)?);
        Ok(u32::from_be_bytes(bytes))
    }
}

/// Accumulates the bytes of a partial block write.
#[derive(Default)]
pub struct BlockWriter {
    buffer: Vec<u8>,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u32(&mut self, val: u32) {
        self.buffer.extend_from_slice(val.to_be_bytes().as_slice());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}
