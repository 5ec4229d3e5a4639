use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Error, Result};
use tracing::trace;

use super::clock_replacer::ClockReplacer;
use super::PoolPos;
use crate::common::BLOCK_SIZE;
use crate::storage::file_manager::FileManager;
use crate::storage::{Block, BlockId, BlockStore, FileKind};

pub struct BufferGuard<'a> {
    buffer_manager: &'a BufferManager,
    buffer: &'a Buffer,
}

impl<'a> BufferGuard<'a> {
    fn new(buffer_manager: &'a BufferManager, buffer: &'a Buffer) -> Self {
        Self {
            buffer_manager,
            buffer,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<[u8; BLOCK_SIZE]> {
        self.buffer.data().read().unwrap()
    }

    fn write(&self) -> RwLockWriteGuard<[u8; BLOCK_SIZE]> {
        self.buffer.data().write().unwrap()
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        self.buffer_manager.unpin(self.buffer)
    }
}

struct Buffer {
    pool_pos: PoolPos,
    block_id: RwLock<Option<BlockId>>,
    data: RwLock<[u8; BLOCK_SIZE]>,
}

impl Buffer {
    fn new(pool_pos: PoolPos) -> Self {
        Self {
            pool_pos,
            block_id: RwLock::new(None),
            data: RwLock::new([0; BLOCK_SIZE]),
        }
    }

    fn block_id(&self) -> Option<BlockId> {
        self.block_id.read().unwrap().clone()
    }

    fn change_block(&self, new_block_id: BlockId) {
        let mut block_id = self.block_id.write().unwrap();
        *block_id = Some(new_block_id);
    }

    fn data(&self) -> &RwLock<[u8; BLOCK_SIZE]> {
        &self.data
    }
}

/// A fixed size pool of cached blocks in front of the FileManager.
/// Writes go through to disk before the cached image changes,
/// so a buffer never holds data that is not durable.
pub struct BufferManager {
    pool: Box<[Buffer]>,
    clock_replacer: Mutex<ClockReplacer>,
    block_id_to_pool_pos: Mutex<HashMap<BlockId, PoolPos>>,
    file_manager: FileManager,
}

impl BufferManager {
    pub fn new(file_manager: FileManager, pool_size: usize) -> Self {
        let clock_replacer = ClockReplacer::new(pool_size);
        let pool = (0..pool_size).map(Buffer::new).collect();

        Self {
            pool,
            clock_replacer: Mutex::new(clock_replacer),
            block_id_to_pool_pos: Mutex::new(HashMap::new()),
            file_manager,
        }
    }

    /// Pins the buffer holding `block_id`, loading it first if it is not cached.
    /// A block that has not been allocated on disk yet is loaded as zeroes.
    pub fn fetch(&self, block_id: &BlockId) -> Result<BufferGuard> {
        let mut block_id_to_pool_pos = self.block_id_to_pool_pos.lock().unwrap();
        let mut clock_replacer = self.clock_replacer.lock().unwrap();

        if let Some(&pool_pos) = block_id_to_pool_pos.get(block_id) {
            let buffer = &self.pool[pool_pos];
            clock_replacer.pin(pool_pos);
            return Ok(BufferGuard::new(self, buffer));
        }

        let free_pool_pos = clock_replacer.find_free_buffer().ok_or_else(|| {
            Error::msg(format!(
                "Cannot load block {}. All {} buffers are pinned",
                block_id,
                self.pool.len()
            ))
        })?;
        let buffer = &self.pool[free_pool_pos];
        Self::remove_block(&mut block_id_to_pool_pos, buffer);

        {
            let mut data = buffer.data().write().unwrap();
            if block_id.block_no < self.file_manager.block_count(&block_id.file)? {
                self.file_manager
                    .read_block(&block_id.file, block_id.block_no, data.as_mut_slice())?;
            } else {
                data.fill(0);
            }
        }
        trace!(block = %block_id, pool_pos = free_pool_pos, "loaded block into buffer");

        buffer.change_block(block_id.clone());
        block_id_to_pool_pos.insert(block_id.clone(), free_pool_pos);
        clock_replacer.pin(free_pool_pos);

        Ok(BufferGuard::new(self, buffer))
    }

    fn unpin(&self, buffer: &Buffer) {
        let pool_pos = buffer.pool_pos;
        let mut clock_replacer = self.clock_replacer.lock().unwrap();
        clock_replacer.unpin(pool_pos);
    }

    fn remove_block(
        block_id_to_pool_pos: &mut MutexGuard<HashMap<BlockId, PoolPos>>,
        buffer: &Buffer,
    ) {
        if let Some(block_id) = buffer.block_id() {
            // a failed load leaves the stale id behind, the block may live elsewhere by now
            if block_id_to_pool_pos.get(&block_id) == Some(&buffer.pool_pos) {
                block_id_to_pool_pos.remove(&block_id);
            }
        }
    }
}

impl BlockStore for BufferManager {
    fn file_exists(&self, file: &str) -> bool {
        self.file_manager.file_exists(file)
    }

    fn create_file(&self, file: &str, kind: FileKind) -> Result<()> {
        self.file_manager.create_file(file, kind)
    }

    fn read_block(&self, block_id: &BlockId) -> Result<Block> {
        let block_count = self.file_manager.block_count(&block_id.file)?;
        if block_id.block_no >= block_count {
            return Err(Error::msg(format!(
                "Attempted to read block {}, but {} has only {} blocks",
                block_id, block_id.file, block_count
            )));
        }
        let guard = self.fetch(block_id)?;
        let data = guard.read();
        Block::from_bytes(data.as_slice())
    }

    fn write_block(&self, block_id: &BlockId, bytes: &[u8], offset: usize) -> Result<()> {
        let guard = self.fetch(block_id)?;
        let mut image = Block::from_bytes(guard.read().as_slice())?;
        image.patch(bytes, offset)?;
        self.file_manager
            .write_block(&block_id.file, block_id.block_no, image.data())?;
        guard.write().copy_from_slice(image.data());
        Ok(())
    }
}
