use std::fs::{DirEntry, File, OpenOptions};
use std::os::unix::prelude::FileExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Error, Result};
use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::FileKind;
use crate::common::{BlockNo, BLOCK_SIZE};

static ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// FileManager takes care of reading and writing blocks of files.
/// All files live inside a single directory, the data directory.
/// The extension of a file name tells what kind of data the file holds.
pub struct FileManager {
    data_directory: PathBuf,
    files: DashMap<String, FileHandle>,
}

impl FileManager {
    /// Creates a new FileManager and opens every block file found in the data directory.
    ///
    /// # Arguments
    /// * `data_directory` - The directory under which all files are stored
    ///
    pub fn new(data_directory: impl Into<PathBuf>) -> Result<Self> {
        let data_directory = data_directory.into();
        if !data_directory.is_dir() {
            return Err(Error::msg(format!(
                "Could not create file manager. {} is not a directory",
                data_directory.display()
            )));
        }

        let files = DashMap::new();
        let content = data_directory.read_dir().with_context(|| {
            format!(
                "Could not read files in data directory {}",
                data_directory.display()
            )
        })?;

        for entry in content {
            let entry = entry.with_context(|| {
                format!(
                    "Could not read entry in data directory {}",
                    data_directory.display()
                )
            })?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(kind) = FileKind::from_file_name(&name) {
                let file = open_file(entry, &name)?;
                debug!(file = %name, %kind, blocks = file.block_count(), "opened block file");
                files.insert(name, file);
            }
        }

        Ok(Self {
            data_directory,
            files,
        })
    }

    fn get_file(&self, name: &str) -> Result<Ref<String, FileHandle>> {
        self.files
            .get(name)
            .ok_or_else(|| Error::msg(format!("No data file named {}", name)))
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Returns the number of blocks in a file.
    pub fn block_count(&self, name: &str) -> Result<BlockNo> {
        Ok(self.get_file(name)?.block_count())
    }

    /// Creates a new file holding one zeroed block.
    /// Returns an error if the file already exists or if its extension does not match `kind`.
    pub fn create_file(&self, name: &str, kind: FileKind) -> Result<()> {
        if FileKind::from_file_name(name) != Some(kind) {
            return Err(Error::msg(format!(
                "File name {} does not carry the extension .{} of a {} file",
                name,
                kind.extension(),
                kind
            )));
        }
        if self.files.contains_key(name) {
            return Err(Error::msg(format!("File {} already exists", name)));
        }
        let path = self.data_directory.join(name);
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("Failed to create data file {}", name))?;

        let file = FileHandle::new(name.to_owned(), file, 0);
        file.write_block(0, ZERO_BLOCK.as_slice())?;
        self.files.insert(name.to_owned(), file);
        info!(file = %name, %kind, "created block file");

        Ok(())
    }

    /// Reads the specified block of a file into the buffer.
    pub fn read_block(&self, name: &str, block_no: BlockNo, buffer: &mut [u8]) -> Result<()> {
        let file = self.get_file(name)?;
        let block_count = file.block_count();
        if block_no >= block_count {
            return Err(Error::msg(format!(
                "Attempted to read block number {block_no} of {name}, but the file has only {block_count} blocks."
            )));
        }
        file.read_block(block_no, buffer)
    }

    /// Writes a whole block. Writing at or past the end of the file grows it,
    /// blocks in between read back as zeroes.
    pub fn write_block(&self, name: &str, block_no: BlockNo, buffer: &[u8]) -> Result<()> {
        if buffer.len() != BLOCK_SIZE {
            return Err(Error::msg(format!(
                "Attempted to write {} bytes to block {} of {}, expected exactly {}",
                buffer.len(),
                block_no,
                name,
                BLOCK_SIZE
            )));
        }
        let file = self.get_file(name)?;
        file.write_block(block_no, buffer)
    }
}

struct FileHandle {
    name: String,
    file: File,
    filesize: AtomicU64,
}

impl FileHandle {
    fn new(name: String, file: File, filesize: u64) -> Self {
        Self {
            name,
            file,
            filesize: AtomicU64::new(filesize),
        }
    }

    fn filesize(&self) -> u64 {
        self.filesize.load(Ordering::Relaxed)
    }

    fn block_count(&self) -> BlockNo {
        (self.filesize() / BLOCK_SIZE as u64) as BlockNo
    }

    fn read_block(&self, block_no: BlockNo, buffer: &mut [u8]) -> Result<()> {
        let offset = block_no as u64 * BLOCK_SIZE as u64;
        self.file.read_exact_at(buffer, offset).with_context(|| {
            format!(
                "Could not read block {} at offset {} of {}",
                block_no, offset, self.name
            )
        })?;

        Ok(())
    }

    fn write_block(&self, block_no: BlockNo, buffer: &[u8]) -> Result<()> {
        let offset = block_no as u64 * BLOCK_SIZE as u64;
        self.file.write_all_at(buffer, offset).with_context(|| {
            format!(
                "Failed to write block {} at offset {} of {}",
                block_no, offset, self.name
            )
        })?;
        self.file.sync_all().with_context(|| {
            format!(
                "Failed to sync data when writing block {} of {}",
                block_no, self.name
            )
        })?;
        self.filesize
            .fetch_max(offset + BLOCK_SIZE as u64, Ordering::Relaxed);

        Ok(())
    }
}

/// Opens a block file for reading and writing.
/// An empty file is what a crash between creating a file and writing its first block leaves behind.
/// It gets its zeroed first block now.
fn open_file(entry: DirEntry, name: &str) -> Result<FileHandle> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(entry.path())
        .with_context(|| format!("Could not open data file {}", name))?;

    let size = file
        .metadata()
        .with_context(|| format!("Could not read size of {}", name))?
        .len();

    if size == 0 {
        warn!(file = %name, "data file is empty, initializing its first block");
        let file = FileHandle::new(name.to_owned(), file, 0);
        file.write_block(0, ZERO_BLOCK.as_slice())?;
        return Ok(file);
    } else if size % BLOCK_SIZE as u64 != 0 {
        return Err(Error::msg(format!(
            "Boundary check for {} failed. {} is not divisable by block size {}",
            name, size, BLOCK_SIZE
        )));
    }

    Ok(FileHandle::new(name.to_owned(), file, size))
}
