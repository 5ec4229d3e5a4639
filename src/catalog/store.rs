use std::collections::HashSet;

use anyhow::Error;
use tracing::{debug, info};

use super::codec::{decode_name, decode_properties, encode_name, encode_properties};
use super::error::{CatalogError, Result};
use super::schema::{Attribute, Schema};
use crate::common::{
    BlockNo, CATALOG_FILE_NAME, HEADER_BLOCK_NO, MAX_ATTRIBUTES, NAME_LENGTH, NEXT_BLOCK_MASK,
    NULL_BLOCK_NO, TOMBSTONE_MARK,
};
use crate::storage::{BlockCursor, BlockId, BlockStore, BlockWriter, FileKind};

/// Position of the next pointer inside a table descriptor.
const NEXT_POINTER_OFFSET: usize = 0;

/// Block 0 of the catalog file.
///
/// ```text
/// [0..4]  block counter: next block number to allocate
/// [4..8]  table list head: block of the most recently created table, 0 if there is none
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CatalogHeader {
    pub block_counter: BlockNo,
    pub table_list_head: BlockNo,
}

impl CatalogHeader {
    pub fn empty() -> Self {
        Self {
            block_counter: HEADER_BLOCK_NO + 1,
            table_list_head: NULL_BLOCK_NO,
        }
    }

    fn parse(cursor: &mut BlockCursor) -> Result<Self> {
        let block_counter = cursor.read_u32()?;
        let table_list_head = cursor.read_u32()?;
        Ok(Self {
            block_counter,
            table_list_head,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut writer = BlockWriter::new();
        writer.write_u32(self.block_counter);
        writer.write_u32(self.table_list_head);
        writer.finish()
    }
}

/// Everything reachable from the table list head.
#[derive(Debug, Default)]
pub struct CatalogContents {
    /// live tables in list order, most recently created first
    pub tables: Vec<(BlockNo, Schema)>,
    pub dropped: usize,
}

/// Owns the layout of the catalog file: a header block followed by table descriptor blocks,
/// chained into a singly linked list through their next pointers.
///
/// Descriptor layout:
/// ```text
/// [0..4]     next pointer, the top bit marks a dropped table
/// [4..8]     attribute count
/// [8..40]    table name
/// [40..72]   primary key
/// [72..]     attribute count times (name, packed properties)
/// ```
pub struct CatalogStore<'a> {
    block_store: &'a dyn BlockStore,
}

impl<'a> CatalogStore<'a> {
    /// Opens the catalog file, creating and initializing it if it does not exist yet.
    pub fn open(block_store: &'a dyn BlockStore) -> Result<Self> {
        let this = Self { block_store };
        if !block_store.file_exists(CATALOG_FILE_NAME) {
            block_store.create_file(CATALOG_FILE_NAME, FileKind::Catalog)?;
            info!(file = CATALOG_FILE_NAME, "created catalog file");
        }

        // a zeroed header is what a crash right after creating the file leaves behind
        let header = this.read_header()?;
        if header.block_counter == 0 && header.table_list_head == NULL_BLOCK_NO {
            this.write_header(&CatalogHeader::empty())?;
        } else if header.block_counter == 0 {
            return Err(CatalogError::CorruptCatalog(format!(
                "header lists table block {} but no block was ever allocated",
                header.table_list_head
            )));
        }

        Ok(this)
    }

    fn block_id(block_no: BlockNo) -> BlockId {
        BlockId::new(CATALOG_FILE_NAME, block_no)
    }

    pub fn read_header(&self) -> Result<CatalogHeader> {
        let block = self
            .block_store
            .read_block(&Self::block_id(HEADER_BLOCK_NO))?;
        CatalogHeader::parse(&mut block.cursor())
    }

    fn write_header(&self, header: &CatalogHeader) -> Result<()> {
        self.block_store
            .write_block(&Self::block_id(HEADER_BLOCK_NO), &header.serialize(), 0)?;
        Ok(())
    }

    /// Walks the table list and decodes every descriptor that has not been dropped.
    /// Never writes.
    pub fn load(&self) -> Result<CatalogContents> {
        let header = self.read_header()?;
        let mut contents = CatalogContents::default();
        let mut visited = HashSet::new();

        let mut curr = header.table_list_head;
        while curr != NULL_BLOCK_NO {
            if curr >= header.block_counter {
                return Err(CatalogError::CorruptCatalog(format!(
                    "table list points to block {} but only blocks below {} are allocated",
                    curr, header.block_counter
                )));
            }
            if !visited.insert(curr) {
                return Err(CatalogError::CorruptCatalog(format!(
                    "table list revisits block {curr}"
                )));
            }

            let block = self.block_store.read_block(&Self::block_id(curr))?;
            let mut cursor = block.cursor();
            let next = cursor.read_u32()?;
            if next & TOMBSTONE_MARK != 0 {
                debug!(block_no = curr, "skipping dropped table");
                contents.dropped += 1;
                curr = next & NEXT_BLOCK_MASK;
                continue;
            }

            let schema = parse_descriptor(&mut cursor)
                .map_err(|e| corrupt_descriptor(curr, e))?;
            contents.tables.push((curr, schema));
            curr = next;
        }

        Ok(contents)
    }

    /// Writes `schema` to a freshly allocated block and links it in as the new list head.
    /// Returns the block number of the new descriptor.
    ///
    /// The descriptor is written before the header. If the header write does not happen,
    /// the new block is unreachable and the list is left as it was.
    pub fn append(&self, schema: &Schema) -> Result<BlockNo> {
        let header = self.read_header()?;
        let block_no = header.block_counter;
        if block_no > NEXT_BLOCK_MASK {
            return Err(CatalogError::Storage(Error::msg(format!(
                "Cannot create table {}. The catalog has run out of block numbers",
                schema.table_name()
            ))));
        }
        let descriptor = serialize_descriptor(header.table_list_head, schema)?;

        self.block_store
            .write_block(&Self::block_id(block_no), &descriptor, 0)?;
        self.write_header(&CatalogHeader {
            block_counter: block_no + 1,
            table_list_head: block_no,
        })?;
        debug!(
            table = schema.table_name(),
            block_no,
            next = header.table_list_head,
            "appended table descriptor"
        );

        Ok(block_no)
    }

    /// Marks the descriptor at `block_no` as dropped. Only its next pointer is rewritten,
    /// the block stays linked into the list.
    pub fn tombstone(&self, block_no: BlockNo) -> Result<()> {
        let block_id = Self::block_id(block_no);
        let block = self.block_store.read_block(&block_id)?;
        let mut cursor = block.cursor();
        cursor.reset_pos(NEXT_POINTER_OFFSET);
        let next = cursor.read_u32()?;
        let marked = next | TOMBSTONE_MARK;
        self.block_store.write_block(
            &block_id,
            marked.to_be_bytes().as_slice(),
            NEXT_POINTER_OFFSET,
        )?;
        debug!(block_no, next = next & NEXT_BLOCK_MASK, "tombstoned table descriptor");
        Ok(())
    }
}

fn corrupt_descriptor(block_no: BlockNo, error: CatalogError) -> CatalogError {
    match error {
        CatalogError::CorruptCatalog(msg) => {
            CatalogError::CorruptCatalog(format!("table descriptor at block {block_no}: {msg}"))
        }
        e => e,
    }
}

fn serialize_descriptor(next: BlockNo, schema: &Schema) -> Result<Vec<u8>> {
    let mut writer = BlockWriter::new();
    writer.write_u32(next);
    writer.write_u32(schema.attributes().len() as u32);
    writer.write_bytes(&encode_name(schema.table_name())?);
    writer.write_bytes(&encode_name(schema.primary_key())?);
    for attribute in schema.attributes() {
        writer.write_bytes(&encode_name(attribute.name())?);
        writer.write_u32(encode_properties(attribute));
    }
    Ok(writer.finish())
}

/// Parses a descriptor after its next pointer.
fn parse_descriptor(cursor: &mut BlockCursor) -> Result<Schema> {
    let attribute_count = cursor.read_u32()? as usize;
    if attribute_count > MAX_ATTRIBUTES {
        return Err(CatalogError::CorruptCatalog(format!(
            "{attribute_count} attributes exceed the limit of {MAX_ATTRIBUTES}"
        )));
    }
    let table_name = decode_name(cursor.read_bytes(NAME_LENGTH)?)?;
    let primary_key = decode_name(cursor.read_bytes(NAME_LENGTH)?)?;

    let mut attributes = Vec::with_capacity(attribute_count);
    for _ in 0..attribute_count {
        let name = decode_name(cursor.read_bytes(NAME_LENGTH)?)?;
        let (data_type, unique) = decode_properties(cursor.read_u32()?)?;
        attributes.push(Attribute::new(name, data_type, unique));
    }

    Ok(Schema::new(table_name, primary_key, attributes))
}
