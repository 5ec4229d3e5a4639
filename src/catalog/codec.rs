//! Fixed width encodings used by the catalog file.
//!
//! Attribute properties are packed into a single u32:
//! ```text
//! bits 0..2   type tag (0 = int, 1 = float, 2 = char)
//! bit  2      unique flag
//! bits 8..16  char count, only set for char attributes
//! ```
//! All other bits are reserved. They are written as zero and ignored when reading.
//!
//! Names occupy exactly `NAME_LENGTH` bytes, padded with zeroes.

use super::error::{CatalogError, Result};
use super::schema::{Attribute, DataType};
use crate::common::NAME_LENGTH;

const TYPE_TAG_MASK: u32 = 0b11;
const UNIQUE_BIT: u32 = 1 << 2;
const CHAR_COUNT_SHIFT: u32 = 8;
const CHAR_COUNT_MASK: u32 = 0xff;

const TAG_INT: u32 = 0;
const TAG_FLOAT: u32 = 1;
const TAG_CHAR: u32 = 2;

pub fn encode_properties(attribute: &Attribute) -> u32 {
    let (tag, char_count) = match attribute.data_type() {
        DataType::Int => (TAG_INT, 0),
        DataType::Float => (TAG_FLOAT, 0),
        DataType::Char(count) => (TAG_CHAR, count as u32),
    };
    let mut bin = tag | (char_count << CHAR_COUNT_SHIFT);
    if attribute.unique() {
        bin |= UNIQUE_BIT;
    }
    bin
}

pub fn decode_properties(bin: u32) -> Result<(DataType, bool)> {
    let data_type = match bin & TYPE_TAG_MASK {
        TAG_INT => DataType::Int,
        TAG_FLOAT => DataType::Float,
        TAG_CHAR => DataType::Char(((bin >> CHAR_COUNT_SHIFT) & CHAR_COUNT_MASK) as u8),
        tag => {
            return Err(CatalogError::CorruptCatalog(format!(
                "unknown type tag {tag} in attribute properties {bin:#010x}"
            )))
        }
    };
    Ok((data_type, bin & UNIQUE_BIT != 0))
}

/// Fails if `name` cannot be stored in a name field.
pub fn check_name(name: &str) -> Result<()> {
    if name.contains('\0') {
        return Err(CatalogError::InvalidName(name.to_owned()));
    }
    if name.len() > NAME_LENGTH {
        return Err(CatalogError::NameTooLong(name.to_owned()));
    }
    Ok(())
}

pub fn encode_name(name: &str) -> Result<[u8; NAME_LENGTH]> {
    check_name(name)?;
    let mut field = [0u8; NAME_LENGTH];
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(field)
}

/// Reads a name up to the first zero byte. A name filling the whole field has no terminator.
pub fn decode_name(field: &[u8]) -> Result<String> {
    let field = &field[..field.len().min(NAME_LENGTH)];
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..len])
        .map(str::to_owned)
        .map_err(|e| CatalogError::CorruptCatalog(format!("name is not valid UTF-8: {e}")))
}
