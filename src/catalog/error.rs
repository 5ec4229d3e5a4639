use thiserror::Error;

use crate::common::{MAX_ATTRIBUTES, NAME_LENGTH};

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("cannot find table '{0}'")]
    TableNotFound(String),

    #[error("name '{0}' is longer than {} bytes", NAME_LENGTH)]
    NameTooLong(String),

    #[error("name {0:?} contains a NUL byte")]
    InvalidName(String),

    #[error("tables with more than {} attributes are not supported", MAX_ATTRIBUTES)]
    TooManyAttributes,

    #[error("multiple primary keys are declared")]
    MultiplePrimaryKeys,

    #[error("primary key not specified")]
    MissingPrimaryKey,

    #[error("primary key '{0}' does not name an attribute")]
    PrimaryKeyNotFound(String),

    #[error("attribute '{0}' is declared more than once")]
    DuplicateAttribute(String),

    #[error("char count of attribute '{0}' must be between 1 and 255")]
    InvalidCharCount(String),

    #[error("corrupt catalog: {0}")]
    CorruptCatalog(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
