use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::Error;

use super::codec::check_name;
use super::error::{CatalogError, Result};
use crate::common::MAX_ATTRIBUTES;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataType {
    Int,
    Float,
    /// fixed length text holding the given number of characters
    Char(u8),
}

impl FromStr for DataType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            _ => {
                let count = lower
                    .strip_prefix("char(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| Error::msg(format!("Invalid data type {}", s)))?;
                let count = count
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| Error::msg(format!("Invalid char count in {}", s)))?;
                Ok(DataType::Char(count))
            }
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Char(count) => write!(f, "char({})", count),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    pub unique: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: DataType, unique: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            unique,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn unique(&self) -> bool {
        self.unique
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        if self.unique {
            write!(f, " unique")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    table_name: String,
    primary_key: String,
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(
        table_name: impl Into<String>,
        primary_key: impl Into<String>,
        attributes: Vec<Attribute>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key: primary_key.into(),
            attributes,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn find_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name().eq(name))
    }

    /// Checks everything that must hold before a schema can be written to the catalog.
    pub fn validate(&self) -> Result<()> {
        check_name(&self.table_name)?;
        if self.attributes.len() > MAX_ATTRIBUTES {
            return Err(CatalogError::TooManyAttributes);
        }
        let mut seen = HashSet::new();
        for attribute in &self.attributes {
            check_attribute(attribute)?;
            if !seen.insert(attribute.name()) {
                return Err(CatalogError::DuplicateAttribute(attribute.name.clone()));
            }
        }
        if self.primary_key.is_empty() {
            return Err(CatalogError::MissingPrimaryKey);
        }
        if self.find_attribute(&self.primary_key).is_none() {
            return Err(CatalogError::PrimaryKeyNotFound(self.primary_key.clone()));
        }
        Ok(())
    }
}

fn check_attribute(attribute: &Attribute) -> Result<()> {
    check_name(attribute.name())?;
    if attribute.data_type == DataType::Char(0) {
        return Err(CatalogError::InvalidCharCount(attribute.name.clone()));
    }
    Ok(())
}

/// A table under construction. Collects attributes and the primary key one at a time,
/// rejecting each mistake as soon as it is made.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    table_name: String,
    primary_key: Option<String>,
    attributes: Vec<Attribute>,
}

impl SchemaBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<&mut Self> {
        if self.attributes.len() >= MAX_ATTRIBUTES {
            return Err(CatalogError::TooManyAttributes);
        }
        check_attribute(&attribute)?;
        if self.attributes.iter().any(|attr| attr.name == attribute.name) {
            return Err(CatalogError::DuplicateAttribute(attribute.name));
        }
        self.attributes.push(attribute);
        Ok(self)
    }

    pub fn primary_key(&mut self, name: impl Into<String>) -> Result<&mut Self> {
        if self.primary_key.is_some() {
            return Err(CatalogError::MultiplePrimaryKeys);
        }
        self.primary_key = Some(name.into());
        Ok(self)
    }

    pub fn build(self) -> Result<Schema> {
        let primary_key = self.primary_key.ok_or(CatalogError::MissingPrimaryKey)?;
        let schema = Schema::new(self.table_name, primary_key, self.attributes);
        schema.validate()?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {

    use super::{Attribute, DataType, Schema, SchemaBuilder};
    use crate::catalog::error::CatalogError;

    #[test]
    fn parses_data_types() {
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int);
        assert_eq!("FLOAT".parse::<DataType>().unwrap(), DataType::Float);
        assert_eq!("char(16)".parse::<DataType>().unwrap(), DataType::Char(16));
        assert_eq!("Char( 8 )".parse::<DataType>().unwrap(), DataType::Char(8));
        assert!("char(256)".parse::<DataType>().is_err());
        assert!("char".parse::<DataType>().is_err());
        assert!("text".parse::<DataType>().is_err());
        assert_eq!(DataType::Char(12).to_string(), "char(12)");
    }

    #[test]
    fn builds_a_schema() {
        let mut builder = SchemaBuilder::new("accounts");
        builder
            .add_attribute(Attribute::new("id", DataType::Int, true))
            .unwrap()
            .add_attribute(Attribute::new("name", DataType::Char(20), false))
            .unwrap()
            .primary_key("id")
            .unwrap();
        let schema = builder.build().unwrap();

        assert_eq!(schema.table_name(), "accounts");
        assert_eq!(schema.primary_key(), "id");
        assert_eq!(schema.attributes().len(), 2);
        assert_eq!(
            schema.find_attribute("name").map(Attribute::data_type),
            Some(DataType::Char(20))
        );
    }

    #[test]
    fn rejects_the_33rd_attribute() {
        let mut builder = SchemaBuilder::new("wide");
        for i in 0..32 {
            builder
                .add_attribute(Attribute::new(format!("c{i}"), DataType::Int, false))
                .unwrap();
        }
        let result = builder.add_attribute(Attribute::new("c32", DataType::Int, false));
        assert!(matches!(result, Err(CatalogError::TooManyAttributes)));
    }

    #[test]
    fn rejects_a_second_primary_key() {
        let mut builder = SchemaBuilder::new("t");
        builder.primary_key("a").unwrap();
        assert!(matches!(
            builder.primary_key("b"),
            Err(CatalogError::MultiplePrimaryKeys)
        ));
    }

    #[test]
    fn rejects_invalid_definitions() {
        let mut builder = SchemaBuilder::new("t");
        builder
            .add_attribute(Attribute::new("a", DataType::Int, false))
            .unwrap();
        assert!(matches!(
            builder.add_attribute(Attribute::new("a", DataType::Float, false)),
            Err(CatalogError::DuplicateAttribute(_))
        ));
        assert!(matches!(
            builder.add_attribute(Attribute::new("b", DataType::Char(0), false)),
            Err(CatalogError::InvalidCharCount(_))
        ));
        assert!(matches!(
            builder.add_attribute(Attribute::new("x".repeat(33), DataType::Int, false)),
            Err(CatalogError::NameTooLong(_))
        ));
        assert!(matches!(
            SchemaBuilder::new("t").build(),
            Err(CatalogError::MissingPrimaryKey)
        ));

        builder.primary_key("missing").unwrap();
        assert!(matches!(
            builder.build(),
            Err(CatalogError::PrimaryKeyNotFound(_))
        ));
    }

    #[test]
    fn validate_catches_unbuilt_schemas() {
        let attributes = (0..33)
            .map(|i| Attribute::new(format!("c{i}"), DataType::Int, false))
            .collect();
        let schema = Schema::new("wide", "c0", attributes);
        assert!(matches!(
            schema.validate(),
            Err(CatalogError::TooManyAttributes)
        ));

        let schema = Schema::new("t\0", "id", vec![Attribute::new("id", DataType::Int, true)]);
        assert!(matches!(schema.validate(), Err(CatalogError::InvalidName(_))));
    }
}
