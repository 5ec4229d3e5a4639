mod buffer;
mod catalog;
mod common;
mod storage;

use std::{
    fs,
    io::{BufRead, BufReader, BufWriter, Write},
    net::{Shutdown, TcpListener, TcpStream},
    thread,
};

use anyhow::{Context, Error, Result};
use buffer::buffer_manager::BufferManager;
use catalog::error::CatalogError;
use catalog::schema::{Attribute, SchemaBuilder};
use catalog::Catalog;
use clap::Parser;
use storage::file_manager::FileManager;
use tracing::{error, info};

#[derive(Parser)]
struct ServerConfig {
    #[arg(long, help = "Directory where data is stored, created if missing")]
    data: String,

    #[arg(long, default_value_t = 42666)]
    port: u16,

    #[arg(long, default_value_t = 8, help = "Size of buffer pool")]
    pool_size: usize,
}

fn trim_newline(s: &mut String) {
    let len = s.len();
    if s.ends_with("\r\n") {
        s.truncate(len - 2);
    } else if s.ends_with('\n') {
        s.truncate(len - 1);
    }
}

/// Parses `name:type` or `name:type:unique`.
fn parse_attribute(spec: &str) -> Result<Attribute> {
    let mut parts = spec.split(':');
    let name = parts.next().filter(|name| !name.is_empty());
    let data_type = parts.next();
    let (Some(name), Some(data_type)) = (name, data_type) else {
        return Err(Error::msg(format!(
            "Expected an attribute as name:type[:unique], got {spec}"
        )));
    };
    let unique = match parts.next() {
        None => false,
        Some("unique") => true,
        Some(other) => return Err(Error::msg(format!("Unknown attribute option {other}"))),
    };
    Ok(Attribute::new(name, data_type.parse()?, unique))
}

/// `.create <table> <primary key> <attribute>...`
fn create_table(catalog: &Catalog, args: &[&str]) -> Result<String> {
    let [table_name, primary_key, attributes @ ..] = args else {
        return Err(Error::msg(
            "Usage: .create <table> <primary key> <name:type[:unique]>...",
        ));
    };
    if catalog.has_table(table_name) {
        return Err(CatalogError::TableAlreadyExists(table_name.to_string()).into());
    }
    let mut builder = SchemaBuilder::new(*table_name);
    for attribute in attributes {
        builder.add_attribute(parse_attribute(attribute)?)?;
    }
    builder.primary_key(*primary_key)?;
    let schema = builder.build()?;

    catalog.create_table(
        schema.table_name(),
        schema.primary_key(),
        schema.attributes().to_vec(),
    )?;
    Ok(format!("Created table {table_name}"))
}

fn execute(catalog: &Catalog, line: &str) -> Result<String> {
    let split = line.split_whitespace().collect::<Vec<&str>>();
    let Some((command, args)) = split.split_first() else {
        return Ok(String::new());
    };

    match (*command, args) {
        (".tables", []) => Ok(catalog.list_tables().join(" ")),
        (".schema", [table_name]) => {
            let schema = catalog.get_schema(table_name)?;
            let mut out = format!(
                "{} (primary key {})",
                schema.table_name(),
                schema.primary_key()
            );
            for attribute in schema.attributes() {
                out.push_str(&format!("\n  {attribute}"));
            }
            Ok(out)
        }
        (".create", args) => create_table(catalog, args),
        (".drop", [table_name]) => {
            catalog.drop_table(table_name)?;
            Ok(format!("Dropped table {table_name}"))
        }
        (".create_index", [index_name, table_name, attr_name]) => {
            catalog.create_index(index_name, table_name, attr_name)?;
            Ok(format!("Created index {index_name}"))
        }
        (".drop_index", [index_name]) => {
            catalog.drop_index(index_name)?;
            Ok(format!("Dropped index {index_name}"))
        }
        _ => Ok(format!("Unknown command: {line}")),
    }
}

fn handle_client(mut stream: TcpStream, catalog: &Catalog) -> Result<()> {
    stream.write_all("Welcome to cedardb".as_bytes())?;

    let mut reader = BufReader::new(&stream);
    let mut writer = BufWriter::new(&stream);
    let mut line = String::new();

    loop {
        line.clear();
        writer.write_all("\n> ".as_bytes())?;
        writer.flush()?;
        reader.read_line(&mut line)?;

        if line.as_bytes().is_empty() {
            // Client didn't send anything.
            return Ok(());
        }
        trim_newline(&mut line);
        if line.eq(".exit") {
            break;
        }
        match execute(catalog, &line) {
            Ok(out) => writer.write_all(out.as_bytes())?,
            Err(e) => writer.write_all(format!("Error: {e}").as_bytes())?,
        }
    }

    stream.shutdown(Shutdown::Both)?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::parse();

    fs::create_dir_all(&config.data)
        .with_context(|| format!("Failed to create data directory {}", config.data))?;
    let file_manager = FileManager::new(&config.data)?;
    let buffer_manager = BufferManager::new(file_manager, config.pool_size);

    let catalog =
        Catalog::init(&buffer_manager).with_context(|| "Failed to open catalog".to_string())?;
    let listener = TcpListener::bind(("localhost", config.port))?;
    info!(data = %config.data, port = config.port, "listening");

    thread::scope(|scope| {
        let catalog = &catalog;

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    scope.spawn(move || {
                        if let Err(e) = handle_client(stream, catalog) {
                            error!(error = %e, "failed to handle client");
                        }
                    });
                }
                Err(e) => error!(error = %e, "could not get tcp stream"),
            }
        }
    });

    catalog.exit();
    Ok(())
}
