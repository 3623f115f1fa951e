//! Reading and writing the JSON documents kept in a registry.
//!
//! Documents are handled as ordered [`serde_json::Map`]s so keys this crate does not know about
//! survive a read-modify-write cycle in their original position.

use std::{fs, path::Path};

use regpub_utils::fs::ensure_dir_exists;
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Map, Value};

use crate::error::{RegistryError, Result};

pub type Document = Map<String, Value>;

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|err| RegistryError::io(format!("reading {}", path.display()), err))
}

/// Parses `content` as a JSON object, or `None` if it is not one.
pub fn parse_object(content: &str) -> Option<Document> {
    match serde_json::from_str(content).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Renders with a four-space indent and a trailing newline, matching registry files.
pub fn to_pretty_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|err| {
        RegistryError::io(
            "rendering JSON",
            std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        )
    })
}

pub fn write_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_exists(parent)?;
    }
    let content = to_pretty_string(value)?;
    fs::write(path, content)
        .map_err(|err| RegistryError::io(format!("writing {}", path.display()), err))
}
