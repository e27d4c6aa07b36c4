use bytes::Bytes;
use serde_json::Value;

use super::ChunkId;
use crate::model::TypedArrayKind;

/// One unit handed to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Text(String),
    Binary(Bytes),
}

impl Chunk {
    pub fn len(&self) -> usize {
        match self {
            Chunk::Text(text) => text.len(),
            Chunk::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Chunk::Text(text) => text.as_bytes(),
            Chunk::Binary(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Chunk::Text(text) => Bytes::from(text),
            Chunk::Binary(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTag {
    Model,
    Import,
    Hint,
    Error,
    Postpone,
    Text,
    Binary(TypedArrayKind),
}

impl RowTag {
    pub fn tag_char(&self) -> Option<char> {
        match self {
            Self::Model => None,
            Self::Import => Some('I'),
            Self::Hint => Some('H'),
            Self::Error => Some('E'),
            Self::Postpone => Some('P'),
            Self::Text => Some('T'),
            Self::Binary(kind) => Some(kind.tag()),
        }
    }

    pub fn header(&self, id: ChunkId) -> String {
        match self.tag_char() {
            Some(tag) => format!("{id:x}:{tag}"),
            None => format!("{id:x}:"),
        }
    }

    pub fn format_row(&self, id: ChunkId, data: &str) -> String {
        format!("{}{}\n", self.header(id), data)
    }
}

pub fn model_row(id: ChunkId, json: &Value) -> Result<Chunk, serde_json::Error> {
    Ok(Chunk::Text(RowTag::Model.format_row(id, &serde_json::to_string(json)?)))
}

/// A row whose whole payload is one reference token.
pub fn reference_row(id: ChunkId, token: &str) -> Result<Chunk, serde_json::Error> {
    model_row(id, &Value::String(token.to_string()))
}

pub fn import_row(id: ChunkId, metadata: &Value) -> Result<Chunk, serde_json::Error> {
    Ok(Chunk::Text(RowTag::Import.format_row(id, &serde_json::to_string(metadata)?)))
}

pub fn hint_row(id: ChunkId, code: &str, model: &Value) -> Result<Chunk, serde_json::Error> {
    let header = RowTag::Hint.header(id);
    Ok(Chunk::Text(format!("{header}{code}{}\n", serde_json::to_string(model)?)))
}

pub fn error_row(id: ChunkId, info: &Value) -> Result<Chunk, serde_json::Error> {
    Ok(Chunk::Text(RowTag::Error.format_row(id, &serde_json::to_string(info)?)))
}

pub fn postpone_row(id: ChunkId, info: Option<&Value>) -> Result<Chunk, serde_json::Error> {
    let data = match info {
        Some(info) => serde_json::to_string(info)?,
        None => String::new(),
    };
    Ok(Chunk::Text(RowTag::Postpone.format_row(id, &data)))
}

/// Header and payload of a length-prefixed row. The payload carries no newline.
pub fn text_rows(id: ChunkId, text: &str) -> [Chunk; 2] {
    let header = format!("{}{:x},", RowTag::Text.header(id), text.len());
    [Chunk::Text(header), Chunk::Text(text.to_string())]
}

pub fn binary_rows(id: ChunkId, kind: TypedArrayKind, bytes: &Bytes) -> [Chunk; 2] {
    let header = format!("{}{:x},", RowTag::Binary(kind).header(id), bytes.len());
    [Chunk::Text(header), Chunk::Binary(bytes.clone())]
}
