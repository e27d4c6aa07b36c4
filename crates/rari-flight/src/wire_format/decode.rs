//! Minimal reader for the row format, used to check encoder output in tests.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use super::ChunkId;
use crate::model::TypedArrayKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: ChunkId,
    pub tag: Option<String>,
    pub payload: Payload,
}

impl Row {
    pub fn json(&self) -> &Value {
        match &self.payload {
            Payload::Json(value) => value,
            other => panic!("row {:x} is not JSON: {other:?}", self.id),
        }
    }
}

fn read_until(bytes: &[u8], pos: &mut usize, stop: u8) -> String {
    let start = *pos;
    while bytes[*pos] != stop {
        *pos += 1;
    }
    let out = String::from_utf8(bytes[start..*pos].to_vec()).unwrap();
    *pos += 1;
    out
}

fn is_length_prefixed(tag: u8) -> bool {
    tag == b'T' || TypedArrayKind::from_tag(tag as char).is_some()
}

pub fn parse_rows(bytes: &[u8]) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let id = ChunkId::from_str_radix(&read_until(bytes, &mut pos, b':'), 16).unwrap();
        let first = bytes[pos];
        if is_length_prefixed(first) {
            pos += 1;
            let len = usize::from_str_radix(&read_until(bytes, &mut pos, b','), 16).unwrap();
            let data = bytes[pos..pos + len].to_vec();
            pos += len;
            let payload = if first == b'T' {
                Payload::Text(String::from_utf8(data).unwrap())
            } else {
                Payload::Binary(data)
            };
            rows.push(Row { id, tag: Some((first as char).to_string()), payload });
            continue;
        }

        let tag = match first {
            b'I' | b'E' | b'P' => {
                pos += 1;
                Some((first as char).to_string())
            }
            b'H' => {
                pos += 2;
                Some(format!("H{}", bytes[pos - 1] as char))
            }
            _ => None,
        };
        let line = read_until(bytes, &mut pos, b'\n');
        let payload = if line.is_empty() { Payload::Empty } else { Payload::Json(serde_json::from_str(&line).unwrap()) };
        rows.push(Row { id, tag, payload });
    }
    rows
}

/// Decoded value with tokens resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Decoded>),
    Object(Vec<(String, Decoded)>),
    /// A reference back to a row that is still being decoded.
    Cycle(ChunkId),
    /// A token this reader leaves as-is (`$L`, `$@`, `$S`, ...).
    Token(String),
}

pub struct Decoder {
    rows: FxHashMap<ChunkId, Row>,
    visiting: FxHashSet<ChunkId>,
}

impl Decoder {
    pub fn new(bytes: &[u8]) -> Self {
        let mut rows = FxHashMap::default();
        for row in parse_rows(bytes) {
            rows.insert(row.id, row);
        }
        Self { rows, visiting: FxHashSet::default() }
    }

    pub fn root(&mut self) -> Decoded {
        self.chunk(0)
    }

    pub fn chunk(&mut self, id: ChunkId) -> Decoded {
        if self.visiting.contains(&id) {
            return Decoded::Cycle(id);
        }
        let row = self.rows.get(&id).cloned().unwrap_or_else(|| panic!("missing row {id:x}"));
        match row.payload {
            Payload::Text(text) => Decoded::String(text),
            Payload::Json(json) if row.tag.is_none() => {
                self.visiting.insert(id);
                let value = self.value(&json);
                self.visiting.remove(&id);
                value
            }
            other => panic!("row {id:x} is not a model row: {other:?}"),
        }
    }

    pub fn value(&mut self, json: &Value) -> Decoded {
        match json {
            Value::Null => Decoded::Null,
            Value::Bool(b) => Decoded::Bool(*b),
            Value::Number(n) => Decoded::Number(n.as_f64().unwrap()),
            Value::String(s) => self.token(s),
            Value::Array(items) => Decoded::Array(items.iter().map(|item| self.value(item)).collect()),
            Value::Object(map) => Decoded::Object(map.iter().map(|(k, v)| (k.clone(), self.value(v))).collect()),
        }
    }

    fn token(&mut self, s: &str) -> Decoded {
        let Some(rest) = s.strip_prefix('$') else {
            return Decoded::String(s.to_string());
        };
        match rest {
            "" => Decoded::Token(s.to_string()),
            "undefined" => Decoded::Undefined,
            "NaN" => Decoded::Number(f64::NAN),
            "Infinity" => Decoded::Number(f64::INFINITY),
            "-Infinity" => Decoded::Number(f64::NEG_INFINITY),
            "-0" => Decoded::Number(-0.0),
            _ if rest.starts_with('$') => Decoded::String(rest.to_string()),
            _ if rest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) => {
                self.chunk(ChunkId::from_str_radix(rest, 16).unwrap())
            }
            _ => Decoded::Token(s.to_string()),
        }
    }
}

impl Decoded {
    pub fn get(&self, key: &str) -> &Decoded {
        match self {
            Decoded::Object(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v).unwrap_or(&Decoded::Undefined)
            }
            _ => &Decoded::Undefined,
        }
    }
}
