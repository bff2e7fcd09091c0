//! The serving-map format: a tagged key-value map with typed leaves,
//! preceded on disk by a fixed 30-byte banner.
//!
//! Keys are stored sorted, so serialization is byte-stable.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use anyhow::{bail, Context, Result};

pub const BANNER: &[u8; 30] = b"*** Global term statistics ***";

const TAG_INT64: u8 = 1;
const TAG_WORD32: u8 = 2;
const TAG_CHARSTR: u8 = 3;
const TAG_ZMAP: u8 = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int64(i64),
    Word32(u32),
    CharStr(String),
    ZMap(ZMap),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZMap {
    entries: BTreeMap<String, Value>,
}

impl ZMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_int64(&mut self, key: impl Into<String>, value: i64) {
        self.entries.insert(key.into(), Value::Int64(value));
    }

    pub fn set_word32(&mut self, key: impl Into<String>, value: u32) {
        self.entries.insert(key.into(), Value::Word32(value));
    }

    pub fn set_charstr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), Value::CharStr(value.into()));
    }

    pub fn set_zmap(&mut self, key: impl Into<String>, value: ZMap) {
        self.entries.insert(key.into(), Value::ZMap(value));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_word32(&self, key: &str) -> Option<u32> {
        match self.entries.get(key) {
            Some(&Value::Word32(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_charstr(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(Value::CharStr(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_zmap(&self, key: &str) -> Option<&ZMap> {
        match self.entries.get(key) {
            Some(Value::ZMap(v)) => Some(v),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn serialize(&self, out: &mut impl Write) -> Result<()> {
        out.write_all(&(self.entries.len() as u32).to_le_bytes())?;
        for (key, value) in &self.entries {
            write_str(out, key)?;
            match value {
                Value::Int64(v) => {
                    out.write_all(&[TAG_INT64])?;
                    out.write_all(&v.to_le_bytes())?;
                }
                Value::Word32(v) => {
                    out.write_all(&[TAG_WORD32])?;
                    out.write_all(&v.to_le_bytes())?;
                }
                Value::CharStr(v) => {
                    out.write_all(&[TAG_CHARSTR])?;
                    write_str(out, v)?;
                }
                Value::ZMap(v) => {
                    out.write_all(&[TAG_ZMAP])?;
                    v.serialize(out)?;
                }
            }
        }
        Ok(())
    }

    pub fn parse(inp: &mut impl Read) -> Result<Self> {
        let mut word = [0u8; 4];
        inp.read_exact(&mut word).context("truncated map")?;
        let len = u32::from_le_bytes(word);

        let mut entries = BTreeMap::new();
        for _ in 0..len {
            let key = read_str(inp)?;
            let mut tag = [0u8; 1];
            inp.read_exact(&mut tag).context("truncated map entry")?;
            let value = match tag[0] {
                TAG_INT64 => {
                    let mut bytes = [0u8; 8];
                    inp.read_exact(&mut bytes)?;
                    Value::Int64(i64::from_le_bytes(bytes))
                }
                TAG_WORD32 => {
                    inp.read_exact(&mut word)?;
                    Value::Word32(u32::from_le_bytes(word))
                }
                TAG_CHARSTR => Value::CharStr(read_str(inp)?),
                TAG_ZMAP => Value::ZMap(ZMap::parse(inp)?),
                tag => bail!("unknown value tag {tag}"),
            };
            entries.insert(key, value);
        }
        Ok(Self { entries })
    }
}

fn write_str(out: &mut impl Write, s: &str) -> Result<()> {
    out.write_all(&(s.len() as u32).to_le_bytes())?;
    out.write_all(s.as_bytes())?;
    Ok(())
}

fn read_str(inp: &mut impl Read) -> Result<String> {
    let mut word = [0u8; 4];
    inp.read_exact(&mut word).context("truncated string")?;
    let mut bytes = vec![0u8; u32::from_le_bytes(word) as usize];
    inp.read_exact(&mut bytes).context("truncated string")?;
    String::from_utf8(bytes).context("string is not utf-8")
}
