//! Epee portable storage, the key/value body format of Levin messages
//!
//! A body is a fixed 9-byte prefix followed by a root section. Sections are
//! ordered lists of named, type-tagged values; arrays set the high bit of the
//! element type and store their elements untagged.

use super::LevinError;

pub const PORTABLE_STORAGE_SIGNATURE_A: u32 = 0x0101_1101;
pub const PORTABLE_STORAGE_SIGNATURE_B: u32 = 0x0102_0101;
pub const PORTABLE_STORAGE_FORMAT_VERSION: u8 = 1;

const TYPE_INT64: u8 = 1;
const TYPE_INT32: u8 = 2;
const TYPE_INT16: u8 = 3;
const TYPE_INT8: u8 = 4;
const TYPE_UINT64: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_UINT16: u8 = 7;
const TYPE_UINT8: u8 = 8;
const TYPE_DOUBLE: u8 = 9;
const TYPE_STRING: u8 = 10;
const TYPE_BOOL: u8 = 11;
const TYPE_OBJECT: u8 = 12;
const FLAG_ARRAY: u8 = 0x80;

/// Nesting limit for sections and arrays while decoding untrusted input
const MAX_DEPTH: usize = 64;

/// Largest value a varint can carry (two bits are spent on the width tag)
pub const VARINT_MAX: u64 = (1 << 62) - 1;

/// A single portable storage value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I64(i64),
    I32(i32),
    I16(i16),
    I8(i8),
    U64(u64),
    U32(u32),
    U16(u16),
    U8(u8),
    F64(f64),
    /// Epee "string", an arbitrary byte blob
    Bytes(Vec<u8>),
    Bool(bool),
    Section(Section),
    Array(Vec<Value>),
}

impl Value {
    fn type_tag(&self) -> u8 {
        match self {
            Value::I64(_) => TYPE_INT64,
            Value::I32(_) => TYPE_INT32,
            Value::I16(_) => TYPE_INT16,
            Value::I8(_) => TYPE_INT8,
            Value::U64(_) => TYPE_UINT64,
            Value::U32(_) => TYPE_UINT32,
            Value::U16(_) => TYPE_UINT16,
            Value::U8(_) => TYPE_UINT8,
            Value::F64(_) => TYPE_DOUBLE,
            Value::Bytes(_) => TYPE_STRING,
            Value::Bool(_) => TYPE_BOOL,
            Value::Section(_) => TYPE_OBJECT,
            Value::Array(items) => {
                FLAG_ARRAY | items.first().map(Value::type_tag).unwrap_or(TYPE_OBJECT)
            }
        }
    }

    /// Any integer value that fits in a u64
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U64(v) => Some(v),
            Value::U32(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U8(v) => Some(v.into()),
            Value::I64(v) => u64::try_from(v).ok(),
            Value::I32(v) => u64::try_from(v).ok(),
            Value::I16(v) => u64::try_from(v).ok(),
            Value::I8(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_section(&self) -> Option<&Section> {
        match self {
            Value::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// An ordered set of named values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    entries: Vec<(String, Value)>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, replacing any previous value under `name`
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as a full storage body, prefix included
    pub fn to_bytes(&self) -> Result<Vec<u8>, LevinError> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&PORTABLE_STORAGE_SIGNATURE_A.to_le_bytes());
        out.extend_from_slice(&PORTABLE_STORAGE_SIGNATURE_B.to_le_bytes());
        out.push(PORTABLE_STORAGE_FORMAT_VERSION);
        write_section(&mut out, self)?;
        Ok(out)
    }

    /// Parse a full storage body, prefix included
    pub fn from_bytes(data: &[u8]) -> Result<Self, LevinError> {
        let mut reader = Reader::new(data);
        let sig_a = u32::from_le_bytes(reader.array()?);
        let sig_b = u32::from_le_bytes(reader.array()?);
        let version = reader.u8()?;
        if sig_a != PORTABLE_STORAGE_SIGNATURE_A
            || sig_b != PORTABLE_STORAGE_SIGNATURE_B
            || version != PORTABLE_STORAGE_FORMAT_VERSION
        {
            return Err(LevinError::BadStorageSignature);
        }
        reader.section(0)
    }
}

/// Append a varint: the low two bits of the first byte select a 1/2/4/8 byte width
pub fn write_varint(out: &mut Vec<u8>, value: u64) -> Result<(), LevinError> {
    if value <= 0x3f {
        out.push((value as u8) << 2);
    } else if value <= 0x3fff {
        out.extend_from_slice(&(((value as u16) << 2) | 1).to_le_bytes());
    } else if value <= 0x3fff_ffff {
        out.extend_from_slice(&(((value as u32) << 2) | 2).to_le_bytes());
    } else if value <= VARINT_MAX {
        out.extend_from_slice(&((value << 2) | 3).to_le_bytes());
    } else {
        return Err(LevinError::VarintOverflow(value));
    }
    Ok(())
}

fn write_section(out: &mut Vec<u8>, section: &Section) -> Result<(), LevinError> {
    write_varint(out, section.entries.len() as u64)?;
    for (name, value) in &section.entries {
        let name_len = u8::try_from(name.len()).map_err(|_| LevinError::InvalidName)?;
        out.push(name_len);
        out.extend_from_slice(name.as_bytes());
        out.push(value.type_tag());
        write_value(out, value)?;
    }
    Ok(())
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), LevinError> {
    match value {
        Value::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::U8(v) => out.push(*v),
        Value::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::Bytes(bytes) => {
            write_varint(out, bytes.len() as u64)?;
            out.extend_from_slice(bytes);
        }
        Value::Section(section) => write_section(out, section)?,
        Value::Array(items) => {
            let tag = value.type_tag() & !FLAG_ARRAY;
            if items.iter().any(|item| item.type_tag() != tag) {
                return Err(LevinError::MixedArray);
            }
            write_varint(out, items.len() as u64)?;
            for item in items {
                write_value(out, item)?;
            }
        }
    }
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], LevinError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(LevinError::Truncated)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], LevinError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, LevinError> {
        Ok(self.take(1)?[0])
    }

    fn varint(&mut self) -> Result<u64, LevinError> {
        let first = self.data.get(self.pos).copied().ok_or(LevinError::Truncated)?;
        let raw = match first & 0x03 {
            0 => u64::from(self.u8()?),
            1 => u64::from(u16::from_le_bytes(self.array()?)),
            2 => u64::from(u32::from_le_bytes(self.array()?)),
            _ => u64::from_le_bytes(self.array()?),
        };
        Ok(raw >> 2)
    }

    /// A length prefix, bounded by what is left in the buffer
    fn length(&mut self) -> Result<usize, LevinError> {
        let len = self.varint()?;
        let remaining = (self.data.len() - self.pos) as u64;
        if len > remaining {
            return Err(LevinError::Truncated);
        }
        Ok(len as usize)
    }

    fn section(&mut self, depth: usize) -> Result<Section, LevinError> {
        if depth > MAX_DEPTH {
            return Err(LevinError::TooDeep);
        }
        let count = self.length()?;
        let mut section = Section::new();
        for _ in 0..count {
            let name_len = self.u8()? as usize;
            let name = std::str::from_utf8(self.take(name_len)?)
                .map_err(|_| LevinError::InvalidName)?
                .to_string();
            let tag = self.u8()?;
            let value = if tag & FLAG_ARRAY != 0 {
                self.array_value(tag & !FLAG_ARRAY, depth + 1)?
            } else {
                self.value(tag, depth + 1)?
            };
            section.entries.push((name, value));
        }
        Ok(section)
    }

    fn array_value(&mut self, tag: u8, depth: usize) -> Result<Value, LevinError> {
        let count = self.length()?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(self.value(tag, depth)?);
        }
        Ok(Value::Array(items))
    }

    fn value(&mut self, tag: u8, depth: usize) -> Result<Value, LevinError> {
        let value = match tag {
            TYPE_INT64 => Value::I64(i64::from_le_bytes(self.array()?)),
            TYPE_INT32 => Value::I32(i32::from_le_bytes(self.array()?)),
            TYPE_INT16 => Value::I16(i16::from_le_bytes(self.array()?)),
            TYPE_INT8 => Value::I8(i8::from_le_bytes(self.array()?)),
            TYPE_UINT64 => Value::U64(u64::from_le_bytes(self.array()?)),
            TYPE_UINT32 => Value::U32(u32::from_le_bytes(self.array()?)),
            TYPE_UINT16 => Value::U16(u16::from_le_bytes(self.array()?)),
            TYPE_UINT8 => Value::U8(self.u8()?),
            TYPE_DOUBLE => Value::F64(f64::from_le_bytes(self.array()?)),
            TYPE_BOOL => Value::Bool(self.u8()? != 0),
            TYPE_STRING => {
                let len = self.length()?;
                Value::Bytes(self.take(len)?.to_vec())
            }
            TYPE_OBJECT => Value::Section(self.section(depth)?),
            other => return Err(LevinError::UnknownType(other)),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint_bytes(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, value).unwrap();
        out
    }

    #[test]
    fn test_varint_widths() {
        assert_eq!(varint_bytes(0), vec![0x00]);
        assert_eq!(varint_bytes(63), vec![0xfc]);
        assert_eq!(varint_bytes(64).len(), 2);
        assert_eq!(varint_bytes(16383).len(), 2);
        assert_eq!(varint_bytes(16384).len(), 4);
        assert_eq!(varint_bytes(0x3fff_ffff).len(), 4);
        assert_eq!(varint_bytes(0x4000_0000).len(), 8);

        for value in [0, 1, 63, 64, 300, 16383, 16384, 1 << 29, 1 << 40, VARINT_MAX] {
            let bytes = varint_bytes(value);
            assert_eq!(Reader::new(&bytes).varint().unwrap(), value);
        }
    }

    #[test]
    fn test_varint_overflow() {
        let mut out = Vec::new();
        assert!(matches!(
            write_varint(&mut out, VARINT_MAX + 1),
            Err(LevinError::VarintOverflow(_))
        ));
    }

    #[test]
    fn test_nested_section() {
        let inner = Section::new()
            .with("m_ip", Value::U32(0x0100_007f))
            .with("m_port", Value::U16(18080));
        let section = Section::new()
            .with("addr", Value::Section(inner.clone()))
            .with("ids", Value::Array(vec![Value::U64(1), Value::U64(2)]))
            .with("blob", Value::Bytes(vec![0xde, 0xad]))
            .with("flag", Value::Bool(true));

        let bytes = section.to_bytes().unwrap();
        let decoded = Section::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, section);
        assert_eq!(decoded.get("addr").and_then(Value::as_section), Some(&inner));
        assert_eq!(decoded.get("ids").and_then(Value::as_array).map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_insert_replaces() {
        let mut section = Section::new().with("a", Value::U8(1));
        section.insert("a", Value::U8(2));
        assert_eq!(section.len(), 1);
        assert_eq!(section.get("a"), Some(&Value::U8(2)));
    }

    #[test]
    fn test_mixed_array_is_rejected() {
        let section = Section::new().with("x", Value::Array(vec![Value::U8(1), Value::U16(2)]));
        assert!(matches!(section.to_bytes(), Err(LevinError::MixedArray)));
    }

    #[test]
    fn test_bad_prefix() {
        let mut bytes = Section::new().to_bytes().unwrap();
        bytes[0] ^= 0xff;
        assert!(matches!(Section::from_bytes(&bytes), Err(LevinError::BadStorageSignature)));
    }

    #[test]
    fn test_truncated_body() {
        let section = Section::new().with("blob", Value::Bytes(vec![7; 32]));
        let bytes = section.to_bytes().unwrap();
        for cut in [3, 9, 12, bytes.len() - 1] {
            assert!(Section::from_bytes(&bytes[..cut]).is_err(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_unknown_type_tag() {
        let mut bytes = Section::new().with("v", Value::U8(5)).to_bytes().unwrap();
        // prefix(9) + count(1) + name_len(1) + name(1) -> type tag
        bytes[12] = 0x2a;
        assert!(matches!(Section::from_bytes(&bytes), Err(LevinError::UnknownType(0x2a))));
    }

    #[test]
    fn test_as_u64_coercion() {
        assert_eq!(Value::U16(80).as_u64(), Some(80));
        assert_eq!(Value::I32(-1).as_u64(), None);
        assert_eq!(Value::I64(42).as_u64(), Some(42));
        assert_eq!(Value::Bytes(vec![]).as_u64(), None);
    }
}
