use std::fmt::{self, Display};

use bytes::{Buf, BufMut};

use crate::{types::Value, utils};

/// Type of a fixed width field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int,
    Float,
    /// String of at most `n` bytes, zero padded on disk.
    String(usize),
}

impl DataType {
    pub const BOOL_TAG: i32 = 0;
    pub const INT_TAG: i32 = 1;
    pub const FLOAT_TAG: i32 = 2;
    pub const STRING_TAG: i32 = 3;

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Self::Bool => 1,
            Self::Int | Self::Float => 4,
            Self::String(len) => *len,
        }
    }

    pub fn tag(&self) -> i32 {
        match self {
            Self::Bool => Self::BOOL_TAG,
            Self::Int => Self::INT_TAG,
            Self::Float => Self::FLOAT_TAG,
            Self::String(_) => Self::STRING_TAG,
        }
    }

    /// Inverse of [`Self::tag`]. `len` is only used for strings.
    pub fn from_tag(tag: i32, len: usize) -> Option<Self> {
        match tag {
            Self::BOOL_TAG => Some(Self::Bool),
            Self::INT_TAG => Some(Self::Int),
            Self::FLOAT_TAG => Some(Self::Float),
            Self::STRING_TAG => Some(Self::String(len)),
            _ => None,
        }
    }

    /// Whether `value` can be stored in a field of this type. Strings are
    /// zero padded on disk, so they may not contain zero bytes themselves.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::String(len), Value::String(s)) => s.len() <= *len && !s.contains('\0'),
            _ => false,
        }
    }

    /// Writes exactly [`Self::size`] bytes. Caller must check
    /// [`Self::accepts`] first.
    pub fn encode(&self, value: &Value, dst: &mut impl BufMut) {
        match (self, value) {
            (Self::Bool, Value::Bool(v)) => dst.put_u8(*v as u8),
            (Self::Int, Value::Int(v)) => dst.put_i32(*v),
            (Self::Float, Value::Float(v)) => dst.put_f32(*v),
            (Self::String(len), Value::String(v)) => utils::bytes::put_padded_string(dst, v, *len),
            _ => dst.put_bytes(0, self.size()),
        }
    }

    pub fn decode(&self, src: &mut impl Buf) -> utils::Result<Value> {
        Ok(match self {
            Self::Bool => Value::Bool(utils::bytes::get_bool(src)?),
            Self::Int => Value::Int(utils::bytes::get_i32(src)?),
            Self::Float => Value::Float(utils::bytes::get_f32(src)?),
            Self::String(len) => Value::String(utils::bytes::get_padded_string(src, *len)?),
        })
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::String(len) => write!(f, "string({len})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}
