use bytes::BufMut;

use super::{Error, Result, record::Record};
use crate::{types::Value, utils};

mod column;

pub use column::{Column, DataType};

/// Ordered list of typed fields. Fixes the byte layout of every record of a
/// table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
    size: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let size = columns.iter().map(|c| c.data_type.size()).sum();
        Self { columns, size }
    }

    /// Builds schema from `(name, type)` pairs.
    pub fn from_fields<N: Into<String>>(fields: impl IntoIterator<Item = (N, DataType)>) -> Self {
        Self::new(
            fields
                .into_iter()
                .map(|(name, data_type)| Column::new(name, data_type))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Size of one encoded record in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Index of the first column called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Checks arity, types and string lengths of `values`.
    pub fn verify(&self, values: Vec<Value>) -> Result<Record> {
        if values.len() != self.columns.len() {
            return Err(Error::SchemaMismatch(format!(
                "expected {} values, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        for (column, value) in self.columns.iter().zip(&values) {
            if !column.data_type.accepts(value) {
                return Err(Error::SchemaMismatch(format!(
                    "column {} of type {} cannot hold {} value {value}",
                    column.name,
                    column.data_type,
                    value.type_name()
                )));
            }
        }

        Ok(Record::new(values))
    }

    /// Encodes verified record into exactly [`Self::size`] bytes.
    pub fn encode(&self, record: &Record) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size);
        for (column, value) in self.columns.iter().zip(record.values()) {
            column.data_type.encode(value, &mut buf);
        }
        buf
    }

    pub fn decode(&self, mut bytes: &[u8]) -> Result<Record> {
        let values = self
            .columns
            .iter()
            .map(|c| c.data_type.decode(&mut bytes))
            .collect::<utils::Result<Vec<_>>>()?;
        Ok(Record::new(values))
    }

    /// Columns of `self` followed by columns of `other`.
    pub fn concat(&self, other: &Schema) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .chain(other.columns.iter())
                .cloned()
                .collect(),
        )
    }

    /// Serializes schema into the table header page format.
    ///
    /// ```text
    /// i32 field count
    /// i32 name length * field count
    /// utf-8 names
    /// (i32 type tag [, i32 string length]) * field count
    /// ```
    pub fn to_header_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_i32(self.columns.len() as i32);
        for column in &self.columns {
            buf.put_i32(column.name.len() as i32);
        }
        for column in &self.columns {
            buf.put_slice(column.name.as_bytes());
        }
        for column in &self.columns {
            buf.put_i32(column.data_type.tag());
            if let DataType::String(len) = column.data_type {
                buf.put_i32(len as i32);
            }
        }
        buf
    }

    pub fn from_header_bytes(mut src: &[u8]) -> Result<Self> {
        let corrupt = |msg: &str| Error::CorruptHeader(msg.to_string());

        let count = usize::try_from(utils::bytes::get_i32(&mut src)?)
            .map_err(|_| corrupt("negative field count"))?;

        let mut name_lengths = Vec::with_capacity(count);
        for _ in 0..count {
            let len = usize::try_from(utils::bytes::get_i32(&mut src)?)
                .map_err(|_| corrupt("negative name length"))?;
            name_lengths.push(len);
        }

        let mut names = Vec::with_capacity(count);
        for len in name_lengths {
            let raw = utils::bytes::get_bytes(&mut src, len)?;
            names.push(String::from_utf8(raw).map_err(utils::Error::from)?);
        }

        let mut columns = Vec::with_capacity(count);
        for name in names {
            let tag = utils::bytes::get_i32(&mut src)?;
            let len = if tag == DataType::STRING_TAG {
                usize::try_from(utils::bytes::get_i32(&mut src)?)
                    .map_err(|_| corrupt("negative string length"))?
            } else {
                0
            };
            let data_type = DataType::from_tag(tag, len)
                .ok_or_else(|| Error::CorruptHeader(format!("unknown type tag {tag}")))?;
            columns.push(Column::new(name, data_type));
        }

        Ok(Self::new(columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_fields([
            ("id", DataType::Int),
            ("name", DataType::String(10)),
            ("score", DataType::Float),
            ("active", DataType::Bool),
        ])
    }

    #[test]
    fn test_record_encoding() -> anyhow::Result<()> {
        let schema = schema();
        assert_eq!(schema.size(), 4 + 10 + 4 + 1);

        let record = schema.verify(vec![
            Value::Int(-7),
            Value::from("crab"),
            Value::Float(1.25),
            Value::Bool(true),
        ])?;

        let bytes = schema.encode(&record);
        assert_eq!(bytes.len(), schema.size());
        assert_eq!(schema.decode(&bytes)?, record);

        Ok(())
    }

    #[test]
    fn test_verify_rejects_bad_records() -> anyhow::Result<()> {
        let schema = schema();

        let short = schema.verify(vec![Value::Int(1)]);
        assert!(matches!(short, Err(Error::SchemaMismatch(_))));

        let wrong_type = schema.verify(vec![
            Value::from("1"),
            Value::from("crab"),
            Value::Float(1.0),
            Value::Bool(false),
        ]);
        assert!(matches!(wrong_type, Err(Error::SchemaMismatch(_))));

        let too_long = schema.verify(vec![
            Value::Int(1),
            Value::from("hermit crab!"),
            Value::Float(1.0),
            Value::Bool(false),
        ]);
        assert!(matches!(too_long, Err(Error::SchemaMismatch(_))));

        Ok(())
    }

    #[test]
    fn test_strings_with_zero_bytes_are_rejected() -> anyhow::Result<()> {
        let schema = Schema::from_fields([("s", DataType::String(6))]);

        for value in ["ab\0", "\0", "a\0b"] {
            let result = schema.verify(vec![Value::from(value)]);
            assert!(matches!(result, Err(Error::SchemaMismatch(_))), "{value:?}");
        }

        // full width strings still round trip
        let record = schema.verify(vec![Value::from("abcdef")])?;
        assert_eq!(schema.decode(&schema.encode(&record))?, record);

        Ok(())
    }

    #[test]
    fn test_header_bytes() -> anyhow::Result<()> {
        let schema = schema();
        let bytes = schema.to_header_bytes();

        // count + 4 name lengths + names + 4 tags + 1 string length
        assert_eq!(bytes.len(), 4 + 16 + 17 + 16 + 4);
        assert_eq!(Schema::from_header_bytes(&bytes)?, schema);

        Ok(())
    }

    #[test]
    fn test_concat() -> anyhow::Result<()> {
        let left = Schema::from_fields([("a", DataType::Int)]);
        let right = Schema::from_fields([("b", DataType::Bool)]);
        let joined = left.concat(&right);

        assert_eq!(joined.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(joined.size(), 5);

        Ok(())
    }
}
