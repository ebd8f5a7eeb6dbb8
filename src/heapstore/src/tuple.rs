use std::{fmt::Display, mem::size_of};

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    record_id::RecordId,
    schema::{FieldType, Schema},
};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Int(i32),
    Varchar(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Varchar(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Varchar(s.to_string())
    }
}

/// One record. Tuples read out of a page carry the `RecordId` of the slot they were read from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tuple {
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            record_id: None,
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Encode the tuple into `buf`, which must be exactly `schema.tuple_size()` bytes. The values
    /// are assumed to have been checked against the schema already.
    pub(crate) fn write_to(&self, schema: &Schema, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), schema.tuple_size());

        let mut offset = 0;
        for (typ, val) in schema.types().zip(self.values.iter()) {
            let len = typ.byte_length();
            let field = &mut buf[offset..offset + len];
            match val {
                Value::Int(i) => LittleEndian::write_i32(field, *i),
                Value::Varchar(s) => {
                    let bytes = s.as_bytes();
                    LittleEndian::write_u32(&mut field[..size_of::<u32>()], bytes.len() as u32);
                    field[size_of::<u32>()..size_of::<u32>() + bytes.len()].copy_from_slice(bytes);
                    field[size_of::<u32>() + bytes.len()..].fill(0);
                }
            }
            offset += len;
        }
    }

    /// Decode a tuple laid out by `write_to`.
    pub(crate) fn read_from(schema: &Schema, buf: &[u8]) -> Self {
        let mut values = Vec::with_capacity(schema.num_fields());

        let mut offset = 0;
        for typ in schema.types() {
            let len = typ.byte_length();
            let field = &buf[offset..offset + len];
            let val = match typ {
                FieldType::Int => Value::Int(LittleEndian::read_i32(field)),
                FieldType::Varchar(max) => {
                    let str_len = (LittleEndian::read_u32(&field[..size_of::<u32>()]) as usize)
                        .min(max as usize);
                    let str_bytes = &field[size_of::<u32>()..size_of::<u32>() + str_len];
                    Value::Varchar(String::from_utf8_lossy(str_bytes).into_owned())
                }
            };
            values.push(val);
            offset += len;
        }

        Tuple::new(values)
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let vals: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", vals.join("\t"))
    }
}

/// Build a `Tuple` from a list of values, e.g. `tuple![1, "joe", 2021]`.
#[macro_export]
macro_rules! tuple {
    ($($val:expr),* $(,)?) => {
        $crate::tuple::Tuple::new(vec![$($crate::tuple::Value::from($val)),*])
    };
}
