use std::{fmt, mem};

use serde::{Deserialize, Serialize};

use crate::{
    error::{DbError, DbResult},
    tuple::Value,
};

/// The type stored in one field of a tuple.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    /// A string of at most the given number of bytes.
    Varchar(u32),
}

impl FieldType {
    /// Number of bytes the field takes up inside a page slot.
    pub fn byte_length(&self) -> usize {
        match self {
            FieldType::Int => mem::size_of::<i32>(),
            // length prefix followed by at most `len` bytes
            FieldType::Varchar(len) => mem::size_of::<u32>() + *len as usize,
        }
    }

    /// Whether a value can be stored in a field of this type.
    pub fn accepts(&self, val: &Value) -> bool {
        match (self, val) {
            (FieldType::Int, Value::Int(_)) => true,
            (FieldType::Varchar(len), Value::Varchar(s)) => s.len() <= *len as usize,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Varchar(len) => write!(f, "varchar({len})"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Field {
    name: String,
    typ: FieldType,
}

/// Describes the shape of the tuples stored in a table: an ordered list of named, typed fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self { fields: vec![] }
    }

    pub fn add_field(&mut self, name: &str, typ: FieldType) -> &mut Self {
        assert!(!self.has_field(name), "duplicate field '{name}'");
        self.fields.push(Field {
            name: name.to_string(),
            typ,
        });
        self
    }

    pub fn add_int_field(&mut self, name: &str) -> &mut Self {
        self.add_field(name, FieldType::Int)
    }

    pub fn add_string_field(&mut self, name: &str, length: u32) -> &mut Self {
        self.add_field(name, FieldType::Varchar(length))
    }

    /// Build a schema holding the fields of `first` followed by the fields of `second`.
    pub fn merge(first: &Schema, second: &Schema) -> Schema {
        Schema {
            fields: first
                .fields
                .iter()
                .chain(second.fields.iter())
                .cloned()
                .collect(),
        }
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|f| f.name.as_str())
    }

    pub fn field_type(&self, index: usize) -> Option<FieldType> {
        self.fields.get(index).map(|f| f.typ)
    }

    pub fn get_field_type(&self, name: &str) -> Option<FieldType> {
        self.index_of(name).and_then(|i| self.field_type(i))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn types(&self) -> impl Iterator<Item = FieldType> + '_ {
        self.fields.iter().map(|f| f.typ)
    }

    /// Size in bytes of one tuple with this schema.
    pub fn tuple_size(&self) -> usize {
        self.types().map(|t| t.byte_length()).sum()
    }

    /// Whether both schemas have the same field types in the same order, ignoring names.
    pub fn same_types(&self, other: &Schema) -> bool {
        self.num_fields() == other.num_fields() && self.types().eq(other.types())
    }

    /// Check that a row of values can be stored with this schema.
    pub fn check_values(&self, values: &[Value]) -> DbResult<()> {
        if values.len() != self.num_fields() {
            return Err(DbError::SchemaMismatch(format!(
                "expected {} fields, got {}",
                self.num_fields(),
                values.len()
            )));
        }

        for (field, val) in self.fields.iter().zip(values) {
            if !field.typ.accepts(val) {
                return Err(DbError::SchemaMismatch(format!(
                    "field '{}' of type {} cannot hold {:?}",
                    field.name, field.typ, val
                )));
            }
        }

        Ok(())
    }

    /// Encode the schema so a catalog can store it alongside the table.
    pub fn to_bytes(&self) -> DbResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> DbResult<Schema> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .fields
            .iter()
            .map(|fld| format!("{}({})", fld.name, fld.typ))
            .collect();
        write!(f, "{}", cols.join(", "))
    }
}

/// Build a `Schema` from a list of fields, for example:
///
/// ```ignore
/// let schema = make_schema! {
///     "sid" => i32,
///     "sname" => varchar(20)
/// };
/// ```
#[macro_export]
macro_rules! make_schema {
    (@field $schema:ident, $name:expr, i32) => {
        $schema.add_int_field($name);
    };
    (@field $schema:ident, $name:expr, varchar($len:expr)) => {
        $schema.add_string_field($name, $len);
    };
    ($($name:expr => $typ:ident $(($len:expr))?),* $(,)?) => {{
        let mut schema = $crate::schema::Schema::new();
        $(
            $crate::make_schema!(@field schema, $name, $typ $(($len))?);
        )*
        schema
    }};
}
