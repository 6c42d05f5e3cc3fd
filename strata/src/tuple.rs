//! Fields, schemas and tuples.

use crate::errors::StorageError;
use crate::RecordId;
use std::cmp::Ordering;

/// Byte length of the payload region of a string field. Longer strings are
/// truncated on write.
pub const STRING_FIELD_BYTES: usize = 128;

/// The type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Str,
}

impl FieldType {
    /// Serialized size of a field of this type, in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Str => 4 + STRING_FIELD_BYTES,
        }
    }
}

/// A single typed value. Fields are immutable and compare by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            Field::Str(_) => FieldType::Str,
        }
    }

    /// Appends the serialized form: big-endian for ints, a big-endian
    /// length prefix plus a zero-padded [`STRING_FIELD_BYTES`] region for
    /// strings.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Field::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            Field::Str(s) => {
                let raw = s.as_bytes();
                let len = raw.len().min(STRING_FIELD_BYTES);
                out.extend_from_slice(&(len as u32).to_be_bytes());
                out.extend_from_slice(&raw[..len]);
                out.resize(out.len() + (STRING_FIELD_BYTES - len), 0);
            }
        }
    }

    /// Decodes one field of the given type from the front of `data`.
    pub fn read_bytes(field_type: FieldType, data: &[u8]) -> Result<Field, StorageError> {
        match field_type {
            FieldType::Int => {
                let raw: [u8; 4] = data
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| StorageError::Invariant("truncated int field".to_string()))?;
                Ok(Field::Int(i32::from_be_bytes(raw)))
            }
            FieldType::Str => {
                if data.len() < 4 + STRING_FIELD_BYTES {
                    return Err(StorageError::Invariant("truncated string field".to_string()));
                }
                let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
                if len > STRING_FIELD_BYTES {
                    return Err(StorageError::Invariant(format!(
                        "string field claims {len} bytes, max is {STRING_FIELD_BYTES}"
                    )));
                }
                let s = String::from_utf8_lossy(&data[4..4 + len]).into_owned();
                Ok(Field::Str(s))
            }
        }
    }
}

impl PartialOrd for Field {
    /// Orders same-typed fields; mixed-type comparisons have no ordering.
    fn partial_cmp(&self, other: &Field) -> Option<Ordering> {
        match (self, other) {
            (Field::Int(a), Field::Int(b)) => Some(a.cmp(b)),
            (Field::Str(a), Field::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// An ordered sequence of field types with optional advisory names.
///
/// Two schemas are equal iff their type sequences are equal; names never
/// participate in comparison.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    types: Vec<FieldType>,
    names: Vec<Option<String>>,
}

impl TupleDesc {
    pub fn new(types: Vec<FieldType>, mut names: Vec<Option<String>>) -> TupleDesc {
        names.resize(types.len(), None);
        TupleDesc { types, names }
    }

    pub fn unnamed(types: Vec<FieldType>) -> TupleDesc {
        let names = vec![None; types.len()];
        TupleDesc { types, names }
    }

    pub fn num_fields(&self) -> usize {
        self.types.len()
    }

    pub fn field_type(&self, i: usize) -> Option<FieldType> {
        self.types.get(i).copied()
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.names.get(i).and_then(|n| n.as_deref())
    }

    /// Serialized size in bytes of one tuple with this schema.
    pub fn tuple_bytes(&self) -> usize {
        self.types.iter().map(|t| t.byte_len()).sum()
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &TupleDesc) -> bool {
        self.types == other.types
    }
}

impl Eq for TupleDesc {}

/// A schema plus one field value per column, carrying the tuple's physical
/// location once it has been stored on a page.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: TupleDesc,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Fails when the field values do not match the schema's arity or
    /// types.
    pub fn new(desc: TupleDesc, fields: Vec<Field>) -> Result<Tuple, StorageError> {
        if fields.len() != desc.num_fields() {
            return Err(StorageError::Invariant(format!(
                "tuple arity {} does not match schema arity {}",
                fields.len(),
                desc.num_fields()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            if desc.field_type(i) != Some(field.field_type()) {
                return Err(StorageError::Invariant(format!(
                    "field {i} type does not match the schema"
                )));
            }
        }
        Ok(Tuple {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> Result<(), StorageError> {
        if self.desc.field_type(i) != Some(field.field_type()) {
            return Err(StorageError::Invariant(format!(
                "field {i} type does not match the schema"
            )));
        }
        self.fields[i] = field;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    pub(crate) fn write_bytes(&self, out: &mut Vec<u8>) {
        for field in &self.fields {
            field.write_bytes(out);
        }
    }

    pub(crate) fn read_bytes(desc: TupleDesc, data: &[u8]) -> Result<Tuple, StorageError> {
        let mut fields = Vec::with_capacity(desc.num_fields());
        let mut offset = 0;
        for &field_type in &desc.types {
            let rest = data
                .get(offset..)
                .ok_or_else(|| StorageError::Invariant("truncated tuple body".to_string()))?;
            fields.push(Field::read_bytes(field_type, rest)?);
            offset += field_type.byte_len();
        }
        Ok(Tuple {
            desc,
            fields,
            record_id: None,
        })
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Tuple) -> bool {
        self.desc == other.desc && self.fields == other.fields && self.record_id == other.record_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_compare_by_types_only() {
        let a = TupleDesc::new(
            vec![FieldType::Int, FieldType::Str],
            vec![Some("id".to_string()), Some("name".to_string())],
        );
        let b = TupleDesc::unnamed(vec![FieldType::Int, FieldType::Str]);
        let c = TupleDesc::unnamed(vec![FieldType::Str, FieldType::Int]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn tuple_byte_size_is_the_sum_of_field_sizes() {
        let desc = TupleDesc::unnamed(vec![FieldType::Int, FieldType::Int, FieldType::Str]);
        assert_eq!(desc.tuple_bytes(), 4 + 4 + 4 + STRING_FIELD_BYTES);
    }

    #[test]
    fn fields_round_trip_through_bytes() {
        let mut buf = Vec::new();
        Field::Int(-7).write_bytes(&mut buf);
        Field::Str("hello".to_string()).write_bytes(&mut buf);

        assert_eq!(Field::read_bytes(FieldType::Int, &buf).unwrap(), Field::Int(-7));
        assert_eq!(
            Field::read_bytes(FieldType::Str, &buf[4..]).unwrap(),
            Field::Str("hello".to_string())
        );
    }

    #[test]
    fn oversized_strings_are_truncated_on_write() {
        let long = "x".repeat(STRING_FIELD_BYTES + 40);
        let mut buf = Vec::new();
        Field::Str(long).write_bytes(&mut buf);
        assert_eq!(buf.len(), 4 + STRING_FIELD_BYTES);

        let Field::Str(back) = Field::read_bytes(FieldType::Str, &buf).unwrap() else {
            panic!("expected a string field");
        };
        assert_eq!(back.len(), STRING_FIELD_BYTES);
    }

    #[test]
    fn mixed_type_fields_do_not_order() {
        assert!(Field::Int(1)
            .partial_cmp(&Field::Str("1".to_string()))
            .is_none());
        assert!(Field::Int(1) < Field::Int(2));
        assert!(Field::Str("a".to_string()) < Field::Str("b".to_string()));
    }

    #[test]
    fn tuple_construction_checks_arity_and_types() {
        let desc = TupleDesc::unnamed(vec![FieldType::Int, FieldType::Str]);
        assert!(Tuple::new(desc.clone(), vec![Field::Int(1)]).is_err());
        assert!(Tuple::new(desc.clone(), vec![Field::Int(1), Field::Int(2)]).is_err());
        assert!(Tuple::new(desc, vec![Field::Int(1), Field::Str("a".to_string())]).is_ok());
    }

    #[test]
    fn set_field_rejects_a_type_change() {
        let desc = TupleDesc::unnamed(vec![FieldType::Int]);
        let mut tuple = Tuple::new(desc, vec![Field::Int(1)]).unwrap();
        assert!(tuple.set_field(0, Field::Str("no".to_string())).is_err());
        tuple.set_field(0, Field::Int(9)).unwrap();
        assert_eq!(tuple.field(0), Some(&Field::Int(9)));
    }
}
