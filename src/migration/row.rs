// ABOUTME: Per-row decode from SQLite values and re-encode into PostgreSQL parameters
// ABOUTME: A RowInstance lives only for the duration of one row's copy

use super::blob::BinaryValue;
use super::descriptor::{FieldDescriptor, FieldKind, RowRule, TableDescriptor};
use crate::error::{DecodeError, MigrationError, Result};
use rusqlite::types::ValueRef;
use tokio_postgres::types::{ToSql, Type};

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(Option<i64>),
    Text(Option<String>),
    Binary(BinaryValue),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Integer(v) => v.is_none(),
            FieldValue::Text(v) => v.is_none(),
            FieldValue::Binary(v) => v.is_unset(),
        }
    }

    fn null_of(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Integer => FieldValue::Integer(None),
            FieldKind::Text => FieldValue::Text(None),
            FieldKind::Binary => FieldValue::Binary(BinaryValue::unset()),
        }
    }
}

fn storage_class(value: &ValueRef<'_>) -> &'static str {
    match value {
        ValueRef::Null => "null",
        ValueRef::Integer(_) => "integer",
        ValueRef::Real(_) => "real",
        ValueRef::Text(_) => "text",
        ValueRef::Blob(_) => "blob",
    }
}

/// Interpret one SQLite value according to its field descriptor.
pub fn decode_value(
    field: &FieldDescriptor,
    value: ValueRef<'_>,
) -> std::result::Result<FieldValue, DecodeError> {
    match (field.kind, value) {
        (FieldKind::Binary, value) => BinaryValue::decode(value).map(FieldValue::Binary),
        (kind, ValueRef::Null) if field.nullable => Ok(FieldValue::null_of(kind)),
        (_, ValueRef::Null) => Err(DecodeError::UnexpectedNull),

        (FieldKind::Integer, ValueRef::Integer(i)) => Ok(FieldValue::Integer(Some(i))),
        // SQLite's dynamic typing lets numeric text land in INTEGER columns
        (FieldKind::Integer, ValueRef::Text(bytes)) => {
            let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
            s.trim()
                .parse::<i64>()
                .map(|i| FieldValue::Integer(Some(i)))
                .map_err(|_| DecodeError::NotAnInteger(s.to_string()))
        }
        (FieldKind::Integer, other) => Err(DecodeError::UnsupportedValueKind {
            expected: "integer",
            found: storage_class(&other),
        }),

        (FieldKind::Text, ValueRef::Text(bytes) | ValueRef::Blob(bytes)) => std::str::from_utf8(bytes)
            .map(|s| FieldValue::Text(Some(s.to_string())))
            .map_err(|_| DecodeError::InvalidUtf8),
        (FieldKind::Text, ValueRef::Integer(i)) => Ok(FieldValue::Text(Some(i.to_string()))),
        (FieldKind::Text, ValueRef::Real(f)) => Ok(FieldValue::Text(Some(f.to_string()))),
    }
}

fn read_column<'r>(
    descriptor: &TableDescriptor,
    row: &'r rusqlite::Row<'_>,
    idx: usize,
    column: &str,
) -> Result<ValueRef<'r>> {
    row.get_ref(idx)
        .map_err(|e| MigrationError::source(format!("reading {}.{}", descriptor.name, column), e))
}

/// A query parameter re-encoded for the target column's declared type.
#[derive(Debug)]
pub enum TargetParam<'a> {
    Int2(Option<i16>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Text(Option<&'a str>),
    Bytes(Option<&'a [u8]>),
}

impl TargetParam<'_> {
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            TargetParam::Int2(v) => v,
            TargetParam::Int4(v) => v,
            TargetParam::Int8(v) => v,
            TargetParam::Text(v) => v,
            TargetParam::Bytes(v) => v,
        }
    }
}

/// One source row decoded per its table descriptor.
#[derive(Debug)]
pub struct RowInstance<'d> {
    descriptor: &'d TableDescriptor,
    values: Vec<FieldValue>,
}

impl<'d> RowInstance<'d> {
    /// Decode a row positionally; `row_number` is 1-based and only used
    /// for diagnostics. Columns cleared by a row rule are never decoded,
    /// so whatever bytes they hold in the source cannot fail the row.
    pub fn decode(
        descriptor: &'d TableDescriptor,
        row: &rusqlite::Row<'_>,
        row_number: u64,
    ) -> Result<Self> {
        let mut cleared = vec![false; descriptor.fields.len()];
        for rule in descriptor.rules {
            match rule {
                RowRule::ClearWhen {
                    column,
                    when_column,
                    equals,
                } => {
                    let (Some((target, _)), Some((when_idx, _))) =
                        (descriptor.field(column), descriptor.field(when_column))
                    else {
                        continue;
                    };
                    let matches = match read_column(descriptor, row, when_idx, when_column)? {
                        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes == equals.as_bytes(),
                        _ => false,
                    };
                    if matches {
                        tracing::debug!(
                            "Clearing {}.{} at row {} where {} = '{}'",
                            descriptor.name,
                            column,
                            row_number,
                            when_column,
                            equals
                        );
                        cleared[target] = true;
                    }
                }
            }
        }

        let mut values = Vec::with_capacity(descriptor.fields.len());
        for (idx, field) in descriptor.fields.iter().enumerate() {
            if cleared[idx] {
                values.push(FieldValue::null_of(field.kind));
                continue;
            }
            let raw = read_column(descriptor, row, idx, field.column)?;
            let value = decode_value(field, raw).map_err(|source| MigrationError::Decode {
                table: descriptor.name.to_string(),
                column: field.column.to_string(),
                row: row_number,
                source,
            })?;
            values.push(value);
        }

        Ok(RowInstance { descriptor, values })
    }

    #[cfg(test)]
    pub(crate) fn from_values(descriptor: &'d TableDescriptor, values: Vec<FieldValue>) -> Self {
        RowInstance { descriptor, values }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.descriptor
            .field(column)
            .map(|(idx, _)| &self.values[idx])
    }

    /// Encode every value for the parameter types of the prepared insert.
    pub fn encode(&self, types: &[Type]) -> Result<Vec<TargetParam<'_>>> {
        if types.len() != self.values.len() {
            return Err(MigrationError::Encode {
                table: self.descriptor.name.to_string(),
                column: "*".to_string(),
                reason: format!(
                    "insert expects {} parameters, row has {} values",
                    types.len(),
                    self.values.len()
                ),
            });
        }

        self.values
            .iter()
            .zip(types)
            .zip(self.descriptor.fields)
            .map(|((value, ty), field)| {
                encode_value(value, ty).map_err(|reason| MigrationError::Encode {
                    table: self.descriptor.name.to_string(),
                    column: field.column.to_string(),
                    reason,
                })
            })
            .collect()
    }
}

fn encode_value<'a>(value: &'a FieldValue, ty: &Type) -> std::result::Result<TargetParam<'a>, String> {
    match value {
        FieldValue::Integer(v) => {
            if *ty == Type::INT8 {
                Ok(TargetParam::Int8(*v))
            } else if *ty == Type::INT4 {
                v.map(i32::try_from)
                    .transpose()
                    .map(TargetParam::Int4)
                    .map_err(|_| format!("{:?} does not fit in INT4", v))
            } else if *ty == Type::INT2 {
                v.map(i16::try_from)
                    .transpose()
                    .map(TargetParam::Int2)
                    .map_err(|_| format!("{:?} does not fit in INT2", v))
            } else {
                Err(format!("cannot encode integer as {}", ty))
            }
        }
        FieldValue::Text(v) => {
            if <&str as ToSql>::accepts(ty) {
                Ok(TargetParam::Text(v.as_deref()))
            } else {
                Err(format!("cannot encode text as {}", ty))
            }
        }
        FieldValue::Binary(v) => {
            if *ty == Type::BYTEA {
                Ok(TargetParam::Bytes(v.encode()))
            } else {
                Err(format!("cannot encode binary as {}", ty))
            }
        }
    }
}
