use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::FieldId;

/// Max length assumed for VarChar fields that do not declare one.
pub const DEFAULT_VARCHAR_MAX_LENGTH: usize = 256;

/// Column data types understood by the storage layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    VarChar,
    BinaryVector,
    FloatVector,
}

impl DataType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::VarChar => "VarChar",
            Self::BinaryVector => "BinaryVector",
            Self::FloatVector => "FloatVector",
        }
    }
}

/// Optional per-field parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeParams {
    pub dim: Option<usize>,
    pub max_length: Option<usize>,
}

/// One field of a collection schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSchema {
    pub field_id: FieldId,
    pub name: String,
    #[serde(default)]
    pub is_primary_key: bool,
    pub data_type: DataType,
    #[serde(default)]
    pub type_params: TypeParams,
}

impl FieldSchema {
    pub fn new(field_id: FieldId, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            field_id,
            name: name.into(),
            is_primary_key: false,
            data_type,
            type_params: TypeParams::default(),
        }
    }

    /// Marks the field as the collection primary key.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    #[must_use]
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.type_params.dim = Some(dim);
        self
    }

    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.type_params.max_length = Some(max_length);
        self
    }

    /// Estimated bytes one value of this field occupies.
    #[must_use]
    pub fn estimate_size(&self) -> usize {
        match self.data_type {
            DataType::Bool | DataType::Int8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 | DataType::Float => 4,
            DataType::Int64 | DataType::Double => 8,
            DataType::VarChar => self
                .type_params
                .max_length
                .unwrap_or(DEFAULT_VARCHAR_MAX_LENGTH),
            DataType::FloatVector => 4 * self.type_params.dim.unwrap_or(0),
            DataType::BinaryVector => self.type_params.dim.unwrap_or(0) / 8,
        }
    }
}

/// Schema of a collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Estimated bytes of one full record.
    #[must_use]
    pub fn estimate_size_per_record(&self) -> usize {
        self.fields.iter().map(FieldSchema::estimate_size).sum()
    }

    /// Returns the primary-key field.
    pub fn primary_key_field(&self) -> CoreResult<&FieldSchema> {
        self.fields
            .iter()
            .find(|f| f.is_primary_key)
            .ok_or_else(|| {
                CoreError::Validation(format!("collection `{}` has no primary key field", self.name))
            })
    }
}

/// One column of values from an insert batch.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    VarChar(Vec<String>),
    BinaryVector { dim: usize, data: Vec<u8> },
    FloatVector { dim: usize, data: Vec<f32> },
}

impl FieldData {
    /// Name of the column kind, used in errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "Bool",
            Self::Int8(_) => "Int8",
            Self::Int16(_) => "Int16",
            Self::Int32(_) => "Int32",
            Self::Int64(_) => "Int64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::VarChar(_) => "VarChar",
            Self::BinaryVector { .. } => "BinaryVector",
            Self::FloatVector { .. } => "FloatVector",
        }
    }

    /// Number of rows carried by the column.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::VarChar(v) => v.len(),
            Self::BinaryVector { dim, data } => {
                let row_bytes = dim / 8;
                if row_bytes == 0 {
                    0
                } else {
                    data.len() / row_bytes
                }
            }
            Self::FloatVector { dim, data } => {
                if *dim == 0 {
                    0
                } else {
                    data.len() / dim
                }
            }
        }
    }
}
