//! Type system for frame columns and expressions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    // Primitives
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,

    // Text
    String,

    // Binary
    Binary,

    // Temporal
    Timestamp,
}

impl DataType {
    /// Canonical dtype name, as the dataframe layer spells it
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::String => "string",
            DataType::Binary => "binary",
            DataType::Timestamp => "timestamp",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Dtype of the scalar type `T`
    pub fn of<T: ScalarType>() -> Self {
        T::DTYPE
    }

    /// Result type of an arithmetic operation over `self` and `other`.
    ///
    /// Floats win over integers, wider integers win over narrower ones;
    /// anything non-numeric falls back to `self`.
    pub fn common_numeric(self, other: DataType) -> DataType {
        match (self.is_float(), other.is_float()) {
            (true, _) | (_, true) => DataType::Float64,
            _ if self.is_integer() && other.is_integer() => {
                if self.width() >= other.width() {
                    self
                } else {
                    other
                }
            }
            _ => self,
        }
    }

    fn width(&self) -> u8 {
        match self {
            DataType::Int8 | DataType::UInt8 => 8,
            DataType::Int16 | DataType::UInt16 => 16,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 32,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 | DataType::Timestamp => 64,
            DataType::Bool => 1,
            DataType::String | DataType::Binary => 0,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a Rust scalar type onto its dtype.
///
/// Expression builders use this to type their results, e.g. comparisons are
/// typed as `DataType::of::<bool>()` and counts as `DataType::of::<i64>()`.
pub trait ScalarType {
    const DTYPE: DataType;
}

macro_rules! scalar_type {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl ScalarType for $ty {
            const DTYPE: DataType = DataType::$dtype;
        })*
    };
}

scalar_type! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl FieldType {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldType>,
}

impl Schema {
    pub fn new(fields: Vec<FieldType>) -> Self {
        Self { fields }
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<FieldType> for Schema {
    fn from_iter<I: IntoIterator<Item = FieldType>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
