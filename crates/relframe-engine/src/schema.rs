use arrow::datatypes::{DataType as ArrowType, Schema as ArrowSchema};
use relframe_ir::{DataType, FieldType, Schema};

use crate::EngineError;

/// Frame column type of an Arrow column type
pub fn import_type(data_type: &ArrowType) -> Option<DataType> {
    let dtype = match data_type {
        ArrowType::Boolean => DataType::Bool,
        ArrowType::Int8 => DataType::Int8,
        ArrowType::Int16 => DataType::Int16,
        ArrowType::Int32 => DataType::Int32,
        ArrowType::Int64 => DataType::Int64,
        ArrowType::UInt8 => DataType::UInt8,
        ArrowType::UInt16 => DataType::UInt16,
        ArrowType::UInt32 => DataType::UInt32,
        ArrowType::UInt64 => DataType::UInt64,
        ArrowType::Float32 => DataType::Float32,
        ArrowType::Float64 => DataType::Float64,
        ArrowType::Utf8 | ArrowType::LargeUtf8 | ArrowType::Utf8View => DataType::String,
        ArrowType::Binary | ArrowType::LargeBinary | ArrowType::BinaryView => DataType::Binary,
        ArrowType::Timestamp(_, _) => DataType::Timestamp,
        _ => return None,
    };
    Some(dtype)
}

/// Frame schema of an Arrow schema
pub fn frame_schema(schema: &ArrowSchema) -> Result<Schema, EngineError> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let data_type = import_type(field.data_type()).ok_or_else(|| {
                EngineError::UnsupportedColumnType {
                    column: field.name().clone(),
                    data_type: field.data_type().to_string(),
                }
            })?;
            Ok(FieldType {
                name: field.name().clone(),
                data_type,
                nullable: field.is_nullable(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Schema::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    #[test]
    fn test_frame_schema() {
        let schema = ArrowSchema::new(vec![
            Field::new("id", ArrowType::Int64, false),
            Field::new("name", ArrowType::Utf8, true),
            Field::new("ts", ArrowType::Timestamp(TimeUnit::Millisecond, None), true),
        ]);

        let frame = frame_schema(&schema).unwrap();
        assert_eq!(frame.names().collect::<Vec<_>>(), vec!["id", "name", "ts"]);
        assert_eq!(frame.fields[0].data_type, DataType::Int64);
        assert!(!frame.fields[0].nullable);
        assert_eq!(frame.fields[1].data_type, DataType::String);
        assert_eq!(frame.fields[2].data_type, DataType::Timestamp);
    }

    #[test]
    fn test_unsupported_column() {
        let schema = ArrowSchema::new(vec![Field::new("d", ArrowType::Date32, true)]);
        let err = frame_schema(&schema).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedColumnType { ref column, .. } if column == "d"));
    }
}
