//! Arrow schema for the memory vector collection.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

pub const ID_COLUMN: &str = "id";
pub const VECTOR_COLUMN: &str = "vector";
/// Added by LanceDB to vector search results.
pub const DISTANCE_COLUMN: &str = "_distance";

/// Element field of the fixed-size vector list.
pub fn vector_item_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, true))
}

/// `{ id: Int64, vector: FixedSizeList<Float32, dimension> }`.
///
/// `id` carries the text log's key; LanceDB assigns nothing.
pub fn memory_vector_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Int64, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(vector_item_field(), dimension),
            false,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_vector_schema_fields() {
        let schema = memory_vector_schema(768);
        assert_eq!(schema.fields().len(), 2);

        let id = schema.field_with_name(ID_COLUMN).unwrap();
        assert_eq!(id.data_type(), &DataType::Int64);
        assert!(!id.is_nullable());

        match schema.field_with_name(VECTOR_COLUMN).unwrap().data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, 768),
            other => panic!("Expected FixedSizeList, got {:?}", other),
        }
    }
}
