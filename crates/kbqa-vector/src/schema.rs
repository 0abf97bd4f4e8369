use arrow_schema::{Schema, Field, DataType};
use std::sync::Arc;

/// Collection layout: one row per corpus unit plus its embedding.
pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("source", DataType::Utf8, false),
		Field::new("block_idx", DataType::Int64, false),
		Field::new("section_path", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
