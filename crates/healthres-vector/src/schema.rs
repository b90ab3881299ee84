use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const ABSTRACT_COLUMN: &str = "abstract";
pub const AUTHORS_COLUMN: &str = "authors";
pub const YEAR_COLUMN: &str = "publication_year";
pub const VECTOR_COLUMN: &str = "vector";

/// Arrow schema of one index table; the `vector` width is the index dimension.
pub fn build_records_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID_COLUMN, DataType::Utf8, false),
		Field::new(ABSTRACT_COLUMN, DataType::Utf8, false),
		Field::new(AUTHORS_COLUMN, DataType::Utf8, false),
		Field::new(YEAR_COLUMN, DataType::Int32, false),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Width of the `vector` column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}
