//! Row types for the normalized metadata tables.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseRow {
    pub id: i64,
    pub name: String,
    pub owner_user_id: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub id: i64,
    pub database_id: i64,
    pub name: String,
    pub table_type: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnRow {
    pub id: i64,
    pub table_id: i64,
    pub column_name: String,
    pub data_type: String,
    pub ordinal_position: i64,
    pub is_nullable: bool,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableMetadataRow {
    pub id: i64,
    pub table_id: i64,
    pub schema_blob: String,
    pub engine_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableFileRow {
    pub id: i64,
    pub table_id: i64,
    pub path: String,
    pub file_type: String,
    pub iceberg_metadata_state: String,
}

