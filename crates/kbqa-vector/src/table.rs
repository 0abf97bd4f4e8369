//! LanceDB connection and collection helpers.

use anyhow::Result;
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection, Table};
use tracing::info;

use crate::schema::build_arrow_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

/// Open `name`, creating an empty collection with a `dim`-wide vector column
/// if it does not exist yet.
pub async fn get_or_create_collection(conn: &Connection, name: &str, dim: i32) -> Result<Table> {
    let names = conn.table_names().execute().await?;
    if names.iter().any(|n| n == name) {
        return Ok(conn.open_table(name).execute().await?);
    }
    let schema = build_arrow_schema(dim);
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    let table = conn.create_table(name, Box::new(iter)).execute().await?;
    info!(collection = name, dim, "created vector collection");
    Ok(table)
}

pub async fn open_collection(conn: &Connection, name: &str) -> Result<Table> {
    Ok(conn.open_table(name).execute().await?)
}
