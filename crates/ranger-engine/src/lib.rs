//! # Ranger Engine - SQL Entry Point
//!
//! The query engine parses SQL into a tagged statement, resolves the
//! effective database from the query context, and routes: reads go to the
//! embedded DataFusion backend, writes and DDL go through the storage
//! manager, `SHOW` and `system.*` forms are served from the metadata
//! registry. Execution is safe under concurrent invocation; unrelated
//! queries never serialize on each other.

pub mod backend;
pub mod statement;
pub mod streaming;
pub mod system;

use async_trait::async_trait;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ranger_core::{
    codes, Component, QueryContext, QueryResult, RangerError, Result, DEFAULT_DATABASE,
};
use ranger_meta::MetadataRegistry;
use ranger_storage::{Row, StorageManager};

use backend::{AnalyticBackend, DataFusionBackend};
use statement::{QualifiedName, Statement};
use streaming::{BatchStream, JsonBatchReader, TableBatchStream};

pub const COMPONENT_TAG: &str = "engine";

/// The SQL execution component.
pub struct QueryEngine {
    storage: Arc<StorageManager>,
    registry: Arc<MetadataRegistry>,
    backend: Arc<dyn AnalyticBackend>,
    running: AtomicBool,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

impl QueryEngine {
    pub fn new(storage: Arc<StorageManager>, registry: Arc<MetadataRegistry>) -> Self {
        let backend = Arc::new(DataFusionBackend::new(storage.clone()));
        Self::with_backend(storage, registry, backend)
    }

    pub fn with_backend(
        storage: Arc<StorageManager>,
        registry: Arc<MetadataRegistry>,
        backend: Arc<dyn AnalyticBackend>,
    ) -> Self {
        Self {
            storage,
            registry,
            backend,
            running: AtomicBool::new(true),
        }
    }

    /// Parse, validate, route, and execute one statement.
    pub async fn execute_query(
        &self,
        cancel: &CancellationToken,
        qctx: &QueryContext,
    ) -> Result<QueryResult> {
        if !self.running.load(Ordering::Acquire) {
            return Err(RangerError::new(
                codes::QUERY_NOT_RUNNING,
                "query engine is shut down",
            ));
        }
        if let Some(deadline) = qctx.deadline {
            if chrono::Utc::now() > deadline {
                return Err(RangerError::new(
                    codes::COMMON_TIMEOUT,
                    "query deadline exceeded before execution",
                ));
            }
        }

        let started = Instant::now();
        let stmt = Statement::parse(&qctx.sql_text)?;
        let effective_db = self.resolve_effective_database(qctx)?;
        debug!(
            database = %effective_db,
            user = %qctx.user_id,
            sql = %qctx.sql_text,
            "routing statement"
        );

        let user = if qctx.user_id.is_empty() {
            "system"
        } else {
            &qctx.user_id
        };
        self.registry.log_access_best_effort(user, &qctx.sql_text);

        match stmt {
            Statement::Select { sql } | Statement::OtherDdl { sql } => {
                let output = self.run_on_backend(cancel, &effective_db, &sql).await?;
                Ok(QueryResult::new(
                    output.columns,
                    output.rows,
                    "",
                    started.elapsed(),
                ))
            }
            Statement::Insert {
                table,
                columns,
                rows,
            } => {
                let database = table.database.as_deref().unwrap_or(&effective_db);
                let rows = self.reorder_insert_rows(database, &table.table, &columns, rows)?;
                let inserted = self.storage.insert_data(database, &table.table, &rows)?;
                Ok(QueryResult::empty(
                    format!("INSERT {inserted}"),
                    started.elapsed(),
                ))
            }
            Statement::CreateTable {
                table,
                schema,
                engine,
                if_not_exists,
            } => {
                let database = table.database.as_deref().unwrap_or(&effective_db);
                if if_not_exists && self.storage.table_exists(database, &table.table)? {
                    return Ok(QueryResult::empty(
                        format!("Table {} already exists (IF NOT EXISTS)", table.table),
                        started.elapsed(),
                    ));
                }
                let blob = schema.to_blob()?;
                self.storage
                    .create_table(database, &table.table, &blob, &engine, "")?;
                Ok(QueryResult::empty(
                    "Table created successfully",
                    started.elapsed(),
                ))
            }
            Statement::DropTable { table, if_exists } => {
                let database = table.database.as_deref().unwrap_or(&effective_db);
                let existed = self.storage.drop_table(database, &table.table, if_exists)?;
                let message = if existed {
                    format!("Table {} dropped", table.table)
                } else {
                    format!("Table {} does not exist (IF EXISTS)", table.table)
                };
                Ok(QueryResult::empty(message, started.elapsed()))
            }
            Statement::ShowDatabases => {
                let rows: Vec<Row> = self
                    .registry
                    .list_databases()?
                    .into_iter()
                    .map(|db| vec![serde_json::json!(db.name)])
                    .collect();
                Ok(QueryResult::new(
                    vec!["Database".into()],
                    rows,
                    "",
                    started.elapsed(),
                ))
            }
            Statement::ShowTables { database } => {
                let database = match database {
                    Some(db) => {
                        self.validate_database(&db)?;
                        db
                    }
                    None => effective_db,
                };
                let rows: Vec<Row> = self
                    .storage
                    .list_tables(&database)?
                    .into_iter()
                    .map(|t| vec![serde_json::json!(t)])
                    .collect();
                let message = format!("{} tables in database {}", rows.len(), database);
                Ok(QueryResult::new(
                    vec!["Table".into()],
                    rows,
                    message,
                    started.elapsed(),
                ))
            }
            Statement::ShowColumns { table } => {
                let (database, name) = self.qualify(&table, &effective_db);
                self.require_table(&database, &name)?;
                let rows: Vec<Row> = self
                    .registry
                    .get_columns(&database, &name)?
                    .into_iter()
                    .map(|c| {
                        vec![
                            serde_json::json!(c.column_name),
                            serde_json::json!(c.data_type),
                            serde_json::json!(c.is_nullable),
                            serde_json::json!(c.is_primary),
                        ]
                    })
                    .collect();
                Ok(QueryResult::new(
                    vec![
                        "column_name".into(),
                        "data_type".into(),
                        "nullable".into(),
                        "primary".into(),
                    ],
                    rows,
                    "",
                    started.elapsed(),
                ))
            }
            Statement::ShowCreateTable { table } => {
                let (database, name) = self.qualify(&table, &effective_db);
                let ddl = self.render_create_table(&database, &name)?;
                Ok(QueryResult::new(
                    vec!["Table".into(), "Create Table".into()],
                    vec![vec![serde_json::json!(name), serde_json::json!(ddl)]],
                    "",
                    started.elapsed(),
                ))
            }
            Statement::SystemSelect { table, filter } => {
                let (columns, rows) = system::execute(&self.registry, table, filter)?;
                Ok(QueryResult::new(columns, rows, "", started.elapsed()))
            }
        }
    }

    // ---- streaming ------------------------------------------------------

    /// Insert one batch of rows.
    pub fn insert_data(&self, database: &str, table: &str, rows: &[Row]) -> Result<usize> {
        self.storage.insert_data(database, table, rows)
    }

    /// Insert rows in chunks of at most `batch_size`, bounding the batch
    /// held in memory by the storage layer.
    pub fn insert_data_batch_streaming(
        &self,
        database: &str,
        table: &str,
        rows: &[Row],
        batch_size: usize,
    ) -> Result<usize> {
        if batch_size == 0 {
            return Err(RangerError::new(
                codes::COMMON_INVALID_INPUT,
                "batch_size must be positive",
            ));
        }
        let mut inserted = 0;
        for (index, chunk) in rows.chunks(batch_size).enumerate() {
            inserted += self
                .storage
                .insert_data(database, table, chunk)
                .map_err(|e| e.with_context("batch_index", index))?;
        }
        Ok(inserted)
    }

    /// Insert newline-delimited JSON row batches from `reader`.
    ///
    /// Aborts on the first malformed or rejected batch; the error context
    /// carries the offending batch index.
    pub fn insert_data_streaming(
        &self,
        database: &str,
        table: &str,
        reader: impl BufRead,
    ) -> Result<usize> {
        let mut batches = JsonBatchReader::new(reader);
        let mut inserted = 0;
        while let Some(batch) = batches.next_batch()? {
            inserted += self
                .storage
                .insert_data(database, table, &batch)
                .map_err(|e| e.with_context("batch_index", batches.batch_index() - 1))?;
        }
        Ok(inserted)
    }

    /// Stream a table's batches in the same newline-delimited JSON format.
    pub fn get_table_data_streaming(&self, database: &str, table: &str) -> Result<TableBatchStream> {
        let paths = self.storage.data_file_paths(database, table)?;
        Ok(TableBatchStream::new(paths))
    }

    // ---- parquet import -------------------------------------------------

    /// Import a parquet file into a table, creating it when missing.
    pub async fn import_parquet(
        &self,
        file_path: &str,
        table: &str,
        namespace: &str,
        overwrite: bool,
    ) -> Result<usize> {
        use datafusion::prelude::{ParquetReadOptions, SessionContext};

        let ctx = SessionContext::new();
        let df = ctx
            .read_parquet(file_path, ParquetReadOptions::default())
            .await
            .map_err(|e| {
                RangerError::new(
                    codes::COMMON_INVALID_INPUT,
                    format!("failed to read parquet file {file_path:?}"),
                )
                .with_cause(e)
            })?;

        let schema = backend::table_schema_from_arrow(df.schema().as_arrow())?;
        let batches = df.collect().await.map_err(|e| {
            RangerError::new(codes::COMMON_INTERNAL, "failed to decode parquet data")
                .with_cause(e)
        })?;

        if overwrite {
            self.storage.drop_table(namespace, table, true)?;
        }
        if !self.storage.table_exists(namespace, table)? {
            self.storage
                .create_table(namespace, table, &schema.to_blob()?, "ICEBERG", "")?;
        }

        let mut inserted = 0;
        for batch in &batches {
            let rows = backend::batch_to_rows(batch)?;
            inserted += self.storage.insert_data(namespace, table, &rows)?;
        }
        info!(file = file_path, namespace, table, rows = inserted, "imported parquet file");
        Ok(inserted)
    }

    // ---- helpers --------------------------------------------------------

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn metadata_manager(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    /// The effective database: the context's when non-empty, else
    /// `default`. Non-default names must exist in the catalog; `default`
    /// is implicitly present.
    fn resolve_effective_database(&self, qctx: &QueryContext) -> Result<String> {
        let name = if qctx.database_name.is_empty() {
            DEFAULT_DATABASE.to_string()
        } else {
            qctx.database_name.clone()
        };
        self.validate_database(&name)?;
        Ok(name)
    }

    fn validate_database(&self, name: &str) -> Result<()> {
        if name != DEFAULT_DATABASE && !self.registry.database_exists(name)? {
            return Err(RangerError::new(
                codes::QUERY_DATABASE_NOT_FOUND,
                format!("database {name:?} not found"),
            )
            .with_context("database", name));
        }
        Ok(())
    }

    fn qualify(&self, table: &QualifiedName, effective_db: &str) -> (String, String) {
        (
            table
                .database
                .clone()
                .unwrap_or_else(|| effective_db.to_string()),
            table.table.clone(),
        )
    }

    fn require_table(&self, database: &str, table: &str) -> Result<()> {
        if !self.storage.table_exists(database, table)? {
            return Err(RangerError::new(
                codes::QUERY_NOT_FOUND,
                format!("table {database}.{table} does not exist"),
            )
            .with_context("database", database)
            .with_context("table", table));
        }
        Ok(())
    }

    async fn run_on_backend(
        &self,
        cancel: &CancellationToken,
        database: &str,
        sql: &str,
    ) -> Result<backend::QueryOutput> {
        tokio::select! {
            _ = cancel.cancelled() => Err(RangerError::new(
                codes::COMMON_CANCELLED,
                "query cancelled",
            )),
            output = self.backend.execute(database, sql) => output,
        }
    }

    /// Reorder INSERT values into schema column order. An explicit column
    /// list may omit nullable columns; unknown columns are rejected.
    fn reorder_insert_rows(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        rows: Vec<Row>,
    ) -> Result<Vec<Row>> {
        if columns.is_empty() {
            return Ok(rows);
        }
        let schema = self.storage.get_ordered_schema(database, table)?;
        for name in columns {
            if schema.column(name).is_none() {
                return Err(RangerError::new(
                    codes::QUERY_VALIDATION_FAILED,
                    format!("unknown column {name:?} in INSERT into {database}.{table}"),
                )
                .with_context("column", name.as_str()));
            }
        }
        let mut reordered = Vec::with_capacity(rows.len());
        for (row_index, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(RangerError::new(
                    codes::QUERY_VALIDATION_FAILED,
                    format!(
                        "row {row_index} has {} values for {} named columns",
                        row.len(),
                        columns.len()
                    ),
                ));
            }
            let mut out = Vec::with_capacity(schema.columns.len());
            for spec in &schema.columns {
                match columns.iter().position(|c| c == &spec.name) {
                    Some(i) => out.push(row[i].clone()),
                    None => out.push(serde_json::Value::Null),
                }
            }
            reordered.push(out);
        }
        Ok(reordered)
    }

    fn render_create_table(&self, database: &str, table: &str) -> Result<String> {
        self.require_table(database, table)?;
        let columns = self.registry.get_columns(database, table)?;
        let engine = self
            .registry
            .get_table_metadata(database, table)?
            .map(|m| m.engine_name)
            .unwrap_or_else(|| "ICEBERG".to_string());

        let mut ddl = format!("CREATE TABLE {database}.{table} (\n");
        for (i, column) in columns.iter().enumerate() {
            ddl.push_str(&format!("  {} {}", column.column_name, column.data_type));
            if !column.is_nullable {
                ddl.push_str(" NOT NULL");
            }
            if column.is_primary {
                ddl.push_str(" PRIMARY KEY");
            }
            if i + 1 < columns.len() {
                ddl.push(',');
            }
            ddl.push('\n');
        }
        ddl.push_str(&format!(") ENGINE = {engine}"));
        Ok(ddl)
    }
}

#[async_trait]
impl Component for QueryEngine {
    fn type_tag(&self) -> &'static str {
        COMPONENT_TAG
    }

    async fn shutdown(&self, _cancel: &CancellationToken) -> Result<()> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranger_meta::{Catalog, MetadataDb, PathManager};

    async fn engine() -> (tempfile::TempDir, QueryEngine) {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = Arc::new(PathManager::new(tmp.path()));
        paths.ensure_layout().unwrap();
        let registry =
            Arc::new(ranger_meta::MetadataRegistry::open(MetadataDb::open_in_memory().unwrap()).unwrap());
        let catalog = Arc::new(Catalog::new(registry.clone()).unwrap());
        let storage = Arc::new(StorageManager::new(paths, catalog, registry.clone()));
        (tmp, QueryEngine::new(storage, registry))
    }

    fn ctx(sql: &str, database: &str) -> QueryContext {
        let mut qctx = QueryContext::new(sql).with_user("tester");
        qctx.database_name = database.to_string();
        qctx
    }

    async fn run(engine: &QueryEngine, sql: &str, database: &str) -> Result<QueryResult> {
        engine
            .execute_query(&CancellationToken::new(), &ctx(sql, database))
            .await
    }

    #[tokio::test]
    async fn test_empty_database_falls_back_to_default() {
        let (_tmp, engine) = engine().await;
        let result = run(&engine, "SHOW TABLES;", "").await.unwrap();
        assert_eq!(result.columns, vec!["Table"]);
        assert!(result.message.contains("default"));
    }

    #[tokio::test]
    async fn test_unknown_database_rejected() {
        let (_tmp, engine) = engine().await;
        let err = run(&engine, "SHOW TABLES;", "ghost").await.unwrap_err();
        assert_eq!(err.code().as_str(), codes::QUERY_DATABASE_NOT_FOUND);
        assert!(err.message().contains("ghost"));
    }

    #[tokio::test]
    async fn test_create_insert_select_drop_cycle() {
        let (_tmp, engine) = engine().await;
        let created = run(
            &engine,
            "CREATE TABLE events (id BIGINT PRIMARY KEY, label VARCHAR(32));",
            "",
        )
        .await
        .unwrap();
        assert_eq!(created.message, "Table created successfully");

        let inserted = run(
            &engine,
            "INSERT INTO events (id, label) VALUES (1, 'open'), (2, 'close');",
            "",
        )
        .await
        .unwrap();
        assert_eq!(inserted.message, "INSERT 2");

        let selected = run(&engine, "SELECT id, label FROM events ORDER BY id;", "")
            .await
            .unwrap();
        assert_eq!(selected.row_count, 2);
        assert_eq!(selected.rows[0][0], serde_json::json!(1));
        assert_eq!(selected.rows[1][1], serde_json::json!("close"));

        let dropped = run(&engine, "DROP TABLE events;", "").await.unwrap();
        assert!(dropped.message.contains("dropped"));
    }

    #[tokio::test]
    async fn test_qualified_create_overrides_context() {
        let (_tmp, engine) = engine().await;
        engine.storage().create_database("dba").unwrap();
        engine.storage().create_database("dbb").unwrap();

        let result = run(
            &engine,
            "CREATE TABLE dbb.t (id INT) ENGINE = MEMORY;",
            "dba",
        )
        .await
        .unwrap();
        assert_eq!(result.message, "Table created successfully");
        assert!(engine.storage().table_exists("dbb", "t").unwrap());
        assert!(!engine.storage().table_exists("dba", "t").unwrap());
    }

    #[tokio::test]
    async fn test_drop_if_exists_missing_table() {
        let (_tmp, engine) = engine().await;
        let result = run(&engine, "DROP TABLE IF EXISTS nope;", "").await.unwrap();
        assert!(result.message.contains("does not exist (IF EXISTS)"));
    }

    #[tokio::test]
    async fn test_show_databases_and_columns() {
        let (_tmp, engine) = engine().await;
        engine.storage().create_database("dba").unwrap();
        let dbs = run(&engine, "SHOW DATABASES;", "").await.unwrap();
        assert_eq!(dbs.columns, vec!["Database"]);
        assert_eq!(dbs.row_count, 2);

        run(
            &engine,
            "CREATE TABLE dba.t (id INT NOT NULL, note TEXT);",
            "",
        )
        .await
        .unwrap();
        let cols = run(&engine, "SHOW COLUMNS FROM dba.t;", "").await.unwrap();
        assert_eq!(cols.row_count, 2);
        assert_eq!(cols.rows[0][0], serde_json::json!("id"));
        assert_eq!(cols.rows[0][2], serde_json::json!(false));

        let ddl = run(&engine, "SHOW CREATE TABLE dba.t;", "").await.unwrap();
        assert_eq!(ddl.columns, vec!["Table", "Create Table"]);
        let rendered = ddl.rows[0][1].as_str().unwrap();
        assert!(rendered.contains("CREATE TABLE dba.t"));
        assert!(rendered.contains("id int32 NOT NULL"));
    }

    #[tokio::test]
    async fn test_system_tables_with_filter() {
        let (_tmp, engine) = engine().await;
        engine.storage().create_database("dba").unwrap();
        run(&engine, "CREATE TABLE dba.t (id INT);", "").await.unwrap();

        let all = run(&engine, "SELECT * FROM system.tables;", "").await.unwrap();
        assert_eq!(all.row_count, 1);

        let filtered = run(
            &engine,
            "SELECT * FROM system.tables WHERE database = 'default';",
            "",
        )
        .await
        .unwrap();
        assert_eq!(filtered.row_count, 0);

        let databases = run(&engine, "SELECT * FROM system.databases;", "").await.unwrap();
        assert_eq!(databases.row_count, 2);

        let columns = run(
            &engine,
            "SELECT * FROM system.columns WHERE table_name = 't';",
            "",
        )
        .await
        .unwrap();
        assert_eq!(columns.row_count, 1);
    }

    #[tokio::test]
    async fn test_unsupported_and_parse_errors() {
        let (_tmp, engine) = engine().await;
        let parse = run(&engine, "SELEKT 1;", "").await.unwrap_err();
        assert_eq!(parse.code().as_str(), codes::QUERY_PARSE_FAILED);

        let unknown_col = run(
            &engine,
            "SELECT nope FROM missing_table;",
            "",
        )
        .await
        .unwrap_err();
        assert_eq!(unknown_col.code().as_str(), codes::QUERY_VALIDATION_FAILED);
    }

    #[tokio::test]
    async fn test_streaming_insert_batches() {
        let (_tmp, engine) = engine().await;
        run(&engine, "CREATE TABLE big (id BIGINT);", "").await.unwrap();

        let rows: Vec<Row> = (0..1000).map(|i| vec![serde_json::json!(i)]).collect();
        let inserted = engine
            .insert_data_batch_streaming("default", "big", &rows, 100)
            .unwrap();
        assert_eq!(inserted, 1000);

        // every stored batch respects the bound
        let mut stream = engine.get_table_data_streaming("default", "big").unwrap();
        let mut total = 0;
        while let Some(batch) = stream.next_batch().unwrap() {
            assert!(batch.len() <= 100);
            total += batch.len();
        }
        assert_eq!(total, 1000);
    }

    #[tokio::test]
    async fn test_streaming_insert_from_reader() {
        let (_tmp, engine) = engine().await;
        run(&engine, "CREATE TABLE s (id BIGINT);", "").await.unwrap();

        let input = "[[1],[2]]\n[[3]]\n";
        let inserted = engine
            .insert_data_streaming("default", "s", input.as_bytes())
            .unwrap();
        assert_eq!(inserted, 3);

        let bad = "[[4]]\n[[\"not\", \"matching\"]]\n";
        let err = engine
            .insert_data_streaming("default", "s", bad.as_bytes())
            .unwrap_err();
        assert_eq!(
            err.context().get("batch_index"),
            Some(&ranger_core::ContextValue::Int(1))
        );
    }

    #[tokio::test]
    async fn test_engine_rejects_after_shutdown() {
        let (_tmp, engine) = engine().await;
        engine.shutdown(&CancellationToken::new()).await.unwrap();
        let err = run(&engine, "SHOW DATABASES;", "").await.unwrap_err();
        assert_eq!(err.code().as_str(), codes::QUERY_NOT_RUNNING);
    }
}
