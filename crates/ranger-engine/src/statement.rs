//! Statement recognition and decoding.
//!
//! SQL text is parsed into a tagged [`Statement`] with one case per kind;
//! the router dispatches on the tag. `SHOW …` forms and system-catalog
//! selects are recognized up front; everything else goes through the SQL
//! parser. SQL type names are mapped from their rendered form, so the
//! mapping is independent of the parser's AST surface.

use sqlparser::ast::{
    self, BinaryOperator, Expr, ObjectType, SetExpr, TableFactor, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use ranger_core::{codes, ColumnSpec, DataType, RangerError, Result, TableSchema};

/// A table name with an optional qualifying database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    pub database: Option<String>,
    pub table: String,
}

/// System-catalog tables served directly from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTable {
    Databases,
    Tables,
    Columns,
}

/// A parsed statement, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SELECT and other read-only forms, forwarded verbatim to the backend.
    Select { sql: String },
    Insert {
        table: QualifiedName,
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    CreateTable {
        table: QualifiedName,
        schema: TableSchema,
        engine: String,
        if_not_exists: bool,
    },
    DropTable {
        table: QualifiedName,
        if_exists: bool,
    },
    ShowDatabases,
    ShowTables { database: Option<String> },
    ShowColumns { table: QualifiedName },
    ShowCreateTable { table: QualifiedName },
    SystemSelect {
        table: SystemTable,
        filter: Option<(String, String)>,
    },
    /// DDL the engine does not interpret itself.
    OtherDdl { sql: String },
}

impl Statement {
    /// Parse one SQL statement.
    pub fn parse(sql: &str) -> Result<Self> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(parse_failed("empty statement"));
        }
        if let Some(show) = parse_show(trimmed)? {
            return Ok(show);
        }

        let parsed = Parser::parse_sql(&GenericDialect {}, trimmed)
            .map_err(|e| parse_failed(e.to_string()))?;
        if parsed.len() != 1 {
            return Err(RangerError::new(
                codes::QUERY_UNSUPPORTED_STATEMENT,
                format!("expected one statement, got {}", parsed.len()),
            ));
        }

        match parsed.into_iter().next().unwrap() {
            ast::Statement::Query(query) => {
                if let Some(system) = parse_system_select(&query)? {
                    return Ok(system);
                }
                Ok(Self::Select {
                    sql: trimmed.to_string(),
                })
            }
            ast::Statement::Insert(insert) => parse_insert(insert),
            ast::Statement::CreateTable(create) => parse_create_table(trimmed, create),
            ast::Statement::Drop {
                object_type: ObjectType::Table,
                if_exists,
                names,
                ..
            } => {
                let name = names.into_iter().next().ok_or_else(|| {
                    parse_failed("DROP TABLE requires a table name")
                })?;
                Ok(Self::DropTable {
                    table: qualified_name(&name)?,
                    if_exists,
                })
            }
            _ => Ok(Self::OtherDdl {
                sql: trimmed.to_string(),
            }),
        }
    }
}

fn parse_failed(message: impl Into<String>) -> RangerError {
    RangerError::new(codes::QUERY_PARSE_FAILED, message.into())
}

/// Recognize the `SHOW …` family with a token scan.
fn parse_show(sql: &str) -> Result<Option<Statement>> {
    let stripped = sql.trim_end_matches(';').trim();
    let tokens: Vec<&str> = stripped.split_whitespace().collect();
    if tokens.is_empty() || !tokens[0].eq_ignore_ascii_case("show") {
        return Ok(None);
    }
    let upper: Vec<String> = tokens.iter().map(|t| t.to_ascii_uppercase()).collect();
    match upper.get(1).map(String::as_str) {
        Some("DATABASES") if tokens.len() == 2 => Ok(Some(Statement::ShowDatabases)),
        Some("TABLES") => match tokens.len() {
            2 => Ok(Some(Statement::ShowTables { database: None })),
            4 if upper[2] == "FROM" || upper[2] == "IN" => Ok(Some(Statement::ShowTables {
                database: Some(tokens[3].to_string()),
            })),
            _ => Err(parse_failed(format!("malformed SHOW TABLES: {sql:?}"))),
        },
        Some("COLUMNS") if tokens.len() == 4 && upper[2] == "FROM" => {
            Ok(Some(Statement::ShowColumns {
                table: split_dotted(tokens[3])?,
            }))
        }
        Some("CREATE") if tokens.len() == 4 && upper[2] == "TABLE" => {
            Ok(Some(Statement::ShowCreateTable {
                table: split_dotted(tokens[3])?,
            }))
        }
        _ => Err(parse_failed(format!("unrecognized SHOW statement: {sql:?}"))),
    }
}

fn split_dotted(name: &str) -> Result<QualifiedName> {
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(table), None, _) => Ok(QualifiedName {
            database: None,
            table: table.to_string(),
        }),
        (Some(db), Some(table), None) if !db.is_empty() && !table.is_empty() => {
            Ok(QualifiedName {
                database: Some(db.to_string()),
                table: table.to_string(),
            })
        }
        _ => Err(parse_failed(format!("malformed table name: {name:?}"))),
    }
}

fn qualified_name(name: &ast::ObjectName) -> Result<QualifiedName> {
    let idents: Vec<String> = name.0.iter().map(|i| i.value.clone()).collect();
    match idents.len() {
        1 => Ok(QualifiedName {
            database: None,
            table: idents.into_iter().next().unwrap(),
        }),
        2 => {
            let mut it = idents.into_iter();
            Ok(QualifiedName {
                database: it.next(),
                table: it.next().unwrap(),
            })
        }
        _ => Err(parse_failed(format!("unsupported table name: {name}"))),
    }
}

/// Recognize `SELECT … FROM system.<table>` with an optional
/// `WHERE col = 'literal'` filter.
fn parse_system_select(query: &ast::Query) -> Result<Option<Statement>> {
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Ok(None);
    };
    if select.from.len() != 1 || !select.from[0].joins.is_empty() {
        return Ok(None);
    }
    let TableFactor::Table { name, .. } = &select.from[0].relation else {
        return Ok(None);
    };
    let qualified = qualified_name(name)?;
    if qualified.database.as_deref() != Some(ranger_core::SYSTEM_DATABASE) {
        return Ok(None);
    }
    let table = match qualified.table.as_str() {
        "databases" => SystemTable::Databases,
        "tables" => SystemTable::Tables,
        "columns" => SystemTable::Columns,
        other => {
            return Err(RangerError::new(
                codes::QUERY_NOT_FOUND,
                format!("unknown system table: system.{other}"),
            ))
        }
    };
    let filter = match &select.selection {
        None => None,
        Some(expr) => Some(parse_system_filter(expr)?),
    };
    Ok(Some(Statement::SystemSelect { table, filter }))
}

fn parse_system_filter(expr: &Expr) -> Result<(String, String)> {
    if let Expr::BinaryOp { left, op, right } = expr {
        if *op == BinaryOperator::Eq {
            if let (Expr::Identifier(ident), Expr::Value(Value::SingleQuotedString(value))) =
                (left.as_ref(), right.as_ref())
            {
                return Ok((ident.value.clone(), value.clone()));
            }
        }
    }
    Err(RangerError::new(
        codes::QUERY_VALIDATION_FAILED,
        "system tables support only `column = 'literal'` filters",
    ))
}

fn parse_insert(insert: ast::Insert) -> Result<Statement> {
    let table = qualified_name(&insert.table_name)?;
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.clone()).collect();
    let source = insert
        .source
        .ok_or_else(|| parse_failed("INSERT requires a VALUES clause"))?;
    let SetExpr::Values(values) = source.body.as_ref() else {
        return Err(RangerError::new(
            codes::QUERY_UNSUPPORTED_STATEMENT,
            "only INSERT … VALUES is supported",
        ));
    };
    let mut rows = Vec::with_capacity(values.rows.len());
    for row in &values.rows {
        let mut decoded = Vec::with_capacity(row.len());
        for expr in row {
            decoded.push(literal_value(expr)?);
        }
        rows.push(decoded);
    }
    Ok(Statement::Insert {
        table,
        columns,
        rows,
    })
}

fn literal_value(expr: &Expr) -> Result<serde_json::Value> {
    match expr {
        Expr::Value(Value::Number(raw, _)) => number_value(raw),
        Expr::Value(Value::SingleQuotedString(s)) | Expr::Value(Value::DoubleQuotedString(s)) => {
            Ok(serde_json::Value::String(s.clone()))
        }
        Expr::Value(Value::Boolean(b)) => Ok(serde_json::Value::Bool(*b)),
        Expr::Value(Value::Null) => Ok(serde_json::Value::Null),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match expr.as_ref() {
            Expr::Value(Value::Number(raw, _)) => number_value(&format!("-{raw}")),
            _ => Err(parse_failed(format!("unsupported INSERT value: {expr}"))),
        },
        other => Err(parse_failed(format!("unsupported INSERT value: {other}"))),
    }
}

fn number_value(raw: &str) -> Result<serde_json::Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(serde_json::Value::from(i));
    }
    raw.parse::<f64>()
        .map(serde_json::Value::from)
        .map_err(|_| parse_failed(format!("malformed numeric literal: {raw:?}")))
}

fn parse_create_table(sql: &str, create: ast::CreateTable) -> Result<Statement> {
    let table = qualified_name(&create.name).map_err(|e| {
        RangerError::new(codes::CREATE_TABLE_PARSE_SYNTAX_ERROR, e.message().to_string())
    })?;
    if create.columns.is_empty() {
        return Err(RangerError::new(
            codes::CREATE_TABLE_PARSE_SYNTAX_ERROR,
            format!("table {:?} must declare at least one column", table.table),
        ));
    }
    let mut columns = Vec::with_capacity(create.columns.len());
    for column in &create.columns {
        let (data_type, length) = map_sql_type(&column.data_type.to_string()).map_err(|e| {
            RangerError::new(
                codes::CREATE_TABLE_PARSE_TYPE_VALIDATION,
                format!("column {:?}: {}", column.name.value, e.message()),
            )
        })?;
        let mut nullable = true;
        let mut primary = false;
        for option in &column.options {
            match &option.option {
                ast::ColumnOption::NotNull => nullable = false,
                ast::ColumnOption::Null => nullable = true,
                ast::ColumnOption::Unique { is_primary, .. } if *is_primary => {
                    primary = true;
                    nullable = false;
                }
                _ => {}
            }
        }
        columns.push(ColumnSpec {
            name: column.name.value.clone(),
            data_type,
            nullable,
            length,
            primary,
        });
    }
    Ok(Statement::CreateTable {
        table,
        schema: TableSchema { columns },
        engine: extract_engine(sql).unwrap_or_else(|| "ICEBERG".to_string()),
        if_not_exists: create.if_not_exists,
    })
}

/// Extract `ENGINE = <name>` from the raw statement text.
///
/// Engine clause syntax differs per dialect; scanning the text keeps the
/// decoding independent of how the parser models it.
fn extract_engine(sql: &str) -> Option<String> {
    let tokens: Vec<&str> = sql
        .split(|c: char| c.is_whitespace() || c == ';')
        .filter(|t| !t.is_empty())
        .collect();
    if let Some(joined) = tokens.iter().find_map(|t| {
        let upper = t.to_ascii_uppercase();
        upper.strip_prefix("ENGINE=").map(str::to_string)
    }) {
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    let pos = tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case("engine"))?;
    match tokens.get(pos + 1) {
        Some(&"=") => tokens.get(pos + 2).map(|t| t.to_ascii_uppercase()),
        Some(t) if t.starts_with('=') => Some(t[1..].to_ascii_uppercase()),
        _ => None,
    }
}

/// Map a rendered SQL type name to a logical type and optional length.
pub fn map_sql_type(sql_type: &str) -> Result<(DataType, Option<u32>)> {
    let upper = sql_type.trim().to_ascii_uppercase();
    let (base, args) = match upper.find('(') {
        Some(open) => {
            let close = upper
                .rfind(')')
                .ok_or_else(|| unsupported_type(sql_type))?;
            (
                upper[..open].trim().to_string(),
                Some(upper[open + 1..close].to_string()),
            )
        }
        None => (upper.clone(), None),
    };

    let parsed = match base.as_str() {
        "BOOLEAN" | "BOOL" => (DataType::Boolean, None),
        "TINYINT" | "SMALLINT" | "INT" | "INTEGER" | "INT4" | "MEDIUMINT" => {
            (DataType::Int32, None)
        }
        "BIGINT" | "INT8" => (DataType::Int64, None),
        "FLOAT" | "REAL" | "FLOAT4" => (DataType::Float32, None),
        "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => (DataType::Float64, None),
        "DECIMAL" | "NUMERIC" => {
            let (precision, scale) = match &args {
                Some(args) => {
                    let mut parts = args.split(',').map(str::trim);
                    let precision = parts
                        .next()
                        .and_then(|p| p.parse::<u32>().ok())
                        .ok_or_else(|| unsupported_type(sql_type))?;
                    let scale = parts
                        .next()
                        .map(|s| s.parse::<u32>())
                        .transpose()
                        .map_err(|_| unsupported_type(sql_type))?
                        .unwrap_or(0);
                    (precision, scale)
                }
                None => (38, 0),
            };
            let decimal = DataType::Decimal { precision, scale };
            decimal.validate()?;
            (decimal, None)
        }
        "VARCHAR" | "CHAR" | "CHARACTER" | "CHARACTER VARYING" | "NVARCHAR" => {
            let length = args.as_deref().and_then(|a| a.trim().parse::<u32>().ok());
            (DataType::String, length)
        }
        "TEXT" | "STRING" | "CLOB" => (DataType::String, None),
        "BINARY" | "VARBINARY" | "BLOB" | "BYTEA" => (DataType::Binary, None),
        "DATE" => (DataType::Date, None),
        "TIME" => (DataType::Time, None),
        "DATETIME" | "TIMESTAMP" => (DataType::Timestamp, None),
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => (DataType::TimestampTz, None),
        "UUID" => (DataType::Uuid, None),
        _ => return Err(unsupported_type(sql_type)),
    };
    Ok(parsed)
}

fn unsupported_type(sql_type: &str) -> RangerError {
    RangerError::new(
        codes::TYPES_UNSUPPORTED_TYPE,
        format!("unsupported SQL type: {sql_type:?}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_statements() {
        assert_eq!(
            Statement::parse("SHOW DATABASES;").unwrap(),
            Statement::ShowDatabases
        );
        assert_eq!(
            Statement::parse("show tables").unwrap(),
            Statement::ShowTables { database: None }
        );
        assert_eq!(
            Statement::parse("SHOW TABLES FROM analytics;").unwrap(),
            Statement::ShowTables {
                database: Some("analytics".into())
            }
        );
        assert_eq!(
            Statement::parse("SHOW COLUMNS FROM analytics.events;").unwrap(),
            Statement::ShowColumns {
                table: QualifiedName {
                    database: Some("analytics".into()),
                    table: "events".into()
                }
            }
        );
        assert_eq!(
            Statement::parse("SHOW CREATE TABLE analytics.events;").unwrap(),
            Statement::ShowCreateTable {
                table: QualifiedName {
                    database: Some("analytics".into()),
                    table: "events".into()
                }
            }
        );
    }

    #[test]
    fn test_select_passes_through() {
        let stmt = Statement::parse("SELECT id, name FROM events WHERE id > 3;").unwrap();
        assert!(matches!(stmt, Statement::Select { .. }));
    }

    #[test]
    fn test_system_select_with_filter() {
        let stmt =
            Statement::parse("SELECT * FROM system.tables WHERE database = 'default';").unwrap();
        assert_eq!(
            stmt,
            Statement::SystemSelect {
                table: SystemTable::Tables,
                filter: Some(("database".into(), "default".into())),
            }
        );
    }

    #[test]
    fn test_system_select_rejects_complex_filter() {
        let err =
            Statement::parse("SELECT * FROM system.tables WHERE database LIKE 'd%';").unwrap_err();
        assert_eq!(err.code().as_str(), codes::QUERY_VALIDATION_FAILED);
    }

    #[test]
    fn test_unknown_system_table() {
        let err = Statement::parse("SELECT * FROM system.partitions;").unwrap_err();
        assert_eq!(err.code().as_str(), codes::QUERY_NOT_FOUND);
    }

    #[test]
    fn test_create_table_decoding() {
        let stmt = Statement::parse(
            "CREATE TABLE dbb.t (id INT PRIMARY KEY, name VARCHAR(64), score DOUBLE) ENGINE = MEMORY;",
        )
        .unwrap();
        let Statement::CreateTable {
            table,
            schema,
            engine,
            if_not_exists,
        } = stmt
        else {
            panic!("expected CreateTable");
        };
        assert_eq!(table.database.as_deref(), Some("dbb"));
        assert_eq!(table.table, "t");
        assert_eq!(engine, "MEMORY");
        assert!(!if_not_exists);
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.columns[0].data_type, DataType::Int32);
        assert!(schema.columns[0].primary);
        assert!(!schema.columns[0].nullable);
        assert_eq!(schema.columns[1].data_type, DataType::String);
        assert_eq!(schema.columns[1].length, Some(64));
        assert_eq!(schema.columns[2].data_type, DataType::Float64);
    }

    #[test]
    fn test_create_table_defaults_to_iceberg() {
        let stmt = Statement::parse("CREATE TABLE t (id BIGINT);").unwrap();
        let Statement::CreateTable { engine, .. } = stmt else {
            panic!("expected CreateTable");
        };
        assert_eq!(engine, "ICEBERG");
    }

    #[test]
    fn test_drop_table_if_exists() {
        let stmt = Statement::parse("DROP TABLE IF EXISTS nope;").unwrap();
        assert_eq!(
            stmt,
            Statement::DropTable {
                table: QualifiedName {
                    database: None,
                    table: "nope".into()
                },
                if_exists: true,
            }
        );
    }

    #[test]
    fn test_insert_values_decoding() {
        let stmt = Statement::parse(
            "INSERT INTO events (id, label, score) VALUES (1, 'a', -2.5), (2, NULL, 3.0);",
        )
        .unwrap();
        let Statement::Insert {
            table,
            columns,
            rows,
        } = stmt
        else {
            panic!("expected Insert");
        };
        assert_eq!(table.table, "events");
        assert_eq!(columns, vec!["id", "label", "score"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], serde_json::json!(1));
        assert_eq!(rows[0][2], serde_json::json!(-2.5));
        assert_eq!(rows[1][1], serde_json::Value::Null);
    }

    #[test]
    fn test_parse_failure_code() {
        let err = Statement::parse("SELEKT broken").unwrap_err();
        assert_eq!(err.code().as_str(), codes::QUERY_PARSE_FAILED);
    }

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(map_sql_type("INT").unwrap(), (DataType::Int32, None));
        assert_eq!(
            map_sql_type("VARCHAR(255)").unwrap(),
            (DataType::String, Some(255))
        );
        assert_eq!(
            map_sql_type("DECIMAL(10,2)").unwrap(),
            (
                DataType::Decimal {
                    precision: 10,
                    scale: 2
                },
                None
            )
        );
        assert!(map_sql_type("GEOGRAPHY").is_err());
    }
}
