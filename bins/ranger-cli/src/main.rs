//! # Ranger CLI - Command-Line Client
//!
//! Thin client over the server's HTTP protocol. Configuration is
//! discovered from `./ranger-client.yml`, `$HOME/.ranger/ranger-client.yml`,
//! then `/etc/ranger/ranger-client.yml`; a missing file yields defaults.
//!
//! ## Usage
//!
//! ```bash
//! ranger-cli query "SELECT * FROM events"
//! ranger-cli explain "SELECT count(*) FROM events"
//! ranger-cli shell
//! ranger-cli import data.parquet events --namespace analytics --overwrite
//! ranger-cli table list
//! ranger-cli catalog namespaces
//! ```

mod client;
mod config;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client::{QueryResponse, RangerClient};
use config::ClientConfig;
use ranger_core::Result;

#[derive(Parser, Debug)]
#[command(name = "ranger-cli")]
#[command(about = "Command-line client for the Ranger lakehouse service")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a SQL statement
    Query { sql: String },
    /// Show the execution plan for a SQL statement
    Explain { sql: String },
    /// Interactive SQL shell
    Shell,
    /// Import a parquet file into a table
    Import {
        file: String,
        table: String,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        overwrite: bool,
    },
    /// Table operations
    Table {
        #[command(subcommand)]
        command: TableCommand,
    },
    /// Catalog operations
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TableCommand {
    /// List tables in the default namespace
    List,
    /// Show a table's columns
    Describe { name: String },
    /// Drop a table
    Drop { name: String },
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// List namespaces
    Namespaces,
    /// Create a namespace
    Create { namespace: String },
    /// Drop a namespace
    Drop { namespace: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let config = ClientConfig::discover()?;
    let client = RangerClient::new(&config)?;

    match args.command {
        Command::Query { sql } => {
            let response = client.execute(&ensure_semicolon(&sql)).await?;
            print_response(&response);
        }
        Command::Explain { sql } => {
            let sql = format!("EXPLAIN {}", sql.trim_start_matches("EXPLAIN "));
            let response = client.execute(&ensure_semicolon(&sql)).await?;
            print_response(&response);
        }
        Command::Shell => run_shell(&client).await?,
        Command::Import {
            file,
            table,
            namespace,
            overwrite,
        } => {
            let rows = client
                .import_parquet(&file, &table, namespace.as_deref(), overwrite)
                .await?;
            println!("Imported {rows} rows into {table}");
        }
        Command::Table { command } => match command {
            TableCommand::List => {
                for table in client.list_tables().await? {
                    println!("{table}");
                }
            }
            TableCommand::Describe { name } => {
                let columns = client.describe_table(&name).await?;
                render_table(
                    &["column".into(), "type".into()],
                    &columns
                        .into_iter()
                        .map(|(name, data_type)| {
                            vec![serde_json::json!(name), serde_json::json!(data_type)]
                        })
                        .collect::<Vec<_>>(),
                );
            }
            TableCommand::Drop { name } => {
                client.drop_table(&name).await?;
                println!("Table {name} dropped");
            }
        },
        Command::Catalog { command } => match command {
            CatalogCommand::Namespaces => {
                for namespace in client.list_namespaces().await? {
                    println!("{namespace}");
                }
            }
            CatalogCommand::Create { namespace } => {
                client.create_namespace(&namespace).await?;
                println!("Namespace {namespace} created");
            }
            CatalogCommand::Drop { namespace } => {
                client.drop_namespace(&namespace).await?;
                println!("Namespace {namespace} dropped");
            }
        },
    }
    Ok(())
}

/// Append the trailing semicolon the server-side parser expects.
fn ensure_semicolon(sql: &str) -> String {
    let trimmed = sql.trim_end();
    if trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("{trimmed};")
    }
}

async fn run_shell(client: &RangerClient) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"ranger> ").await.ok();
        stdout.flush().await.ok();
        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        match client.execute(&ensure_semicolon(&line)).await {
            Ok(response) => print_response(&response),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}

fn print_response(response: &QueryResponse) {
    if !response.columns.is_empty() {
        render_table(&response.columns, &response.data);
        println!("{} rows", response.row_count);
    }
    if !response.message.is_empty() {
        println!("{}", response.message);
    }
}

/// Fixed-width table rendering for terminal output.
fn render_table(columns: &[String], rows: &[Vec<serde_json::Value>]) {
    let cell = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    };

    let mut widths: Vec<usize> = columns.iter().map(String::len).collect();
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, v)| {
                    let text = cell(v);
                    if i < widths.len() && text.len() > widths[i] {
                        widths[i] = text.len();
                    }
                    text
                })
                .collect()
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
        .collect();
    println!("{}", header.join(" | "));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in rendered {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let width = widths.get(i).copied().unwrap_or(v.len());
                format!("{v:<width$}")
            })
            .collect();
        println!("{}", line.join(" | "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_semicolon() {
        assert_eq!(ensure_semicolon("SELECT 1"), "SELECT 1;");
        assert_eq!(ensure_semicolon("SELECT 1;"), "SELECT 1;");
        assert_eq!(ensure_semicolon("SELECT 1;  "), "SELECT 1;");
    }
}
