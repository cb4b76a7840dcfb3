//! HTTP client for the Ranger server.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use ranger_core::{codes, RangerError, Result};

use crate::config::ClientConfig;

/// Response of `POST /query`.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default, rename = "rowCount")]
    pub row_count: usize,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
}

pub struct RangerClient {
    http: reqwest::Client,
    base: String,
    database: String,
    user: String,
}

impl RangerClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.timeout))
            .build()
            .map_err(|e| {
                RangerError::new(codes::CLIENT_SDK, "failed to build http client").with_cause(e)
            })?;
        Ok(Self {
            http,
            base: config.base_url(),
            database: config.database.name.clone(),
            user: config.auth.username.clone(),
        })
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResponse> {
        let response = self
            .http
            .post(format!("{}/query", self.base))
            .query(&[
                ("q", sql),
                ("database", self.database.as_str()),
                ("user", self.user.as_str()),
            ])
            .send()
            .await
            .map_err(connection_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RangerError::new(
                codes::CLIENT_QUERY,
                format!("query failed ({status}): {body}"),
            ));
        }
        response.json().await.map_err(|e| {
            RangerError::new(codes::CLIENT_SDK, "malformed query response").with_cause(e)
        })
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Tables {
            tables: Vec<String>,
        }
        let tables: Tables = self
            .get_json(&format!("{}/api/v1/query/tables", self.base))
            .await?;
        Ok(tables.tables)
    }

    pub async fn describe_table(&self, name: &str) -> Result<Vec<(String, String)>> {
        #[derive(Deserialize)]
        struct Column {
            name: String,
            #[serde(rename = "type")]
            data_type: String,
        }
        #[derive(Deserialize)]
        struct Schema {
            columns: Vec<Column>,
        }
        let schema: Schema = self
            .get_json(&format!(
                "{}/api/v1/namespaces/default/tables/{name}/schema",
                self.base
            ))
            .await?;
        Ok(schema
            .columns
            .into_iter()
            .map(|c| (c.name, c.data_type))
            .collect())
    }

    pub async fn drop_table(&self, name: &str) -> Result<()> {
        let url = format!("{}/api/v1/namespaces/default/tables/{name}", self.base);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(connection_error)?;
        check_status(response, codes::CLIENT_TABLE).await?;
        Ok(())
    }

    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Namespaces {
            namespaces: Vec<Vec<String>>,
        }
        let response: Namespaces = self
            .get_json(&format!("{}/api/v1/catalog/namespaces", self.base))
            .await?;
        Ok(response
            .namespaces
            .into_iter()
            .filter_map(|mut ns| ns.pop())
            .collect())
    }

    pub async fn create_namespace(&self, name: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/api/v1/catalog/namespaces", self.base))
            .json(&json!({ "namespace": name }))
            .send()
            .await
            .map_err(connection_error)?;
        check_status(response, codes::CLIENT_NAMESPACE).await?;
        Ok(())
    }

    pub async fn drop_namespace(&self, name: &str) -> Result<()> {
        let url = format!("{}/api/v1/catalog/namespaces/{name}", self.base);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(connection_error)?;
        check_status(response, codes::CLIENT_NAMESPACE).await?;
        Ok(())
    }

    pub async fn import_parquet(
        &self,
        file: &str,
        table: &str,
        namespace: Option<&str>,
        overwrite: bool,
    ) -> Result<usize> {
        #[derive(Deserialize)]
        struct Imported {
            imported_rows: usize,
        }
        let response = self
            .http
            .post(format!("{}/api/v1/import/parquet", self.base))
            .json(&json!({
                "file_path": file,
                "table_name": table,
                "namespace": namespace,
                "overwrite": overwrite,
            }))
            .send()
            .await
            .map_err(connection_error)?;
        let response = check_status(response, codes::CLIENT_FILE).await?;
        let imported: Imported = response.json().await.map_err(|e| {
            RangerError::new(codes::CLIENT_SDK, "malformed import response").with_cause(e)
        })?;
        Ok(imported.imported_rows)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.http.get(url).send().await.map_err(connection_error)?;
        let response = check_status(response, codes::CLIENT_SDK).await?;
        response.json().await.map_err(|e| {
            RangerError::new(codes::CLIENT_SDK, "malformed server response").with_cause(e)
        })
    }
}

async fn check_status(response: reqwest::Response, code: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(RangerError::new(
        code,
        format!("server returned {status}: {body}"),
    ))
}

fn connection_error(e: reqwest::Error) -> RangerError {
    RangerError::new(codes::CLIENT_CONNECTION, "failed to reach the server").with_cause(e)
}
