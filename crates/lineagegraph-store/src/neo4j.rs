//! Neo4j graph store over the transactional HTTP endpoint
//!
//! Each unit of work is one `POST /db/{database}/tx/commit` carrying all of
//! its statements, so a unit either commits whole or not at all.
//!
//! Reference: https://neo4j.com/docs/http-api/current/

use crate::cypher::{schema_statements, unit_statements, Statement};
use crate::store::{GraphStore, StoreError};
use lineagegraph_core::{GraphBatch, GraphConfig};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    statements: &'a [Statement],
}

#[derive(Debug, Default, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Debug, Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Neo4j store
pub struct Neo4jStore {
    client: Client,
    endpoint: String,
    database: String,
    user: String,
    password: String,
}

impl Neo4jStore {
    pub fn from_config(config: &GraphConfig) -> Result<Self, StoreError> {
        if config.uri.trim().is_empty() {
            return Err(StoreError::ConfigError("graph.uri is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(format!("lineagegraph/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.uri.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    /// URL of the auto-commit transaction endpoint
    pub fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }

    async fn commit(&self, statements: &[Statement]) -> Result<(), StoreError> {
        if statements.is_empty() {
            return Ok(());
        }

        let resp = self
            .client
            .post(self.commit_url())
            .basic_auth(&self.user, Some(&self.password))
            .json(&CommitRequest { statements })
            .send()
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {}", self.endpoint, e)))?;

        let status = resp.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(StoreError::AuthenticationError(format!(
                    "{} returned {}",
                    self.endpoint, status
                )));
            }
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(StoreError::InvalidResponse(format!("status {}: {}", status, body)));
            }
            _ => {}
        }

        let body: CommitResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        check_errors(body)
    }
}

/// The endpoint answers 200 even for failed statements; errors are in the body
fn check_errors(body: CommitResponse) -> Result<(), StoreError> {
    match body.errors.into_iter().next() {
        Some(error) => Err(StoreError::Rejected {
            code: error.code,
            message: error.message,
        }),
        None => Ok(()),
    }
}

#[async_trait::async_trait]
impl GraphStore for Neo4jStore {
    fn name(&self) -> &'static str {
        "Neo4j"
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.commit(&schema_statements()).await
    }

    async fn apply(&self, unit: &GraphBatch) -> Result<(), StoreError> {
        let statements = unit_statements(unit);
        debug!(statements = statements.len(), nodes = unit.node_count(), "Committing unit");
        self.commit(&statements).await
    }

    async fn test_connection(&self) -> Result<(), StoreError> {
        self.commit(&[Statement {
            statement: "RETURN 1".to_string(),
            parameters: serde_json::json!({}),
        }])
        .await
    }
}
