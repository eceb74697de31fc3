//! Configuration management for bq-report.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with support for named queries and remote service settings.

use crate::error::{ReportError, Result};
use crate::query::{Direction, FilterValue, QuerySpec, TableRef};
use crate::results::{RowSchema, ScalarType};
use crate::warehouse::DEFAULT_ENDPOINT;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure for bq-report.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Remote service settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Named query definitions.
    #[serde(default)]
    pub queries: HashMap<String, QueryConfig>,
}

/// Remote service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Project that jobs are billed to and run in.
    pub project: Option<String>,

    /// Processing location (e.g. "US", "EU").
    pub location: Option<String>,

    /// OAuth bearer token (not recommended to store in config).
    pub access_token: Option<String>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long to wait for a job to finish. Unset waits indefinitely.
    pub wait_timeout_secs: Option<u64>,

    /// Server-side long-poll duration for each completion check.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Rows requested per result page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_poll_timeout_ms() -> u64 {
    10_000
}

fn default_page_size() -> u32 {
    1000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            project: None,
            location: None,
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            wait_timeout_secs: None,
            poll_timeout_ms: default_poll_timeout_ms(),
            page_size: default_page_size(),
        }
    }
}

impl ServiceConfig {
    /// Applies environment variables as defaults for unset fields.
    pub fn apply_env_defaults(&mut self) {
        if self.project.is_none() {
            self.project = std::env::var("GOOGLE_CLOUD_PROJECT").ok();
        }
        if self.endpoint == DEFAULT_ENDPOINT {
            if let Ok(endpoint) = std::env::var("BIGQUERY_ENDPOINT") {
                self.endpoint = endpoint;
            }
        }
        if self.access_token.is_none() {
            self.access_token = std::env::var("BIGQUERY_ACCESS_TOKEN").ok();
        }
    }

    /// Returns the configured project or a configuration error.
    pub fn require_project(&self) -> Result<&str> {
        self.project.as_deref().ok_or_else(|| {
            ReportError::config(
                "No project configured. Use --project, [service].project or GOOGLE_CLOUD_PROJECT.",
            )
        })
    }

    /// Parses and validates the endpoint URL.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            ReportError::config(format!("Invalid endpoint '{}': {e}", self.endpoint))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ReportError::config(format!(
                "Invalid scheme '{}'. Expected 'http' or 'https'",
                url.scheme()
            )));
        }

        Ok(url)
    }

    /// Returns the wait timeout, if any.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    /// Returns a display-safe string (no token) for log output.
    pub fn display_string(&self) -> String {
        let project = self.project.as_deref().unwrap_or("unknown");
        match &self.location {
            Some(location) => format!("{project} ({location}) @ {}", self.endpoint),
            None => format!("{project} @ {}", self.endpoint),
        }
    }
}

/// A named query: either declarative fields or raw SQL.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Project owning the table; defaults to the service project.
    pub target_project: Option<String>,

    pub dataset: Option<String>,

    /// Table name, or a full `dataset.table` / `project.dataset.table` path.
    pub table: Option<String>,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub filters: BTreeMap<String, FilterValue>,

    #[serde(default)]
    pub order_by: Vec<String>,

    #[serde(default)]
    pub direction: Direction,

    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Expected column types for decoding.
    #[serde(default)]
    pub schema: BTreeMap<String, ScalarType>,

    /// Raw SQL; when set the declarative fields are ignored.
    pub sql: Option<String>,
}

fn default_limit() -> u64 {
    1000
}

/// What a named query resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedQuery {
    Spec(QuerySpec),
    Sql(String),
}

impl QueryConfig {
    /// Resolves the table reference for this query.
    pub fn table_ref(&self, default_project: Option<&str>) -> Result<TableRef> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| ReportError::config("Query is missing a 'table'"))?;

        let table_ref = TableRef::from_parts(self.dataset.as_deref(), table)?;

        let project = self.target_project.as_deref().or(default_project);
        Ok(table_ref.with_default_project(project))
    }

    /// Builds the declarative spec or returns the raw SQL.
    ///
    /// Specs are validated here so bad identifiers fail before submission.
    pub fn resolve(&self, default_project: Option<&str>) -> Result<ResolvedQuery> {
        if let Some(sql) = &self.sql {
            return Ok(ResolvedQuery::Sql(sql.clone()));
        }

        let table = self.table_ref(default_project)?;
        let spec = QuerySpec {
            target_table: table.qualified_name(),
            columns: self.columns.clone(),
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            direction: self.direction,
            limit: self.limit,
        };
        spec.validate()?;

        Ok(ResolvedQuery::Spec(spec))
    }

    /// Returns the expected row schema, or `None` to infer it.
    pub fn row_schema(&self) -> Option<RowSchema> {
        if self.schema.is_empty() {
            return None;
        }
        Some(
            self.schema
                .iter()
                .map(|(name, ty)| (name.clone(), *ty))
                .collect(),
        )
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bq-report")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ReportError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ReportError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named query, or the default query if name is None.
    pub fn get_query(&self, name: Option<&str>) -> Option<&QueryConfig> {
        let key = name.unwrap_or("default");
        self.queries.get(key)
    }
}
