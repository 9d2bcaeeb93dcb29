//! Structured-data collaborator: natural-language question → SQL → rows.
//!
//! [`SqlAgent`] asks the reasoning oracle for one SQLite query over the
//! invoice tables, checks that it only reads, runs it on a read-only pool
//! and returns the rows as JSON objects. Creating the schema and loading
//! invoices happen elsewhere.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use gst_harness_core::prompt::{sql_generation_prompt, sql_summary_prompt};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, ValueRef};
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::reasoning::{GenerateOptions, ReasoningClient};

/// Layout of the invoice database, as shown to the query generator.
pub const DEFAULT_SCHEMA: &str = "\
Table: invoices
- invoice_id
- invoice_date
- seller_name
- seller_state
- seller_gstin
- buyer_name
- buyer_state
- buyer_gstin
- sub_total
- cgst_total
- sgst_total
- igst_total
- total_tax
- grand_total

Table: invoice_items
- invoice_id
- description
- quantity
- unit_price
- total_price
- hsn_code
- item_category
- cgst_rate
- sgst_rate
- igst_rate
- tax_amount";

pub type JsonRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredAnswer {
    pub generated_query: String,
    pub rows: Vec<JsonRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[async_trait]
pub trait StructuredQueryEngine: Send + Sync {
    /// Answer `question` from the database. A summary is only requested
    /// when `summarize` is set.
    async fn answer(&self, question: &str, summarize: bool) -> HarnessResult<StructuredAnswer>;
}

/// Used when no database is configured.
pub struct DisabledStructured;

#[async_trait]
impl StructuredQueryEngine for DisabledStructured {
    async fn answer(&self, _question: &str, _summarize: bool) -> HarnessResult<StructuredAnswer> {
        Err(HarnessError::StructuredQuery(
            "no invoice database configured (structured.db_path)".to_string(),
        ))
    }
}

pub struct SqlAgent {
    pool: SqlitePool,
    reasoning: Arc<dyn ReasoningClient>,
    schema: String,
}

impl SqlAgent {
    pub fn new(pool: SqlitePool, reasoning: Arc<dyn ReasoningClient>, schema: Option<String>) -> Self {
        Self {
            pool,
            reasoning,
            schema: schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
        }
    }

    /// Ask the oracle for a query and validate it.
    pub async fn generate_query(&self, question: &str) -> HarnessResult<String> {
        let prompt = sql_generation_prompt(&self.schema, question);
        let raw = self
            .reasoning
            .generate(&prompt, GenerateOptions::deterministic_unbounded())
            .await
            .map_err(|e| HarnessError::StructuredQuery(format!("query generation: {}", e)))?;

        let sql = strip_code_fences(&raw);
        ensure_read_only(&sql)?;
        debug!(sql = %sql, "generated query");
        Ok(sql)
    }

    pub async fn execute(&self, sql: &str) -> HarnessResult<Vec<JsonRow>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HarnessError::StructuredQuery(format!("SQL error: {}", e)))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn summarize(&self, question: &str, sql: &str, rows: &[JsonRow]) -> Option<String> {
        let rows_text = serde_json::to_string(rows).unwrap_or_default();
        let prompt = sql_summary_prompt(question, sql, &rows_text);
        match self
            .reasoning
            .generate(&prompt, GenerateOptions::deterministic_unbounded())
            .await
        {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(error = %e, "could not summarize query result");
                None
            }
        }
    }
}

#[async_trait]
impl StructuredQueryEngine for SqlAgent {
    async fn answer(&self, question: &str, summarize: bool) -> HarnessResult<StructuredAnswer> {
        let generated_query = self.generate_query(question).await?;
        let rows = self.execute(&generated_query).await?;
        info!(rows = rows.len(), "structured query executed");

        let summary = if summarize {
            self.summarize(question, &generated_query, &rows).await
        } else {
            None
        };

        Ok(StructuredAnswer {
            generated_query,
            rows,
            summary,
        })
    }
}

/// Open the invoice database read-only.
pub async fn connect_read_only(db_path: &Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .read_only(true)
        .create_if_missing(false);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open invoice database: {}", db_path.display()))?;

    Ok(pool)
}

/// Remove a surrounding markdown code fence and trailing semicolons.
pub fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (`sql`, `sqlite`, ...) up to the first newline.
        text = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text);
    }
    text.trim().trim_end_matches(';').trim_end().to_string()
}

/// Accept a single `SELECT` or `WITH` statement.
pub fn ensure_read_only(sql: &str) -> HarnessResult<()> {
    if sql.is_empty() {
        return Err(HarnessError::StructuredQuery(
            "query generator returned nothing".to_string(),
        ));
    }
    if has_statement_separator(sql) {
        return Err(HarnessError::StructuredQuery(format!(
            "expected a single statement, got: {}",
            sql
        )));
    }
    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    if first != "SELECT" && first != "WITH" {
        return Err(HarnessError::StructuredQuery(format!(
            "only SELECT queries are allowed, got: {}",
            sql
        )));
    }
    Ok(())
}

/// True if `sql` has a `;` outside quoted text, or an unterminated quote.
///
/// A doubled quote (`'it''s'`) closes and reopens, which leaves the state
/// unchanged.
fn has_statement_separator(sql: &str) -> bool {
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (None, ';') => return true,
            (None, '\'' | '"' | '`') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            _ => {}
        }
    }
    quote.is_some()
}

fn row_to_json(row: &SqliteRow) -> JsonRow {
    let mut out = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), column_value(row, i));
    }
    out
}

fn column_value(row: &SqliteRow, i: usize) -> Value {
    match row.try_get_raw(i) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        Ok(_) => {}
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        return Value::String(String::from_utf8_lossy(&v).into_owned());
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sql_fence() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT * FROM invoices;\n```"),
            "SELECT * FROM invoices"
        );
        assert_eq!(strip_code_fences("  SELECT 1 ;; "), "SELECT 1");
    }

    #[test]
    fn test_read_only_accepts_select_and_with() {
        assert!(ensure_read_only("SELECT 1").is_ok());
        assert!(ensure_read_only("with t as (select 1) select * from t").is_ok());
    }

    #[test]
    fn test_read_only_rejects_writes_and_batches() {
        assert!(ensure_read_only("DELETE FROM invoices").is_err());
        assert!(ensure_read_only("SELECT 1; DROP TABLE invoices").is_err());
        assert!(ensure_read_only("").is_err());
        assert!(ensure_read_only("SELECT 'a'; DELETE FROM invoices").is_err());
        assert!(ensure_read_only("SELECT 'unterminated; DROP TABLE x").is_err());
    }

    #[test]
    fn test_read_only_allows_semicolon_in_literals() {
        assert!(ensure_read_only(
            "SELECT * FROM invoice_items WHERE description LIKE '%;%'"
        )
        .is_ok());
        assert!(ensure_read_only("SELECT 'it''s; fine' AS note").is_ok());
        assert!(ensure_read_only("SELECT \"odd;name\" FROM invoices").is_ok());
    }

    #[tokio::test]
    async fn test_disabled_is_structured_error() {
        let err = DisabledStructured.answer("q", true).await.unwrap_err();
        assert!(matches!(err, HarnessError::StructuredQuery(_)));
    }
}
