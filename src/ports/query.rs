//! Backend query port (SQL/REST), interfaces only.
//!
//! Query prerequisites and validations run against an external backend
//! client supplied by the embedding application; this crate never
//! carries the client plumbing itself.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs one query statement against a backend system and returns
    /// result rows rendered as text lines.
    async fn query(&self, system: &str, statement: &str) -> Result<Vec<String>>;
}
