//! Redis accelerator over a multiplexed, auto-reconnecting connection.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::application::accelerator::{Accelerator, AcceleratorError, ScanPage};

#[derive(Clone)]
pub struct RedisAccelerator {
    manager: ConnectionManager,
}

impl RedisAccelerator {
    pub async fn connect(url: &str) -> Result<Self, AcceleratorError> {
        let client = redis::Client::open(url).map_err(AcceleratorError::unavailable)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(AcceleratorError::unavailable)?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl Accelerator for RedisAccelerator {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AcceleratorError> {
        let mut conn = self.conn();
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(AcceleratorError::unavailable)?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), AcceleratorError> {
        let mut conn = self.conn();
        let result: redis::RedisResult<()> = match ttl {
            Some(ttl) => {
                let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                conn.pset_ex(key, value, millis).await
            }
            None => conn.set(key, value).await,
        };
        result.map_err(AcceleratorError::unavailable)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), AcceleratorError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _removed: i64 = conn.del(keys).await.map_err(AcceleratorError::unavailable)?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, AcceleratorError> {
        let mut conn = self.conn();
        conn.incr(key, delta)
            .await
            .map_err(AcceleratorError::unavailable)
    }

    async fn scan_prefix(
        &self,
        cursor: u64,
        prefix: &str,
        count: usize,
    ) -> Result<ScanPage, AcceleratorError> {
        let mut conn = self.conn();
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(format!("{}*", escape_glob(prefix)))
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(AcceleratorError::unavailable)?;
        Ok(ScanPage { keys, next_cursor })
    }

    async fn ping(&self) -> Result<(), AcceleratorError> {
        let mut conn = self.conn();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(AcceleratorError::unavailable)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_metacharacters_are_escaped() {
        assert_eq!(escape_glob("view:"), "view:");
        assert_eq!(escape_glob("ns*[x]:view:"), "ns\\*\\[x\\]:view:");
    }
}
