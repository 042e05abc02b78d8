//! Redis 缓存管理器与管线的缓存键方案
//!
//! 缓存是严格可选的: Redis 不可达时所有读取退化为 `None`，
//! 所有写入尽力而为。管线的任何环节都不允许因缓存故障而失败。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// 管线控制器与 API 层共用的缓存键构造
pub mod cache_keys {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    /// 单 URL 提取结果缓存，TTL 3600s
    pub fn url_key(url: &str) -> String {
        let mut encoded = URL_SAFE_NO_PAD.encode(url.as_bytes());
        encoded.truncate(100);
        format!("url:{encoded}")
    }

    /// 媒体分页结果页，TTL 60s
    pub fn media_list_key(page: i64, limit: i64, media_type: Option<&str>, search: &str) -> String {
        format!(
            "media:list:{}:{}:{}:{}",
            page,
            limit,
            media_type.unwrap_or("all"),
            search
        )
    }

    /// 媒体聚合统计，TTL 30s
    pub const MEDIA_STATS: &str = "stats:media";
    /// 队列状态快照，TTL 5s
    pub const QUEUE_STATS: &str = "queue:stats";
    /// 工作者写入新媒体后整段失效的前缀
    pub const MEDIA_PREFIX: &str = "media:";

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_url_key_is_truncated() {
            let long_url = format!("https://example.com/{}", "a".repeat(400));
            let key = url_key(&long_url);
            assert!(key.starts_with("url:"));
            assert_eq!(key.len(), 4 + 100);
        }

        #[test]
        fn test_url_key_is_stable() {
            assert_eq!(url_key("https://a.com"), url_key("https://a.com"));
            assert_ne!(url_key("https://a.com"), url_key("https://b.com"));
        }

        #[test]
        fn test_media_list_key_shape() {
            assert_eq!(
                media_list_key(2, 20, Some("image"), "cat"),
                "media:list:2:20:image:cat"
            );
            assert_eq!(media_list_key(1, 50, None, ""), "media:list:1:50:all:");
        }
    }
}

/// 基于多路复用连接的 Redis 缓存管理器
pub struct RedisCacheManager {
    client: Option<Arc<redis::Client>>,
    conn: RwLock<Option<ConnectionManager>>,
    key_prefix: String,
}

impl RedisCacheManager {
    /// 创建管理器。初始连接失败只记日志并进入降级模式，
    /// 后续操作按需重连。
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Self {
        let client = match redis::Client::open(redis_url) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("invalid redis url, cache permanently degraded: {}", e);
                None
            }
        };

        let manager = match &client {
            Some(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    info!("cache connected: {}", redis_url);
                    Some(conn)
                }
                Err(e) => {
                    warn!("cache unavailable at startup, running degraded: {}", e);
                    None
                }
            },
            None => None,
        };

        Self {
            client,
            conn: RwLock::new(manager),
            key_prefix: key_prefix.to_string(),
        }
    }

    fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        if let Some(conn) = self.conn.read().await.clone() {
            return Some(conn);
        }
        let client = self.client.as_ref()?;
        // 降级启动后的惰性重连
        let mut slot = self.conn.write().await;
        if let Some(conn) = slot.clone() {
            return Some(conn);
        }
        match client.get_connection_manager().await {
            Ok(conn) => {
                info!("cache connection established");
                *slot = Some(conn);
                slot.clone()
            }
            Err(e) => {
                debug!("cache still unavailable: {}", e);
                None
            }
        }
    }

    /// GET 一个 JSON 值。永不抛错: 未命中、解码失败、连接中断都返回 `None`
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.build_key(key);
        let mut conn = self.connection().await?;

        let raw: Vec<u8> = redis::cmd("GET")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| debug!("cache GET failed for {}: {}", full_key, e))
            .ok()
            .flatten()?;

        match serde_json::from_slice(&raw) {
            Ok(value) => {
                debug!("cache HIT: {}", full_key);
                Some(value)
            }
            Err(e) => {
                warn!("cache entry for {} is corrupt, dropping: {}", full_key, e);
                let _ = self.delete(key).await;
                None
            }
        }
    }

    /// SETEX 写入 JSON 值，尽力而为
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let full_key = self.build_key(key);
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let Ok(raw) = serde_json::to_vec(value) else {
            return;
        };

        let result: Result<(), _> = redis::cmd("SETEX")
            .arg(&full_key)
            .arg(ttl.as_secs().max(1))
            .arg(raw)
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            debug!("cache SET failed for {}: {}", full_key, e);
        }
    }

    /// DEL 单个键，尽力而为; 返回是否确实删除了键
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> bool {
        let full_key = self.build_key(key);
        let Some(mut conn) = self.connection().await else {
            return false;
        };

        redis::cmd("DEL")
            .arg(&full_key)
            .query_async::<i64>(&mut conn)
            .await
            .map(|n| n > 0)
            .unwrap_or(false)
    }

    /// SCAN 后分批 DEL 前缀下的全部键，尽力而为; 返回删除数量
    #[instrument(skip(self))]
    pub async fn clear_prefix(&self, prefix: &str) -> usize {
        let full_prefix = self.build_key(prefix);
        let Some(mut conn) = self.connection().await else {
            return 0;
        };

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let scan: Result<(u64, Vec<String>), _> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{full_prefix}*"))
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await;

            match scan {
                Ok((next, batch)) => {
                    keys.extend(batch);
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Err(e) => {
                    debug!("cache SCAN failed for {}: {}", full_prefix, e);
                    return 0;
                }
            }
        }

        if keys.is_empty() {
            return 0;
        }

        let mut deleted = 0;
        for chunk in keys.chunks(100) {
            let result: Result<i64, _> =
                redis::cmd("DEL").arg(chunk).query_async(&mut conn).await;
            match result {
                Ok(n) => deleted += n as usize,
                Err(e) => {
                    debug!("cache batch DEL failed for {}: {}", full_prefix, e);
                    return deleted;
                }
            }
        }

        debug!("cache cleared {} keys under {}", deleted, full_prefix);
        deleted
    }

    /// 读取或计算: 未命中时执行 `load`，结果发后即忘地回填再返回。
    /// 加载器的错误类型原样透传。
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &str, ttl: Duration, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }
        let value = load().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    pub async fn health_check(&self) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|pong| pong == "PONG")
            .unwrap_or(false)
    }
}
