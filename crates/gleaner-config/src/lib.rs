use std::env;
use std::time::Duration;

use gleaner_errors::{GleanError, GleanResult};
use serde::{Deserialize, Serialize};

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// 1GB 内存预算下连接池必须受限
    pub max_connections: u32,
}

/// Redis 配置，队列与缓存共用同一实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Basic 认证凭据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

/// 抓取器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// 单进程内并发 handler 数
    pub concurrency: usize,
    /// 单页抓取超时（毫秒）
    pub timeout_ms: u64,
    pub max_urls_per_request: usize,
    pub browser_headless: bool,
    /// 开启时浏览器会屏蔽样式表与字体请求（图片本身不屏蔽）
    pub browser_disable_images: bool,
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 队列强制的单条目总预算: 抓取超时 + 5s
    pub fn item_deadline(&self) -> Duration {
        Duration::from_millis(self.timeout_ms) + Duration::from_secs(5)
    }
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
}

/// 启动时从环境解析一次的应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub scraper: ScraperConfig,
    pub api: ApiConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> GleanResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| GleanError::config_error(format!("invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// 读取 DATABASE_URL、REDIS_HOST 等约定变量，缺省值与部署模板一致
    pub fn from_env() -> GleanResult<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| GleanError::config_error("DATABASE_URL is required"))?;

        let config = Self {
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5)?,
            },
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: env_or("REDIS_PORT", 6379)?,
            },
            auth: AuthConfig {
                username: env::var("BASIC_AUTH_USERNAME").unwrap_or_else(|_| "admin".to_string()),
                password: env::var("BASIC_AUTH_PASSWORD")
                    .unwrap_or_else(|_| "admin123".to_string()),
            },
            scraper: ScraperConfig {
                concurrency: env_or("SCRAPER_CONCURRENCY", 3)?,
                timeout_ms: env_or("SCRAPER_TIMEOUT", 30_000)?,
                max_urls_per_request: env_or("MAX_URLS_PER_REQUEST", 100)?,
                browser_headless: env_or("PUPPETEER_HEADLESS", true)?,
                browser_disable_images: env_or("PUPPETEER_DISABLE_IMAGES", true)?,
            },
            api: ApiConfig {
                port: env_or("PORT", 3001)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GleanResult<()> {
        if self.database.max_connections == 0 {
            return Err(GleanError::config_error("database.max_connections must be > 0"));
        }
        if self.scraper.concurrency == 0 {
            return Err(GleanError::config_error("scraper.concurrency must be > 0"));
        }
        if self.scraper.timeout_ms == 0 {
            return Err(GleanError::config_error("scraper.timeout must be > 0"));
        }
        if self.scraper.max_urls_per_request == 0 || self.scraper.max_urls_per_request > 1000 {
            return Err(GleanError::config_error(
                "scraper.max_urls_per_request must be in 1..=1000",
            ));
        }
        if self.auth.username.is_empty() || self.auth.password.is_empty() {
            return Err(GleanError::config_error("auth credentials must not be empty"));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/gleaner".to_string(),
                max_connections: 5,
            },
            redis: RedisConfig {
                host: "localhost".to_string(),
                port: 6379,
            },
            auth: AuthConfig {
                username: "admin".to_string(),
                password: "admin123".to_string(),
            },
            scraper: ScraperConfig {
                concurrency: 3,
                timeout_ms: 30_000,
                max_urls_per_request: 100,
                browser_headless: true,
                browser_disable_images: true,
            },
            api: ApiConfig { port: 3001 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scraper.concurrency, 3);
        assert_eq!(config.api.port, 3001);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_redis_url_formatting() {
        let redis = RedisConfig {
            host: "cache.internal".to_string(),
            port: 6380,
        };
        assert_eq!(redis.url(), "redis://cache.internal:6380/");
    }

    #[test]
    fn test_item_deadline_adds_grace() {
        let scraper = ScraperConfig {
            concurrency: 3,
            timeout_ms: 30_000,
            max_urls_per_request: 100,
            browser_headless: true,
            browser_disable_images: true,
        };
        assert_eq!(scraper.item_deadline(), Duration::from_secs(35));
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.scraper.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_oversized_url_limit() {
        let mut config = AppConfig::default();
        config.scraper.max_urls_per_request = 5000;
        assert!(config.validate().is_err());
    }
}
