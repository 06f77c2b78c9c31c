use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Prefix of the change feed's pub/sub channels
    pub feed_channel_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let feed_channel_prefix = env::var("FEED_CHANNEL_PREFIX")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| change_feed::RedisChangeFeed::DEFAULT_PREFIX.to_string());

        if feed_channel_prefix.contains(':') {
            return Err(crate::error::AppError::Config(
                "FEED_CHANNEL_PREFIX must not contain ':'".into(),
            ));
        }

        Ok(Self {
            database_url,
            redis_url,
            port,
            db_max_connections,
            feed_channel_prefix,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://127.0.0.1:6379/0".into(),
            port: 3000,
            db_max_connections: 10,
            feed_channel_prefix: "feed".into(),
        }
    }
}
