use std::env;

/// Runtime configuration, read once at boot.
#[derive(Clone)]
pub struct Config {
    pub addr: String,
    pub db_path: String,
    pub token_secret: String,
    pub token_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Self {
        let token_secret = match env::var("TASKTREE_TOKEN_SECRET") {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!("TASKTREE_TOKEN_SECRET not set, using development default");
                "dev-secret-change-in-production".to_string()
            }
        };

        let token_ttl_hours = env::var("TASKTREE_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        Self {
            addr: env::var("TASKTREE_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            db_path: env::var("TASKTREE_DB").unwrap_or_else(|_| "tasks.redb".to_string()),
            token_secret,
            token_ttl_hours,
        }
    }
}
