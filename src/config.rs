use std::{net::SocketAddr, path::PathBuf};

use clap::Args;

/// Runtime settings for the HTTP server, read from flags or the environment.
#[derive(Args, Debug, Clone)]
pub struct ServerConfig {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "FOODGRAM_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    #[arg(long, env = "FOODGRAM_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    #[arg(long, env = "FOODGRAM_MEDIA_ROOT", default_value = "media")]
    pub media_root: PathBuf,

    #[arg(long, env = "FOODGRAM_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Lifetime of issued auth tokens.
    #[arg(long, env = "FOODGRAM_SESSION_HOURS", default_value_t = 24)]
    pub session_hours: i64,
}
