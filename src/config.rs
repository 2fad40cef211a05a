//! Startup configuration, read once from the environment.

use std::env;
use std::net::SocketAddr;

pub struct Config {
    pub port: u16,
    pub admin_password: String,
    pub cors_origin: String,
}

impl Config {
    /// Load from `.env` (if present) plus the process environment.
    /// `ADMIN_PASSWORD` is required; everything else has a classroom-friendly
    /// default.
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .map(|v| v.parse::<u16>().map_err(|_| "PORT must be a number".to_string()))
            .transpose()?
            .unwrap_or(8080);

        let admin_password = env::var("ADMIN_PASSWORD").map_err(|_| "ADMIN_PASSWORD must be set".to_string())?;
        if admin_password.is_empty() {
            return Err("ADMIN_PASSWORD must not be empty".to_string());
        }

        let cors_origin = env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".to_string());

        Ok(Self { port, admin_password, cors_origin })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
