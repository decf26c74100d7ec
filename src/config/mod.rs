use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub connection_timeout: u64,
    pub seed_sample_data: bool,
}

#[derive(Clone)]
pub struct SecurityConfig {
    /// Shared bearer secret. `None` accepts any non-empty token.
    pub api_token: Option<String>,
    /// Allowed CORS origins; empty means any origin.
    pub cors_origins: Vec<String>,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Ceiling on documents returned by one pull.
    pub max_batch: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(&lookup)
    }

    fn with_overrides<F>(mut self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Server overrides
        if let Some(v) = var("HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = var("TLS_CERT_PATH") {
            self.server.tls_cert_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("TLS_KEY_PATH") {
            self.server.tls_key_path = Some(PathBuf::from(v));
        }

        // Database overrides
        self.database.url = var("DATABASE_URL");
        self.database.backend = match var("STORE_BACKEND") {
            Some(v) => v.parse().unwrap_or(self.default_backend()),
            None => self.default_backend(),
        };
        if let Some(v) = var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Some(v) = var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Some(v) = var("SEED_SAMPLE_DATA") {
            self.database.seed_sample_data = v.parse().unwrap_or(self.database.seed_sample_data);
        }

        // Security overrides
        self.security.api_token = var("API_TOKEN");
        if let Some(v) = lookup("CORS_ORIGINS") {
            self.security.cors_origins = parse_origins(&v);
        }

        // Sync overrides
        if let Some(v) = var("SYNC_MAX_BATCH") {
            self.sync.max_batch = v.parse().ok().filter(|n| *n > 0).unwrap_or(self.sync.max_batch);
        }

        self
    }

    fn default_backend(&self) -> StoreBackend {
        if self.database.url.is_some() {
            StoreBackend::Postgres
        } else {
            StoreBackend::Memory
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig::default(),
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: None,
                max_connections: 5,
                connection_timeout: 30,
                seed_sample_data: true,
            },
            security: SecurityConfig { api_token: None, cors_origins: Vec::new() },
            sync: SyncConfig { max_batch: 500 },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig::default(),
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: None,
                max_connections: 10,
                connection_timeout: 10,
                seed_sample_data: true,
            },
            security: SecurityConfig { api_token: None, cors_origins: Vec::new() },
            sync: SyncConfig { max_batch: 500 },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig::default(),
            database: DatabaseConfig {
                backend: StoreBackend::Memory,
                url: None,
                max_connections: 20,
                connection_timeout: 5,
                seed_sample_data: false,
            },
            security: SecurityConfig { api_token: None, cors_origins: Vec::new() },
            sync: SyncConfig { max_batch: 200 },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Comma separated origins; `*` or an empty list allows any origin.
fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if origins.iter().any(|o| o == "*") {
        Vec::new()
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_development_config() {
        let config = config_from(&[]);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert!(config.database.seed_sample_data);
        assert!(config.security.api_token.is_none());
        assert!(config.security.cors_origins.is_empty());
        assert!(config.server.tls_cert_path.is_none());
    }

    #[test]
    fn test_default_production_config() {
        let config = config_from(&[("APP_ENV", "production")]);
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.database.seed_sample_data);
        assert_eq!(config.sync.max_batch, 200);
    }

    #[test]
    fn database_url_selects_postgres() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/timeclock")]);
        assert_eq!(config.database.backend, StoreBackend::Postgres);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/timeclock"));

        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/timeclock"),
            ("STORE_BACKEND", "memory"),
        ]);
        assert_eq!(config.database.backend, StoreBackend::Memory);
    }

    #[test]
    fn overrides_apply() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8443"),
            ("API_TOKEN", "kiosk-secret"),
            ("TLS_CERT_PATH", "/etc/ssl/kiosk.crt"),
            ("TLS_KEY_PATH", "/etc/ssl/kiosk.key"),
            ("CORS_ORIGINS", "https://kiosk.example.com/, https://admin.example.com"),
            ("SEED_SAMPLE_DATA", "false"),
            ("SYNC_MAX_BATCH", "50"),
        ]);
        assert_eq!(config.server.bind_address(), "127.0.0.1:8443");
        assert_eq!(config.security.api_token.as_deref(), Some("kiosk-secret"));
        assert_eq!(config.server.tls_cert_path, Some(PathBuf::from("/etc/ssl/kiosk.crt")));
        assert_eq!(config.server.tls_key_path, Some(PathBuf::from("/etc/ssl/kiosk.key")));
        assert_eq!(
            config.security.cors_origins,
            vec!["https://kiosk.example.com", "https://admin.example.com"]
        );
        assert!(!config.database.seed_sample_data);
        assert_eq!(config.sync.max_batch, 50);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = config_from(&[("PORT", "not-a-port"), ("SYNC_MAX_BATCH", "0"), ("API_TOKEN", "  ")]);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.sync.max_batch, 500);
        assert!(config.security.api_token.is_none());
    }

    #[test]
    fn wildcard_origin_means_any() {
        assert!(parse_origins("*").is_empty());
        assert!(parse_origins("https://a.example.com,*").is_empty());
        assert!(parse_origins(" , ").is_empty());
    }

    #[test]
    fn debug_output_hides_token() {
        let config = config_from(&[("API_TOKEN", "kiosk-secret")]);
        let shown = format!("{:?}", config.security);
        assert!(!shown.contains("kiosk-secret"));
        assert!(shown.contains("<redacted>"));
    }
}
