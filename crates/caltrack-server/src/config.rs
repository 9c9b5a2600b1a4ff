use caltrack_auth::SessionConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Principal cache and access token lifetimes
    #[serde(default)]
    pub session: SessionConfig,
    /// Bootstrap configuration (initial admin user)
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.session
            .validate()
            .map_err(|e| format!("session config error: {e}"))?;
        if let Some(admin) = &self.bootstrap.admin_user {
            if admin.email.trim().is_empty() {
                return Err("bootstrap.admin_user.email must not be empty".into());
            }
            if admin.password.is_empty() {
                return Err("bootstrap.admin_user.password must not be empty".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configures admin user creation on first startup.
/// Admin credentials can also be set via environment variables:
/// - CALTRACK__BOOTSTRAP__ADMIN_USER__EMAIL
/// - CALTRACK__BOOTSTRAP__ADMIN_USER__NAME
/// - CALTRACK__BOOTSTRAP__ADMIN_USER__PASSWORD
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    /// If set, creates an admin user on startup unless the email is taken
    #[serde(default)]
    pub admin_user: Option<AdminUserConfig>,
}

/// Configuration for bootstrapping an admin user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUserConfig {
    pub email: String,
    #[serde(default = "default_admin_name")]
    pub name: String,
    /// Plain text, hashed before storage.
    /// Prefer CALTRACK__BOOTSTRAP__ADMIN_USER__PASSWORD over the file.
    pub password: String,
}

fn default_admin_name() -> String {
    "Administrator".into()
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::Path;

    /// Default configuration file name.
    pub const DEFAULT_CONFIG_PATH: &str = "caltrack.toml";

    /// Loads configuration from an optional TOML file, then applies
    /// `CALTRACK__SECTION__KEY` environment overrides.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        if let Some(p) = path.filter(|p| Path::new(p).exists()) {
            builder = builder.add_source(File::from(Path::new(p)));
        }
        builder = builder.add_source(
            Environment::with_prefix("CALTRACK")
                .try_parsing(true)
                .separator("__"),
        );

        let cfg = builder.build().map_err(|e| e.to_string())?;
        let app: AppConfig = cfg.try_deserialize().map_err(|e| e.to_string())?;
        app.validate()?;
        Ok(app)
    }
}
