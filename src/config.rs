use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

/// Ten years; longer lifetimes are refused at load time.
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

#[derive(Parser, Debug)]
#[command(name = "postline", about = "A small social feed server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Token signing secret
    #[arg(long, env = "POSTLINE_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Recompute like arrays and comment counters for every post, then exit
    Reconcile,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub google: GoogleConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the API from a browser. Empty disables CORS.
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Where the browser lands after login; the callback redirects here.
    pub public_url: String,
    pub redirect_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_days: 7,
            bcrypt_cost: 12,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            public_url: "http://localhost:3000".to_string(),
            redirect_url: None,
        }
    }
}

impl GoogleConfig {
    /// Google sign-in is only offered when both client credentials are set.
    pub fn is_configured(&self) -> bool {
        let set = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        set(&self.client_id) && set(&self.client_secret)
    }

    pub fn callback_url(&self) -> String {
        self.redirect_url.clone().unwrap_or_else(|| {
            format!(
                "{}/auth/google/callback",
                self.public_url.trim_end_matches('/')
            )
        })
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref secret) = cli.jwt_secret {
            config.auth.jwt_secret = Some(secret.clone());
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("postline.db"));
        }

        let ttl = config.auth.token_ttl_days;
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&ttl) {
            anyhow::bail!(
                "auth.token_ttl_days must be between 1 and {}, got {}",
                MAX_TOKEN_TTL_DAYS,
                ttl
            );
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".postline")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("postline.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with(data_dir: PathBuf) -> Cli {
        Cli {
            config: None,
            host: None,
            port: None,
            data_dir: Some(data_dir),
            jwt_secret: None,
            command: None,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert!(config.server.allowed_origins.is_empty());
        assert_eq!(config.auth.token_ttl_days, 7);
        assert_eq!(config.auth.bcrypt_cost, 12);
        assert!(config.auth.jwt_secret.is_none());
        assert!(!config.google.is_configured());
        assert!(config.database.path.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli_with(PathBuf::from("/tmp/test-postline"));
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-postline"));
    }

    #[test]
    fn data_dir_defaults_to_dot_postline() {
        let mut cli = cli_with(PathBuf::new());
        cli.data_dir = None;
        assert!(Config::data_dir(&cli).ends_with(".postline"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli_with(tmp.path().to_path_buf())).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.db_path(), tmp.path().join("postline.db"));
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
host = "127.0.0.1"
port = 9000
allowed_origins = ["http://localhost:5173"]

[auth]
jwt_secret = "from-file"
token_ttl_days = 1

[google]
client_id = "id"
client_secret = "secret"
public_url = "https://feed.example.com/"
"#,
        )
        .unwrap();

        let mut cli = cli_with(tmp.path().to_path_buf());
        cli.config = Some(config_path);
        let config = Config::load(&cli).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.allowed_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-file"));
        assert_eq!(config.auth.token_ttl_days, 1);
        assert_eq!(config.auth.bcrypt_cost, 12);
        assert!(config.google.is_configured());
        assert_eq!(
            config.google.callback_url(),
            "https://feed.example.com/auth/google/callback"
        );
    }

    #[test]
    fn cli_overrides_beat_toml_values() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[server]
port = 9000

[auth]
jwt_secret = "from-file"
"#,
        )
        .unwrap();

        let mut cli = cli_with(tmp.path().to_path_buf());
        cli.config = Some(config_path);
        cli.port = Some(4000);
        cli.jwt_secret = Some("from-cli".to_string());
        let config = Config::load(&cli).unwrap();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-cli"));
    }

    #[test]
    fn load_rejects_out_of_range_token_ttl() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        let mut cli = cli_with(tmp.path().to_path_buf());
        cli.config = Some(config_path.clone());

        for ttl in ["0", "-3", "9223372036854775807"] {
            std::fs::write(&config_path, format!("[auth]\ntoken_ttl_days = {}\n", ttl)).unwrap();
            let err = Config::load(&cli).unwrap_err();
            assert!(err.to_string().contains("token_ttl_days"), "{}", err);
        }

        std::fs::write(
            &config_path,
            format!("[auth]\ntoken_ttl_days = {}\n", MAX_TOKEN_TTL_DAYS),
        )
        .unwrap();
        assert_eq!(
            Config::load(&cli).unwrap().auth.token_ttl_days,
            MAX_TOKEN_TTL_DAYS
        );
    }

    #[test]
    fn explicit_redirect_url_wins() {
        let google = GoogleConfig {
            redirect_url: Some("https://other/cb".to_string()),
            ..GoogleConfig::default()
        };
        assert_eq!(google.callback_url(), "https://other/cb");
    }
}
