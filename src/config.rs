use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    // Servidor
    pub host: String,
    pub port: u16,
    pub public_url: Option<Url>,

    // Muestras
    pub samples_dir: PathBuf,

    // Caché
    pub cache_ttl: Duration,
    pub cache_max_size: usize, // 0 = sin límite
    pub metadata_concurrency: usize,

    // Features
    pub hot_reload: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Servidor
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            public_url: match std::env::var("PUBLIC_URL") {
                Ok(val) if !val.trim().is_empty() => {
                    Some(Url::parse(val.trim()).context("PUBLIC_URL must be an absolute URL")?)
                }
                _ => None,
            },

            // Muestras
            samples_dir: std::env::var("STRUDEL_SAMPLES")
                .unwrap_or_else(|_| "./samples".to_string())
                .into(),

            // Caché (TTL en milisegundos, como en el despliegue con Docker)
            cache_ttl: Duration::from_millis(
                std::env::var("CACHE_TTL")
                    .unwrap_or_else(|_| "3600000".to_string()) // 1 hora
                    .parse()
                    .context("CACHE_TTL must be milliseconds")?,
            ),
            cache_max_size: std::env::var("CACHE_MAX_SIZE")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("CACHE_MAX_SIZE must be an entry count")?,
            metadata_concurrency: match std::env::var("METADATA_CONCURRENCY") {
                Ok(val) if !val.trim().is_empty() => val
                    .trim()
                    .parse()
                    .context("METADATA_CONCURRENCY must be a worker count")?,
                _ => num_cpus::get(),
            },

            // Features
            hot_reload: parse_flag(
                &std::env::var("HOT_RELOAD").unwrap_or_else(|_| "true".to_string()),
            )?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Port must not be 0 (it is reported by `/stats` and used by the health check)
    /// - Metadata concurrency must be at least 1
    /// - `PUBLIC_URL`, when present, must use http or https
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port must be greater than 0");
        }

        if self.metadata_concurrency == 0 {
            anyhow::bail!("Metadata concurrency must be greater than 0");
        }

        if let Some(url) = &self.public_url {
            if url.scheme() != "http" && url.scheme() != "https" {
                anyhow::bail!("PUBLIC_URL must use http or https, got: {}", url.scheme());
            }
        }

        Ok(())
    }

    /// Upper bound on cached entries, `None` when unbounded.
    pub fn cache_limit(&self) -> Option<usize> {
        (self.cache_max_size > 0).then_some(self.cache_max_size)
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Server: {}:{} (public: {})\n  \
            Samples: {}\n  \
            Cache: ttl {}, max {} entries, {} metadata workers\n  \
            Features: HotReload={}",
            self.host,
            self.port,
            self.public_url
                .as_ref()
                .map_or("from Host header".to_string(), |url| url.to_string()),
            self.samples_dir.display(),
            if self.cache_ttl.is_zero() {
                "disabled".to_string()
            } else {
                humantime::format_duration(self.cache_ttl).to_string()
            },
            self.cache_limit()
                .map_or("unbounded".to_string(), |max| max.to_string()),
            self.metadata_concurrency,
            self.hot_reload
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5432,
            public_url: None,

            samples_dir: "./samples".into(),

            cache_ttl: Duration::from_secs(3600),
            cache_max_size: 500,
            metadata_concurrency: num_cpus::get(),

            hot_reload: true,
        }
    }
}

/// Acepta las formas habituales de booleano en variables de entorno.
fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("Invalid boolean flag: {other}"),
    }
}
