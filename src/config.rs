//! Configuration for vibe-analysis
//!
//! All connection parameters come from the environment (the service runs in a
//! container next to its collaborators). Every value has a development
//! default so `cargo run` works against a local docker-compose stack.

use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// MySQL connection configuration (shared `assets` table)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("DB_HOST", "localhost"),
            port: env_parse("DB_PORT", 3306),
            name: env_or("DB_NAME", "sound_vibe_db"),
            user: env_or("DB_USER", "root"),
            password: env_or("DB_PASSWORD", "root"),
        }
    }

    /// sqlx connection URL
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// RabbitMQ connection configuration
///
/// Exchange, queue, and routing keys are fixed constants shared with the
/// producing asset service; only the endpoint and credentials vary per
/// deployment.
#[derive(Debug, Clone)]
pub struct RabbitMqConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Delay between reconnect attempts after a connection fault
    pub reconnect_delay: Duration,
}

impl RabbitMqConfig {
    /// Topic exchange carrying asset lifecycle events
    pub const EXCHANGE: &'static str = "soundvibe.asset.topic";
    /// Durable queue this worker consumes from
    pub const QUEUE: &'static str = "soundvibe.asset.analysis.queue";
    /// Routing key for inbound "asset uploaded" tasks
    pub const ROUTING_KEY_UPLOADED: &'static str = "asset.uploaded";
    /// Routing key for outbound completion events
    pub const ROUTING_KEY_COMPLETED: &'static str = "asset.analysis.completed";

    pub fn from_env() -> Self {
        Self {
            host: env_or("RABBITMQ_HOST", "localhost"),
            port: env_parse("RABBITMQ_PORT", 5672),
            user: env_or("RABBITMQ_USER", "guest"),
            password: env_or("RABBITMQ_PASSWORD", "guest"),
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// AMQP connection URI
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.user, self.password, self.host, self.port
        )
    }
}

/// MinIO (S3-compatible) object storage configuration
#[derive(Debug, Clone)]
pub struct MinioConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub secure: bool,
    /// Host-reachable endpoint for presigned URLs; the internal endpoint
    /// may only resolve inside the container network.
    pub external_endpoint: String,
}

impl MinioConfig {
    pub fn from_env() -> Self {
        let endpoint = env_or("MINIO_ENDPOINT", "localhost:9000");
        let external = env_or("MINIO_EXTERNAL_ENDPOINT", "");
        Self {
            external_endpoint: if external.is_empty() {
                endpoint.clone()
            } else {
                external
            },
            endpoint,
            access_key: env_or("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: env_or("MINIO_SECRET_KEY", "minioadmin"),
            bucket: env_or("MINIO_BUCKET", "soundvibe-assets"),
            secure: env_or("MINIO_SECURE", "false").eq_ignore_ascii_case("true"),
        }
    }

    fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Internal endpoint URL (container network)
    pub fn endpoint_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.endpoint)
    }

    /// External endpoint URL (browser-reachable, used for presigned URLs)
    pub fn external_endpoint_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.external_endpoint)
    }
}

/// HTTP API bind address and model sidecar endpoint
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the embedding/generation inference sidecar
    pub model_server_url: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("SERVICE_HOST", "0.0.0.0"),
            port: env_parse("SERVICE_PORT", 8090),
            model_server_url: env_or("MODEL_SERVER_URL", "http://localhost:8600"),
        }
    }
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub rabbitmq: RabbitMqConfig,
    pub minio: MinioConfig,
    pub service: ServiceConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::from_env(),
            rabbitmq: RabbitMqConfig::from_env(),
            minio: MinioConfig::from_env(),
            service: ServiceConfig::from_env(),
        }
    }
}
