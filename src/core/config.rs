use std::env;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Settings {
    runtime: RuntimeSettings,
    database: DatabaseSettings,
    engines: EngineSettings,
    jobs: JobSettings,
    s3: S3Settings,
    notifications: NotificationSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub strict_config: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub postgres_server: String,
    pub postgres_port: u16,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,
    pub database_url: Option<String>,
}

/// External transcription and analysis engines, invoked opaquely over HTTP.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub transcription_base_url: String,
    pub transcription_api_key: String,
    pub transcription_timeout_seconds: u64,
    pub analysis_base_url: String,
    pub analysis_api_key: String,
    pub analysis_model: String,
    pub analysis_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub worker_concurrency: usize,
    pub max_attempts: i32,
    pub backoff_base_seconds: u64,
    pub attempt_timeout_seconds: u64,
    pub coverage_refresh_interval_seconds: u64,
    pub stale_recovery_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub presigned_url_expire_minutes: u64,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
    pub prometheus_enabled: bool,
    pub prometheus_listen_addr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("AULAFLOW_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("AULAFLOW_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "aulaflow");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "aulaflow_db");
        let database_url = env_optional("DATABASE_URL");

        let transcription_base_url = env_or_default("TRANSCRIPTION_BASE_URL", "");
        let transcription_api_key = env_or_default("TRANSCRIPTION_API_KEY", "");
        let transcription_timeout_seconds = parse_u64(
            "TRANSCRIPTION_TIMEOUT_SECONDS",
            env_or_default("TRANSCRIPTION_TIMEOUT_SECONDS", "600"),
        )?;
        let analysis_base_url = env_or_default("ANALYSIS_BASE_URL", "");
        let analysis_api_key = env_or_default("ANALYSIS_API_KEY", "");
        let analysis_model = env_or_default("ANALYSIS_MODEL", "gpt-5");
        let analysis_timeout_seconds = parse_u64(
            "ANALYSIS_TIMEOUT_SECONDS",
            env_or_default("ANALYSIS_TIMEOUT_SECONDS", "600"),
        )?;

        let worker_concurrency =
            parse_u64("JOB_WORKER_CONCURRENCY", env_or_default("JOB_WORKER_CONCURRENCY", "3"))?
                as usize;
        let max_attempts =
            parse_u64("JOB_MAX_ATTEMPTS", env_or_default("JOB_MAX_ATTEMPTS", "3"))? as i32;
        let backoff_base_seconds =
            parse_u64("JOB_BACKOFF_BASE_SECONDS", env_or_default("JOB_BACKOFF_BASE_SECONDS", "5"))?;
        let attempt_timeout_seconds = parse_u64(
            "JOB_ATTEMPT_TIMEOUT_SECONDS",
            env_or_default("JOB_ATTEMPT_TIMEOUT_SECONDS", "900"),
        )?;
        let coverage_refresh_interval_seconds = parse_u64(
            "COVERAGE_REFRESH_INTERVAL_SECONDS",
            env_or_default("COVERAGE_REFRESH_INTERVAL_SECONDS", "900"),
        )?;
        let stale_recovery_interval_seconds = parse_u64(
            "STALE_RECOVERY_INTERVAL_SECONDS",
            env_or_default("STALE_RECOVERY_INTERVAL_SECONDS", "300"),
        )?;

        let s3_endpoint = env_or_default("S3_ENDPOINT", "");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "aulaflow-recordings");
        let s3_region = env_or_default("S3_REGION", "us-east-1");
        let presigned_url_expire_minutes = parse_u64(
            "PRESIGNED_URL_EXPIRE_MINUTES",
            env_or_default("PRESIGNED_URL_EXPIRE_MINUTES", "60"),
        )?;

        let webhook_url = env_optional("NOTIFICATION_WEBHOOK_URL");
        let notification_timeout_seconds = parse_u64(
            "NOTIFICATION_TIMEOUT_SECONDS",
            env_or_default("NOTIFICATION_TIMEOUT_SECONDS", "10"),
        )?;

        let log_level = env_or_default("AULAFLOW_LOG_LEVEL", "info");
        let json =
            env_optional("AULAFLOW_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_listen_addr = env_or_default("PROMETHEUS_LISTEN_ADDR", "0.0.0.0:9090");

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            engines: EngineSettings {
                transcription_base_url,
                transcription_api_key,
                transcription_timeout_seconds,
                analysis_base_url,
                analysis_api_key,
                analysis_model,
                analysis_timeout_seconds,
            },
            jobs: JobSettings {
                worker_concurrency,
                max_attempts,
                backoff_base_seconds,
                attempt_timeout_seconds,
                coverage_refresh_interval_seconds,
                stale_recovery_interval_seconds,
            },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
                presigned_url_expire_minutes,
            },
            notifications: NotificationSettings {
                webhook_url,
                timeout_seconds: notification_timeout_seconds,
            },
            telemetry: TelemetrySettings {
                log_level,
                json,
                prometheus_enabled,
                prometheus_listen_addr,
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub fn engines(&self) -> &EngineSettings {
        &self.engines
    }

    pub fn jobs(&self) -> &JobSettings {
        &self.jobs
    }

    pub fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub fn notifications(&self) -> &NotificationSettings {
        &self.notifications
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.max_attempts < 1 {
            return Err(ConfigError::InvalidValue {
                field: "JOB_MAX_ATTEMPTS",
                value: self.jobs.max_attempts.to_string(),
            });
        }
        if self.jobs.worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "JOB_WORKER_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.engines.transcription_base_url.is_empty() {
            return Err(ConfigError::MissingSecret("TRANSCRIPTION_BASE_URL"));
        }

        if self.engines.analysis_base_url.is_empty() {
            return Err(ConfigError::MissingSecret("ANALYSIS_BASE_URL"));
        }

        if self.engines.analysis_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("ANALYSIS_API_KEY"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl S3Settings {
    /// Storage is optional; lessons submitted as text never touch S3.
    pub fn configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.access_key.is_empty() && !self.secret_key.is_empty()
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|val| val.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("YES"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn parse_environment_variants() {
        assert_eq!(parse_environment(Some("prod".to_string())), Environment::Production);
        assert_eq!(parse_environment(Some("staging".to_string())), Environment::Staging);
        assert_eq!(parse_environment(Some("testing".to_string())), Environment::Test);
        assert_eq!(parse_environment(None), Environment::Development);
    }

    #[test]
    fn database_url_prefers_explicit_value() {
        let settings = DatabaseSettings {
            postgres_server: "db".to_string(),
            postgres_port: 5432,
            postgres_user: "user".to_string(),
            postgres_password: "pw".to_string(),
            postgres_db: "aulaflow".to_string(),
            database_url: Some("postgresql://explicit/url".to_string()),
        };
        assert_eq!(settings.database_url(), "postgresql://explicit/url");

        let built = DatabaseSettings { database_url: None, ..settings };
        assert_eq!(built.database_url(), "postgresql://user:pw@db:5432/aulaflow");
    }
}
