use crate::services::object_store::{S3Settings, StorageConfig};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use tracing::warn;

const ENV_PREFIX: &str = "ARTIFACT_REPO_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub storage: StorageConfig,
    /// Where multipart uploads are staged before entering the object store.
    pub upload_dir: PathBuf,
    pub connect_attempts: u32,
    pub connect_delay: Duration,
    /// Upper bound for every repository call. `None` disables it.
    pub operation_timeout: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    Filesystem,
    S3,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "filesystem" | "fs" => Ok(Self::Filesystem),
            "s3" => Ok(Self::S3),
            other => bail!("unknown storage backend `{other}` (expected filesystem or s3)"),
        }
    }
}

/// What the process should do once configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Serve,
    Migrate,
    Reconcile { sweep: bool },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Project and artifact repository API")]
pub struct Args {
    /// Host to bind to (overrides ARTIFACT_REPO_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ARTIFACT_REPO_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides ARTIFACT_REPO_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object store backend (overrides ARTIFACT_REPO_STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub storage_backend: Option<StorageBackend>,

    /// Directory for filesystem payloads (overrides ARTIFACT_REPO_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Externally reachable base URL used in signed download links
    /// (overrides ARTIFACT_REPO_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// S3 endpoint, e.g. `minio:9000` (overrides ARTIFACT_REPO_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 bucket (overrides ARTIFACT_REPO_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 region (overrides ARTIFACT_REPO_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Directory for staged uploads (overrides ARTIFACT_REPO_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<String>,

    /// Per-operation timeout in seconds, 0 to disable
    /// (overrides ARTIFACT_REPO_OPERATION_TIMEOUT_SECS)
    #[arg(long)]
    pub operation_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Report rows without payloads and payloads without rows, then exit
    #[arg(long)]
    pub reconcile: bool,

    /// With --reconcile, also delete payloads that have no row
    #[arg(long, requires = "reconcile")]
    pub sweep: bool,
}

/// Read `ARTIFACT_REPO_{name}` through `lookup` and parse it, falling back to
/// `default` when unset.
fn env_or<T, L>(lookup: &L, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    let key = format!("{ENV_PREFIX}{name}");
    match lookup(&key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("parsing {key} value `{value}`")),
        None => Ok(default),
    }
}

fn env_opt<L>(lookup: &L, name: &str) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, Mode)> {
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge `args` over variables found through `lookup` over defaults.
    pub fn resolve<L>(args: Args, lookup: L) -> Result<(Self, Mode)>
    where
        L: Fn(&str) -> Option<String>,
    {
        let host = match args.host {
            Some(host) => host,
            None => env_or(&lookup, "HOST", "0.0.0.0".to_string())?,
        };
        let port = match args.port {
            Some(port) => port,
            None => env_or(&lookup, "PORT", 3000u16)?,
        };
        let database_url = match args.database_url {
            Some(url) => url,
            None => env_or(
                &lookup,
                "DATABASE_URL",
                "sqlite://./data/meta/artifact_repo.db".to_string(),
            )?,
        };
        let backend = match args.storage_backend {
            Some(backend) => backend,
            None => env_or(&lookup, "STORAGE_BACKEND", StorageBackend::Filesystem)?,
        };

        let storage = match backend {
            StorageBackend::Filesystem => {
                let path = args
                    .storage_dir
                    .or_else(|| env_opt(&lookup, "STORAGE_DIR"))
                    .unwrap_or_else(|| "./data/objects".into());
                let public_base_url = args
                    .public_base_url
                    .or_else(|| env_opt(&lookup, "PUBLIC_BASE_URL"))
                    .unwrap_or_else(|| default_public_base_url(&host, port));
                let signing_secret = match env_opt(&lookup, "SIGNING_SECRET") {
                    Some(secret) => secret,
                    None => {
                        warn!(
                            "ARTIFACT_REPO_SIGNING_SECRET not set; download links will not survive a restart"
                        );
                        uuid::Uuid::new_v4().simple().to_string()
                    }
                };
                StorageConfig::Filesystem {
                    path: PathBuf::from(path),
                    public_base_url,
                    signing_secret,
                }
            }
            StorageBackend::S3 => StorageConfig::S3(S3Settings {
                bucket: args
                    .s3_bucket
                    .or_else(|| env_opt(&lookup, "S3_BUCKET"))
                    .unwrap_or_else(|| "artifacts".into()),
                endpoint: args.s3_endpoint.or_else(|| env_opt(&lookup, "S3_ENDPOINT")),
                region: args
                    .s3_region
                    .or_else(|| env_opt(&lookup, "S3_REGION"))
                    .unwrap_or_else(|| "us-east-1".into()),
                access_key_id: env_opt(&lookup, "S3_ACCESS_KEY_ID")
                    .context("ARTIFACT_REPO_S3_ACCESS_KEY_ID is required for the s3 backend")?,
                secret_access_key: env_opt(&lookup, "S3_SECRET_ACCESS_KEY")
                    .context("ARTIFACT_REPO_S3_SECRET_ACCESS_KEY is required for the s3 backend")?,
                force_path_style: env_or(&lookup, "S3_FORCE_PATH_STYLE", true)?,
            }),
        };

        let upload_dir = args
            .upload_dir
            .or_else(|| env_opt(&lookup, "UPLOAD_DIR"))
            .unwrap_or_else(|| "./data/uploads".into());
        let timeout_secs = match args.operation_timeout_secs {
            Some(secs) => secs,
            None => env_or(&lookup, "OPERATION_TIMEOUT_SECS", 30u64)?,
        };

        let cfg = Self {
            host,
            port,
            database_url,
            max_connections: env_or(&lookup, "MAX_CONNECTIONS", 5u32)?,
            storage,
            upload_dir: PathBuf::from(upload_dir),
            connect_attempts: env_or(&lookup, "CONNECT_ATTEMPTS", 20u32)?,
            connect_delay: Duration::from_secs(env_or(&lookup, "CONNECT_DELAY_SECS", 5u64)?),
            operation_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        };

        let mode = if args.migrate {
            Mode::Migrate
        } else if args.reconcile {
            Mode::Reconcile { sweep: args.sweep }
        } else {
            Mode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_public_base_url(host: &str, port: u16) -> String {
    let host = match host {
        "0.0.0.0" | "::" | "" => "localhost",
        other => other,
    };
    format!("http://{host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let (cfg, mode) = AppConfig::resolve(Args::default(), lookup(&[])).unwrap();

        assert_eq!(mode, Mode::Serve);
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.connect_attempts, 20);
        assert_eq!(cfg.connect_delay, Duration::from_secs(5));
        assert_eq!(cfg.operation_timeout, Some(Duration::from_secs(30)));
        match cfg.storage {
            StorageConfig::Filesystem {
                public_base_url, ..
            } => assert_eq!(public_base_url, "http://localhost:3000"),
            other => panic!("unexpected storage: {other:?}"),
        }
    }

    #[test]
    fn args_override_env() {
        let args = Args {
            port: Some(8080),
            ..Args::default()
        };
        let (cfg, _) = AppConfig::resolve(
            args,
            lookup(&[("ARTIFACT_REPO_PORT", "9000"), ("ARTIFACT_REPO_HOST", "127.0.0.1")]),
        )
        .unwrap();

        assert_eq!(cfg.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn invalid_numeric_env_names_the_variable() {
        let err = AppConfig::resolve(Args::default(), lookup(&[("ARTIFACT_REPO_PORT", "http")]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("ARTIFACT_REPO_PORT"));
    }

    #[test]
    fn zero_timeout_disables_the_deadline() {
        let (cfg, _) = AppConfig::resolve(
            Args::default(),
            lookup(&[("ARTIFACT_REPO_OPERATION_TIMEOUT_SECS", "0")]),
        )
        .unwrap();
        assert_eq!(cfg.operation_timeout, None);
    }

    #[test]
    fn s3_backend_requires_credentials() {
        let vars = [("ARTIFACT_REPO_STORAGE_BACKEND", "s3")];
        assert!(AppConfig::resolve(Args::default(), lookup(&vars)).is_err());

        let vars = [
            ("ARTIFACT_REPO_STORAGE_BACKEND", "s3"),
            ("ARTIFACT_REPO_S3_ENDPOINT", "minio:9000"),
            ("ARTIFACT_REPO_S3_ACCESS_KEY_ID", "minioadmin"),
            ("ARTIFACT_REPO_S3_SECRET_ACCESS_KEY", "minioadmin"),
        ];
        let (cfg, _) = AppConfig::resolve(Args::default(), lookup(&vars)).unwrap();
        match cfg.storage {
            StorageConfig::S3(settings) => {
                assert_eq!(settings.bucket, "artifacts");
                assert_eq!(settings.endpoint.as_deref(), Some("minio:9000"));
                assert!(settings.force_path_style);
            }
            other => panic!("unexpected storage: {other:?}"),
        }
    }

    #[test]
    fn reconcile_flags_select_the_mode() {
        let args = Args::try_parse_from(["artifact-repo", "--reconcile", "--sweep"]).unwrap();
        let (_, mode) = AppConfig::resolve(args, lookup(&[])).unwrap();
        assert_eq!(mode, Mode::Reconcile { sweep: true });

        assert!(Args::try_parse_from(["artifact-repo", "--sweep"]).is_err());
    }
}
