mod telemetry;

use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use surrogate::{BusinessKey, EntityKind};
use surrogate_client::{ClientConfig, ClientStrategy, Error, ExportConfig, ExportIdCache, IdClient};
use tracing::{debug, error};

/// Looks up (or creates) the surrogate id of one business key.
///
/// Prints the id and exits 0 when found, exits 1 when absent, and exits 2 on
/// any failure.
#[derive(Parser, Debug)]
#[command(
    name = "surrogate-lookup",
    version,
    about = "Resolve surrogate ids from the command line",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    lookup: LookupArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve through the on-disk bulk export cache.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct LookupArgs {
    /// Entity kind: donor, specimen, sample, mutation, file, project,
    /// analysis or object.
    #[arg(required = true)]
    kind: Option<EntityKind>,

    /// Business key fields in canonical order. Omit for a random analysis id.
    fields: Vec<String>,

    /// Allocate an id if none exists.
    #[arg(long, default_value_t = false)]
    create: bool,

    /// One of remote, cached, hash or hash-persistent.
    ///
    /// Environment variable: `ID_CLIENT_STRATEGY`
    #[arg(long, env = "ID_CLIENT_STRATEGY", default_value = "remote")]
    strategy: ClientStrategy,

    /// Environment variable: `ID_SERVICE_URL`
    #[arg(long, env = "ID_SERVICE_URL", default_value = "http://localhost:8080")]
    service_url: String,

    /// Environment variable: `ID_RELEASE`
    #[arg(long, env = "ID_RELEASE", default_value = "")]
    release: String,

    /// Bearer token for the id service.
    ///
    /// Environment variable: `ID_AUTH_TOKEN`
    #[arg(long, env = "ID_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Retries after the first attempt for 503s and transient failures.
    ///
    /// Environment variable: `ID_MAX_RETRIES`
    #[arg(long, env = "ID_MAX_RETRIES", default_value_t = 10)]
    max_retries: u32,

    /// Environment variable: `ID_WAIT_BEFORE_RETRY_SECS`
    #[arg(long, env = "ID_WAIT_BEFORE_RETRY_SECS", default_value_t = 15)]
    wait_before_retry_secs: u64,

    /// Environment variable: `ID_RETRY_MULTIPLIER`
    #[arg(long, env = "ID_RETRY_MULTIPLIER", default_value_t = 2.0)]
    retry_multiplier: f64,

    /// Log every request at info level.
    #[arg(long, default_value_t = false)]
    request_logging: bool,

    /// Accept invalid TLS certificates.
    #[arg(long, default_value_t = false)]
    insecure: bool,
}

impl LookupArgs {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            service_url: self.service_url.clone(),
            release: self.release.clone(),
            auth_token: self.auth_token.clone(),
            max_retries: self.max_retries,
            wait_before_retry: Duration::from_secs(self.wait_before_retry_secs),
            retry_multiplier: self.retry_multiplier,
            request_logging: self.request_logging,
            strict_ssl_certificates: !self.insecure,
            ..ClientConfig::default()
        }
    }
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// A sequence-backed entity kind.
    kind: EntityKind,

    /// Business key fields in canonical order.
    #[arg(required = true)]
    fields: Vec<String>,

    /// Directory holding the cache files.
    ///
    /// Environment variable: `ID_CACHE_DIR`
    #[arg(long, env = "ID_CACHE_DIR", default_value = ".surrogate-cache")]
    cache_dir: PathBuf,

    /// Environment variable: `ID_SERVICE_URL`
    #[arg(long, env = "ID_SERVICE_URL", default_value = "http://localhost:8080")]
    service_url: String,

    /// Environment variable: `ID_AUTH_TOKEN`
    #[arg(long, env = "ID_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,
}

fn main() -> anyhow::Result<ExitCode> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    telemetry::init_logging()?;

    let result = match args.command {
        Some(Command::Export(export)) => run_export(export),
        None => run_lookup(args.lookup),
    };

    Ok(match result {
        Ok(Some(id)) => {
            println!("{id}");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            debug!("No id found");
            ExitCode::from(1)
        }
        Err(err) => {
            report(&err);
            ExitCode::from(2)
        }
    })
}

fn run_lookup(args: LookupArgs) -> Result<Option<String>, Error> {
    let client = args.strategy.build(args.client_config())?;
    let kind = args.kind.ok_or(Error::Config {
        reason: "an entity kind is required".to_string(),
    })?;

    if kind == EntityKind::Analysis && args.fields.is_empty() && args.create {
        return client.create_random_analysis_id().map(Some);
    }
    let key = BusinessKey::new(kind, args.fields)?;
    if args.create {
        client.create(&key).map(Some)
    } else {
        client.get(&key)
    }
}

fn run_export(args: ExportArgs) -> Result<Option<String>, Error> {
    let config = ExportConfig {
        service_url: args.service_url,
        auth_token: args.auth_token,
        ..ExportConfig::default()
    };
    let cache = ExportIdCache::new(args.cache_dir, config)?;
    let key = BusinessKey::new(args.kind, args.fields)?;
    let id = cache.get_id(&key);
    cache.close();
    id
}

fn report(err: &Error) {
    match err {
        Error::ExhaustedRetry { attempts, cause } => {
            error!(attempts, %cause, "Id service still unavailable after retrying");
        }
        Error::Identifier { status, message } => {
            error!(status, %message, "Id service rejected the request");
        }
        Error::Format(err) => error!(%err, "Invalid id or business key"),
        Error::Absent { kind } => error!(%kind, "Create returned no id"),
        other => error!(err = %other, "Lookup failed"),
    }
}
