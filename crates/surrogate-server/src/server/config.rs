use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `surrogate-server` binary.
///
/// Every value comes from a CLI flag or its environment variable; a `.env`
/// file in the working directory is read first.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "surrogate-server",
    version,
    about = "An HTTP service allocating stable surrogate ids"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// SQLite database holding every mapping. Created on first start.
    ///
    /// Several server processes may share one file.
    ///
    /// Environment variable: `DATABASE_PATH`
    #[arg(long, env = "DATABASE_PATH", default_value = "ids.db")]
    pub database_path: PathBuf,

    /// Number of pooled database connections.
    ///
    /// Environment variable: `POOL_SIZE`
    #[arg(long, env = "POOL_SIZE", default_value_t = 4)]
    pub pool_size: usize,

    /// Insert attempts the allocator makes for one key before giving up.
    ///
    /// Each lost race costs one attempt. Running out signals a persistent
    /// conflict or a storage fault and is reported as a 500.
    ///
    /// Environment variable: `MAX_CREATE_ATTEMPTS`
    #[arg(long, env = "MAX_CREATE_ATTEMPTS", default_value_t = 1000)]
    pub max_create_attempts: usize,

    /// Random analysis id candidates tried before giving up.
    ///
    /// Environment variable: `MAX_RANDOM_ATTEMPTS`
    #[arg(long, env = "MAX_RANDOM_ATTEMPTS", default_value_t = 100)]
    pub max_random_attempts: usize,

    /// How long a writer waits on a locked database before the request is
    /// answered with 503.
    ///
    /// Environment variable: `BUSY_TIMEOUT_MS`
    #[arg(long, env = "BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub database_path: PathBuf,
    pub pool_size: usize,
    pub max_create_attempts: usize,
    pub max_random_attempts: usize,
    pub busy_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.pool_size == 0 {
            bail!("POOL_SIZE must be greater than 0");
        }

        if args.max_create_attempts == 0 {
            bail!("MAX_CREATE_ATTEMPTS must be greater than 0");
        }

        if args.max_random_attempts == 0 {
            bail!("MAX_RANDOM_ATTEMPTS must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            database_path: args.database_path,
            pool_size: args.pool_size,
            max_create_attempts: args.max_create_attempts,
            max_random_attempts: args.max_random_attempts,
            busy_timeout: Duration::from_millis(args.busy_timeout_ms),
        })
    }
}
