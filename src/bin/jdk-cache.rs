//! jdk-cache CLI
//!
//! Usage:
//!   jdk-cache acquire <PROVIDER> [-a name=value]...   Print the path of a cached JDK
//!   jdk-cache key <PROVIDER> [-a name=value]...       Print the cache key only
//!   jdk-cache providers                               List provider ids

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jdk_cache::core::output;
use jdk_cache::{CacheConfig, JdkCache, Origin, ProviderId, ProxyConfig, ReleaseRequest, Verification};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jdk-cache")]
#[command(about = "Download, verify and cache JDK distributions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only errors on stderr
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a JDK and print its path
    Acquire {
        #[command(flatten)]
        target: Target,

        /// Never touch the network; fail on a cache miss
        #[arg(long)]
        offline: bool,

        /// Cache root directory
        #[arg(long, env = "JDK_CACHE_ROOT")]
        cache_root: Option<PathBuf>,

        /// Connect and read timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Proxy as [protocol://][user:password@]host[:port]
        #[arg(long)]
        proxy: Option<String>,

        /// Value of the Authorization header
        #[arg(long)]
        authorization: Option<String>,

        /// Give up waiting for another acquisition of the same key after this many seconds
        #[arg(long)]
        lock_timeout: Option<u64>,
    },

    /// Print the cache key a request maps to
    Key {
        #[command(flatten)]
        target: Target,
    },

    /// List provider ids
    Providers,
}

#[derive(Args)]
struct Target {
    /// Provider id (ADOPTIUM, SAPMACHINE, LIBERICA, GRAALVMCE, ADOPTIUM_API, CORRETTO, MICROSOFT, URL, LOCAL)
    provider: ProviderId,

    /// Request attribute as name=value
    #[arg(short = 'a', long = "attr", value_name = "NAME=VALUE")]
    attributes: Vec<String>,
}

impl Target {
    fn request(&self) -> Result<ReleaseRequest> {
        Ok(ReleaseRequest::from_pairs(&self.attributes)?)
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("jdk_cache=warn"),
        1 => EnvFilter::new("jdk_cache=info"),
        _ => EnvFilter::new("jdk_cache=debug"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    output::set_quiet(cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Acquire {
            target,
            offline,
            cache_root,
            timeout,
            proxy,
            authorization,
            lock_timeout,
        } => {
            let mut config = CacheConfig::load().context("Failed to load configuration")?;
            if let Some(root) = cache_root {
                config.cache_root = root;
            }
            config.offline |= offline;
            if let Some(secs) = timeout {
                config.set_timeout(secs);
            }
            if let Some(raw) = proxy {
                config.proxy = Some(ProxyConfig::parse(&raw)?);
            }
            if authorization.is_some() {
                config.authorization = authorization;
            }
            if let Some(secs) = lock_timeout {
                config.lock.timeout = Some(Duration::from_secs(secs));
            }
            config.show_progress &= !cli.quiet;

            let request = target.request()?;
            let cache = JdkCache::new(config);
            let acquired = cache
                .acquire(target.provider, &request)
                .with_context(|| format!("Failed to acquire JDK from {}", target.provider))?;

            match &acquired.origin {
                Origin::Downloaded {
                    verification: Verification::Verified(algorithms),
                    file_name,
                } => {
                    let names: Vec<&str> = algorithms.iter().map(|a| a.name()).collect();
                    output::success(&format!("{file_name} verified ({})", names.join(", ")));
                }
                Origin::Downloaded { file_name, .. } => {
                    output::warning(&format!("{file_name} was installed without verification"));
                }
                Origin::Cached | Origin::Local => {}
            }
            println!("{}", acquired.path.display());
        }

        Commands::Key { target } => {
            let request = target.request()?;
            let cache = JdkCache::new(CacheConfig::load().context("Failed to load configuration")?);
            println!("{}", cache.cache_key(target.provider, &request)?);
        }

        Commands::Providers => {
            for id in ProviderId::ALL {
                println!("{id}");
            }
        }
    }

    Ok(())
}
