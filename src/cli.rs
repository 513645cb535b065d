use anyhow::Context;
use clap::{ArgAction, Parser};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ScanConfig;
use crate::output::{self, OutputMode};
use crate::scan_cache::ScanCache;
use crate::scanner::RunContext;
use crate::signatures::SignatureDatabase;

/// Printed when too few positional arguments are given.
pub const USAGE: &str = "Please provide a directory for databases and a cache file path (`null` to disable). All additional paths will be recursed for scanning.";

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "HASHSWEEP_LOG";

/// Cache argument value that disables the scan cache.
const NO_CACHE: &str = "null";

#[derive(Parser, Debug)]
#[command(name = "hashsweep")]
#[command(version)]
#[command(about = "Find files matching known MD5/SHA-1/SHA-256 signature databases")]
#[command(long_about = "Hashsweep walks directory trees, hashes every regular file and reports \
    files whose digests appear in the signature databases.\n\n\
    Examples:\n  \
    hashsweep ./db ./scan.cache /home          # Scan with a persistent cache\n  \
    hashsweep ./db null /srv /opt              # Scan two roots, no cache\n  \
    hashsweep --no-cache-arg ./db /srv         # Every path after the databases is a root\n  \
    hashsweep --json ./db null /srv            # Machine-readable summary")]
pub struct Cli {
    /// Directory holding the hypatia-*-bloom.bin signature files
    #[arg(value_name = "DATABASE_DIR")]
    pub database: PathBuf,

    /// Cache file path (or `null`), followed by the roots to scan
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub args: Vec<String>,

    /// Take no cache argument: every path after DATABASE_DIR is a root
    #[arg(long)]
    pub no_cache_arg: bool,

    /// Increase diagnostic verbosity on stderr (-v, -vv for more)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only print matches and errors
    #[arg(short = 'q', long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Maximum worker threads per pool
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// TOML file with scan tuning options
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Positional arguments resolved into a cache location and scan roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    pub cache: Option<PathBuf>,
    pub roots: Vec<PathBuf>,
}

impl Cli {
    /// Split the trailing positionals. `None` means there are too few.
    pub fn targets(&self) -> Option<Targets> {
        if self.no_cache_arg {
            if self.args.is_empty() {
                return None;
            }
            return Some(Targets {
                cache: None,
                roots: self.args.iter().map(PathBuf::from).collect(),
            });
        }

        let (cache, roots) = self.args.split_first()?;
        if roots.is_empty() {
            return None;
        }
        Some(Targets {
            cache: (cache != NO_CACHE).then(|| PathBuf::from(cache)),
            roots: roots.iter().map(PathBuf::from).collect(),
        })
    }

    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }

    /// Effective tuning: the config file if given, then `--threads`.
    pub fn scan_config(&self) -> anyhow::Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::load(path)
                .with_context(|| format!("Invalid config file {}", path.display()))?,
            None => ScanConfig::default(),
        };
        if let Some(threads) = self.threads {
            config.max_threads = threads;
            config.validate().context("Invalid --threads value")?;
        }
        Ok(config)
    }

    pub fn run(self) -> anyhow::Result<()> {
        init_logging(self.verbose);

        let Some(targets) = self.targets() else {
            println!("{}", USAGE);
            anyhow::bail!("missing required arguments");
        };
        let mode = self.output_mode();
        let config = self.scan_config()?;

        output::print_database_dir(&self.database, mode);
        let database = SignatureDatabase::load(&self.database).with_context(|| {
            if self.database.is_dir() {
                "Failed to load databases"
            } else {
                "Invalid databases directory"
            }
        })?;
        output::print_database_loaded(&database.counts(), mode);

        let cache = match &targets.cache {
            Some(path) => Some(
                ScanCache::load(path, config.cache_capacity, config.cache_fpp)
                    .context("Failed to load cache")?,
            ),
            None => None,
        };
        output::print_cache_status(cache.as_ref(), config.cache_capacity, mode);

        let ctx = RunContext::builder(database)
            .with_config(config)
            .with_cache(cache)
            .with_mode(mode)
            .build()
            .context("Failed to start worker pools")?;

        let summary = ctx.run(&targets.roots);
        tracing::debug!(
            "{} matches, {} tasks ran inline on saturated pools",
            ctx.counters().matches(),
            ctx.counters().inline_tasks()
        );
        output::print_summary(&summary, mode);

        if mode == OutputMode::Normal && ctx.cache().is_some() && summary.files_hashed > 0 {
            println!("Saving to permanent cache");
        }
        let outcome = ctx.persist_cache();
        if mode == OutputMode::Json {
            output::print_json(&summary, &outcome)?;
        }
        output::print_cache_outcome(&outcome, mode);

        Ok(())
    }
}

/// Install the stderr tracing subscriber. `HASHSWEEP_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("hashsweep={}", level)));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal());

    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("hashsweep").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cache_and_roots() {
        let cli = parse(&["db", "scan.cache", "/a", "/b"]);
        let targets = cli.targets().unwrap();
        assert_eq!(cli.database, PathBuf::from("db"));
        assert_eq!(targets.cache, Some(PathBuf::from("scan.cache")));
        assert_eq!(targets.roots, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn test_null_disables_cache() {
        let targets = parse(&["db", "null", "/a"]).targets().unwrap();
        assert_eq!(targets.cache, None);
        assert_eq!(targets.roots, vec![PathBuf::from("/a")]);
    }

    #[test]
    fn test_cache_without_roots_is_too_few() {
        assert!(parse(&["db", "scan.cache"]).targets().is_none());
    }

    #[test]
    fn test_no_cache_arg_mode() {
        let targets = parse(&["--no-cache-arg", "db", "/a", "/b"])
            .targets()
            .unwrap();
        assert_eq!(targets.cache, None);
        assert_eq!(targets.roots.len(), 2);
    }

    #[test]
    fn test_missing_positionals_rejected() {
        assert!(Cli::try_parse_from(["hashsweep", "db"]).is_err());
        assert!(Cli::try_parse_from(["hashsweep"]).is_err());
    }

    #[test]
    fn test_output_mode() {
        assert_eq!(parse(&["db", "null", "/a"]).output_mode(), OutputMode::Normal);
        assert_eq!(parse(&["-q", "db", "null", "/a"]).output_mode(), OutputMode::Quiet);
        assert_eq!(parse(&["--json", "db", "null", "/a"]).output_mode(), OutputMode::Json);
        assert!(Cli::try_parse_from(["hashsweep", "-q", "--json", "db", "null", "/a"]).is_err());
    }

    #[test]
    fn test_threads_override() {
        let config = parse(&["--threads", "3", "db", "null", "/a"])
            .scan_config()
            .unwrap();
        assert_eq!(config.max_threads, 3);
        assert!(parse(&["--threads", "0", "db", "null", "/a"])
            .scan_config()
            .is_err());
    }

    #[test]
    fn test_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("hashsweep.toml");
        std::fs::write(&path, "hashing_queue_depth = 16\n").unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "db", "null", "/a"])
            .scan_config()
            .unwrap();
        assert_eq!(config.hashing_queue_depth, 16);
        assert_eq!(config.traversal_queue_depth, 8);
    }
}
