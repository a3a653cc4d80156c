//! qanalysis CLI: queue analysis and capacity sizing for batched inference
//! servers.

mod commands;
mod output;

use clap::Parser;
use qanalysis_core::CompositionPolicy;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Queueing analysis for batched LLM inference servers
#[derive(Parser, Debug)]
#[command(name = "qanalysis", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Maximum batch size (N)
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Maximum queue length
    #[arg(long, global = true)]
    queue_size: Option<usize>,

    /// Average number of input tokens per request
    #[arg(long, global = true)]
    input_tokens: Option<u32>,

    /// Average number of output tokens per request
    #[arg(long, global = true)]
    output_tokens: Option<u32>,

    /// Service time composition
    #[arg(long, global = true, value_enum)]
    policy: Option<PolicyArg>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    PrefillDecode,
    DecodeOnly,
}

impl From<PolicyArg> for CompositionPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::PrefillDecode => CompositionPolicy::PrefillDecode,
            PolicyArg::DecodeOnly => CompositionPolicy::DecodeOnly,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Queue performance at a given request rate
    Analyze {
        /// Request rate (requests/sec)
        #[arg(short, long)]
        rate: f64,
    },
    /// Largest request rate meeting the given targets
    Size {
        /// Target time to first token (msec)
        #[arg(long)]
        ttft: Option<f64>,
        /// Target inter-token latency (msec)
        #[arg(long)]
        itl: Option<f64>,
        /// Target output tokens per second
        #[arg(long)]
        tps: Option<f64>,
    },
    /// Performance over a range of request rates
    Sweep {
        /// First rate (requests/sec)
        #[arg(long, default_value = "1")]
        from: f64,
        /// Last rate (requests/sec); defaults to the maximum rate
        #[arg(long)]
        to: Option<f64>,
        /// Rate increment (requests/sec)
        #[arg(long, default_value = "1")]
        step: f64,
    },
    /// Largest request rate meeting a wait target across batch sizes and
    /// output token counts
    Capacity {
        /// Maximum batch sizes to try
        #[arg(long, value_delimiter = ',', default_value = "32,64,128,256")]
        batch_sizes: Vec<usize>,
        /// Average output token counts to try
        #[arg(long, value_delimiter = ',', default_value = "128,256,512,1024")]
        tokens: Vec<u32>,
        /// Target average queueing time (sec)
        #[arg(long, default_value = "1.0")]
        wait: f64,
    },
    /// Classic M/M/1/K queue
    Mm1k {
        /// Arrival rate
        #[arg(long)]
        lambda: f64,
        /// Service rate
        #[arg(long)]
        mu: f64,
        /// System capacity (K)
        #[arg(long, default_value = "10")]
        capacity: usize,
    },
    /// Run the HTTP analysis server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the user config file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("io", "llm-inferno", "qanalysis")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "qanalysis.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let config = commands::resolve_config(&cli)?;
    commands::handle_command(cli.command, config, cli.json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_size_with_globals() {
        let cli = Cli::try_parse_from([
            "qanalysis",
            "size",
            "--itl",
            "14",
            "--tps",
            "10240",
            "--batch-size",
            "64",
            "--policy",
            "decode-only",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.batch_size, Some(64));
        assert_eq!(cli.policy, Some(PolicyArg::DecodeOnly));
        match cli.command {
            Commands::Size { ttft, itl, tps } => {
                assert_eq!(ttft, None);
                assert_eq!(itl, Some(14.0));
                assert_eq!(tps, Some(10240.0));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_analyze_requires_rate() {
        assert!(Cli::try_parse_from(["qanalysis", "analyze"]).is_err());
        assert!(Cli::try_parse_from(["qanalysis", "analyze", "--rate", "25"]).is_ok());
    }

    #[test]
    fn test_parse_capacity_lists() {
        let cli = Cli::try_parse_from([
            "qanalysis",
            "capacity",
            "--batch-sizes",
            "16,64",
            "--wait",
            "0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Capacity {
                batch_sizes,
                tokens,
                wait,
            } => {
                assert_eq!(batch_sizes, vec![16, 64]);
                assert_eq!(tokens, vec![128, 256, 512, 1024]);
                assert_eq!(wait, 0.5);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["qanalysis", "-vv", "config", "show"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }
}
