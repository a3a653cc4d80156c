//! CLI subcommand handlers.

use anyhow::{Context, bail};
use qanalysis_core::config::user_config_path;
use qanalysis_core::{
    AppConfig, BirthDeathModel, Indicator, QueueAnalyzer, TargetMetric, TargetPerf, load_config,
};
use serde::Serialize;

use crate::output;
use crate::{Cli, Commands, ConfigAction};

/// Effective configuration: layered sources, then command-line flags.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    if let Some(path) = &cli.config {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
    }
    let mut config = load_config(cli.config.as_deref(), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    apply_overrides(cli, &mut config);
    Ok(config)
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(n) = cli.batch_size {
        config.queue.max_batch_size = n;
    }
    if let Some(q) = cli.queue_size {
        config.queue.max_queue_size = q;
    }
    if let Some(i) = cli.input_tokens {
        config.request.avg_input_tokens = i;
    }
    if let Some(o) = cli.output_tokens {
        config.request.avg_output_tokens = o;
    }
    if let Some(policy) = cli.policy {
        config.queue.policy = policy.into();
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, config: AppConfig, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Analyze { rate } => handle_analyze(&config, rate, json),
        Commands::Size { ttft, itl, tps } => {
            let targets = merge_targets(&config.targets, TargetPerf { ttft, itl, tps });
            handle_size(&config, &targets, json)
        }
        Commands::Sweep { from, to, step } => handle_sweep(&config, from, to, step, json),
        Commands::Capacity {
            batch_sizes,
            tokens,
            wait,
        } => handle_capacity(&config, &batch_sizes, &tokens, wait, json),
        Commands::Mm1k {
            lambda,
            mu,
            capacity,
        } => handle_mm1k(lambda, mu, capacity, json),
        Commands::Serve { host, port } => handle_serve(config, host, port).await,
        Commands::Config { action } => handle_config(&config, action),
    }
}

fn analyzer(config: &AppConfig) -> anyhow::Result<QueueAnalyzer> {
    QueueAnalyzer::new(config.queue.clone(), config.request).context("Invalid queue configuration")
}

fn handle_analyze(config: &AppConfig, rate: f64, json: bool) -> anyhow::Result<()> {
    let analyzer = analyzer(config)?;
    let metrics = analyzer
        .analyze(rate)
        .with_context(|| format!("Analysis failed at {} req/s", rate))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        print!("{}", output::metrics_table(&metrics));
    }
    Ok(())
}

/// Command-line targets replace configured ones metric by metric.
fn merge_targets(configured: &TargetPerf, given: TargetPerf) -> TargetPerf {
    TargetPerf {
        ttft: given.ttft.or(configured.ttft),
        itl: given.itl.or(configured.itl),
        tps: given.tps.or(configured.tps),
    }
}

fn handle_size(config: &AppConfig, targets: &TargetPerf, json: bool) -> anyhow::Result<()> {
    let analyzer = analyzer(config)?;
    let sized = analyzer.size(targets).context("Sizing failed")?;
    tracing::info!(rate = sized.rate, binding = %sized.binding, "sized");
    if json {
        println!("{}", serde_json::to_string_pretty(&sized)?);
    } else {
        print!("{}", output::sizing_table(&sized));
    }
    Ok(())
}

/// Rates `from, from + step, ...` up to and including `to`.
fn sweep_rates(from: f64, to: f64, step: f64) -> anyhow::Result<Vec<f64>> {
    if !(step.is_finite() && step > 0.0) {
        bail!("Sweep step must be positive, got {}", step);
    }
    if !(from.is_finite() && from > 0.0) || to < from {
        bail!("Invalid sweep range [{}, {}]", from, to);
    }
    let count = ((to - from) / step + 1e-9).floor() as usize + 1;
    Ok((0..count).map(|i| from + i as f64 * step).collect())
}

fn handle_sweep(
    config: &AppConfig,
    from: f64,
    to: Option<f64>,
    step: f64,
    json: bool,
) -> anyhow::Result<()> {
    let analyzer = analyzer(config)?;
    let to = to.unwrap_or(analyzer.rate_range().max);
    let points = analyzer.sweep(sweep_rates(from, to, step)?)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else {
        print!("{}", output::sweep_table(&points));
    }
    Ok(())
}

/// Wait-limited rate for one batch size and output token count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapacityPoint {
    pub max_batch_size: usize,
    pub avg_output_tokens: u32,
    /// Requests/sec, `None` when the wait target cannot be met.
    pub rate: Option<f64>,
    pub indicator: Indicator,
}

fn capacity_grid(
    config: &AppConfig,
    batch_sizes: &[usize],
    tokens: &[u32],
    wait_secs: f64,
) -> anyhow::Result<Vec<CapacityPoint>> {
    if !(wait_secs.is_finite() && wait_secs > 0.0) {
        bail!("Wait target must be positive, got {}", wait_secs);
    }
    let mut points = Vec::with_capacity(batch_sizes.len() * tokens.len());
    for &max_batch_size in batch_sizes {
        for &avg_output_tokens in tokens {
            let mut cfg = config.clone();
            cfg.queue.max_batch_size = max_batch_size;
            cfg.request.avg_output_tokens = avg_output_tokens;
            let found = analyzer(&cfg)?
                .rate_for_target(TargetMetric::WaitTime, wait_secs * 1000.0)
                .with_context(|| {
                    format!(
                        "Search failed for batch size {} and {} tokens",
                        max_batch_size, avg_output_tokens
                    )
                })?;
            points.push(CapacityPoint {
                max_batch_size,
                avg_output_tokens,
                rate: found.rate,
                indicator: found.indicator,
            });
        }
    }
    Ok(points)
}

fn handle_capacity(
    config: &AppConfig,
    batch_sizes: &[usize],
    tokens: &[u32],
    wait_secs: f64,
    json: bool,
) -> anyhow::Result<()> {
    let points = capacity_grid(config, batch_sizes, tokens, wait_secs)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else {
        print!("{}", output::capacity_table(&points));
    }
    Ok(())
}

fn handle_mm1k(lambda: f64, mu: f64, capacity: usize, json: bool) -> anyhow::Result<()> {
    let mut model = BirthDeathModel::mm1k(capacity, mu).context("Invalid M/M/1/K parameters")?;
    model.solve(lambda, 1);
    let stats = model.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", model);
    }
    Ok(())
}

async fn handle_serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    // Fail fast on a bad default configuration.
    analyzer(&config)?;
    qanalysis_server::run(&config.server, config.queue)
        .await
        .context("Server error")
}

fn handle_config(config: &AppConfig, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigAction::Path => match user_config_path() {
            Some(path) => println!("{}", path.display()),
            None => bail!("No home directory found"),
        },
    }
    Ok(())
}
