use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vigil_reporter::{Config, Reporter, ReporterOptions, StopOptions};

#[derive(Parser, Debug)]
#[command(name = "vigil-reporter", version, about)]
struct Cli {
    #[command(flatten)]
    options: ReporterOptions,

    /// Deregister this replica on exit instead of flushing it.
    #[arg(long, env = "VIGIL_REPORTER_DEREGISTER_ON_EXIT", default_value_t = false)]
    deregister_on_exit: bool,

    /// Enable JSON structured logging.
    #[arg(long, env = "VIGIL_REPORTER_JSON_LOGS", default_value_t = false)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = Config::try_from(cli.options.with_hostname_replica())?;
    let reporter = Reporter::new(config)?;

    shutdown_signal().await?;
    info!("shutdown requested");

    let outcome = if cli.deregister_on_exit {
        reporter.destroy().await
    } else {
        let stopped = reporter.stop(StopOptions::flush());
        if !stopped.cancelled {
            warn!("no pending report to cancel");
        }
        stopped.completion.await
    };

    match outcome {
        Ok(()) => info!("reporter ended"),
        Err(e) => error!(error = %e, "final report failed"),
    }

    Ok(())
}
