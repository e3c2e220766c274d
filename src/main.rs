//! Binary entry point for the `snapshooter` CLI.

use std::io;
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use snapshooter::{
    ConfigError, GcloudConfig, GcloudGateway, PassReport, PolicyConfig, PolicyError, RunMode,
    SnapshotController,
};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version go to stdout and succeed; usage errors exit 1.
            err.print().ok();
            process::exit(i32::from(err.use_stderr()));
        }
    };
    init_tracing(cli.verbose);

    let code = match execute(&cli).await {
        Ok(report) => exit_code(&report, cli.strict),
        Err(err) => {
            error!(error = %err, "snapshot pass aborted");
            1
        }
    };

    process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

async fn execute(cli: &Cli) -> Result<PassReport, CliError> {
    let config = PolicyConfig::load_without_cli_args()?;
    let settings = config.settings()?;
    let gcloud = GcloudConfig::new(&config.gcloud_bin, &cli.project, &cli.zone)?;
    let project = gcloud.project.clone();
    let zone = gcloud.zone.clone();
    let mode = RunMode {
        fire_and_forget: cli.fire_and_forget,
        dry_run: cli.dry_run,
    };

    let controller = SnapshotController::new(
        GcloudGateway::with_process_runner(gcloud),
        project,
        zone,
        settings,
        mode,
    );
    Ok(controller.run_pass().await?)
}

/// A finished pass exits 0 unless `strict` is set and a disk failed.
fn exit_code(report: &PassReport, strict: bool) -> i32 {
    let failed = report.has_failures();
    if failed && strict {
        warn!(failures = report.failures(), "strict mode: failing because of disk failures");
    }
    i32::from(failed && strict)
}
