use clap::Parser;
use mulmat_check::config::Cli;
use mulmat_check::logging::init_tracing;
use mulmat_check::run_sweep;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.verbose) {
        eprintln!("mulmat-check: {err}");
        return ExitCode::FAILURE;
    }

    let config = cli.sweep_config();
    match run_sweep(&config) {
        Ok(report) => {
            info!(
                base_seed = report.base_seed,
                cases_run = report.cases_run,
                cases_passed = report.cases_passed,
                gradient_checks = report.gradient_checks,
                elements_verified = report.elements_verified,
                "sweep finished"
            );
            for failure in &report.failures {
                error!(
                    iteration = failure.iteration,
                    seed = failure.seed,
                    variant = %failure.variant,
                    ndims = failure.ndims,
                    "failed: {}",
                    failure.error
                );
            }
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            error!("aborting: {err}");
            ExitCode::FAILURE
        }
    }
}
