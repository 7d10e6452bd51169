use crate::harness::{DEFAULT_ITERATIONS, FailurePolicy, GradCheckConfig, SweepConfig};
use clap::Parser;
use std::path::PathBuf;

/// Randomised forward and gradient checks for `mul_mat`
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "mulmat-check")]
#[command(version)]
pub struct Cli {
    /// Number of sweep iterations
    #[arg(env = "MULMAT_NLOOP", default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: usize,

    /// Base seed; iteration i uses seed + i. Random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep sweeping after a failure and report every failing case
    #[arg(long)]
    pub keep_going: bool,

    /// Write Graphviz dumps of the gradient-check graphs into this directory
    #[arg(long, value_name = "DIR")]
    pub dot_dir: Option<PathBuf>,

    /// Debug logging (operand matrices, graph sizes)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            iterations: self.iterations,
            seed: self.seed,
            policy: if self.keep_going {
                FailurePolicy::Aggregate
            } else {
                FailurePolicy::FailFast
            },
            gradcheck: GradCheckConfig {
                dot_dir: self.dot_dir.clone(),
                ..GradCheckConfig::default()
            },
            ..SweepConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mulmat-check"]).unwrap();
        // MULMAT_NLOOP may be set in the environment running the tests
        if std::env::var_os("MULMAT_NLOOP").is_none() {
            assert_eq!(cli.iterations, 500);
        }
        let config = cli.sweep_config();
        assert_eq!(config.policy, FailurePolicy::FailFast);
        assert_eq!(config.seed, None);
        assert_eq!(config.gradcheck, GradCheckConfig::default());
    }

    #[test]
    fn test_positional_and_flags() {
        let cli = Cli::try_parse_from([
            "mulmat-check",
            "25",
            "--seed",
            "1234",
            "--keep-going",
            "--dot-dir",
            "/tmp/graphs",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.iterations, 25);
        assert!(cli.verbose);
        let config = cli.sweep_config();
        assert_eq!(config.iterations, 25);
        assert_eq!(config.seed, Some(1234));
        assert_eq!(config.policy, FailurePolicy::Aggregate);
        assert_eq!(config.gradcheck.dot_dir, Some(PathBuf::from("/tmp/graphs")));
        assert_eq!(config.max_grad_dims, 2);
    }

    #[test]
    fn test_rejects_non_numeric_count() {
        assert!(Cli::try_parse_from(["mulmat-check", "many"]).is_err());
    }
}
