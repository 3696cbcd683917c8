use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rtp", author, version, about = "Random tone pitch task")]
pub struct Cli {
    /// Root of the per-subject data directories
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run (or resume) a session
    Run(RunArgs),
    /// Write data.csv and config.csv for a persisted session
    Export(ExportArgs),
    /// Button and sync line check without stimuli
    Adhoc(AdhocArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Subject ID (defaults to a timestamp)
    #[arg(long)]
    pub subject: Option<String>,

    /// Session number (defaults to the next unused one)
    #[arg(long)]
    pub session: Option<u32>,

    /// Path to task config TOML
    #[arg(long, default_value = "rtp.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Seed for trial order and stimuli
    #[arg(long)]
    pub seed: Option<u64>,

    /// Probability that the simulated participant withholds a response
    #[arg(long, default_value_t = 0.1, value_parser = probability)]
    pub miss_rate: f64,

    /// Wait for ENTER before each block
    #[arg(long, default_value_t = false)]
    pub wait_blocks: bool,

    /// Run on a virtual clock instead of wall time
    #[arg(long, default_value_t = false)]
    pub virtual_clock: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(long)]
    pub subject: String,

    #[arg(long)]
    pub session: u32,
}

#[derive(Args, Debug, Clone)]
pub struct AdhocArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Number of presses to record
    #[arg(long, default_value_t = 10)]
    pub trials: usize,

    #[arg(long, default_value_t = false)]
    pub virtual_clock: bool,
}

fn probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{s} is not a probability in [0, 1]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::parse_from(["rtp", "run", "--subject", "s01"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.session.subject.as_deref(), Some("s01"));
        assert_eq!(args.session.session, None);
        assert_eq!(args.session.config, PathBuf::from("rtp.toml"));
        assert!(!args.virtual_clock);
        assert_eq!(cli.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn miss_rate_must_be_a_probability() {
        for bad in ["NaN", "inf", "-0.1", "1.5", "often"] {
            assert!(
                Cli::try_parse_from(["rtp", "run", "--miss-rate", bad]).is_err(),
                "{bad} accepted"
            );
        }
        let cli = Cli::try_parse_from(["rtp", "run", "--miss-rate", "0.25"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.miss_rate, 0.25);
    }

    #[test]
    fn export_requires_session() {
        assert!(Cli::try_parse_from(["rtp", "export", "--subject", "s01"]).is_err());
        let cli = Cli::try_parse_from([
            "rtp", "--data-dir", "/tmp/x", "export", "--subject", "s01", "--session", "2",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Export(ExportArgs { session: 2, .. })));
    }
}
