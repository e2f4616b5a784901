use clap::Parser;
use holdfast::config::{self, HoldfastConfig};
use holdfast::runner::{self, RunPlan};
use holdfast::{Outcome, Shield};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Run a command with SIGINT/SIGTERM deferred until it finishes, then exit
/// with 128 + signal number if one arrived.
#[derive(Parser, Debug)]
#[command(name = "holdfast", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "holdfast.toml")]
    config: PathBuf,

    /// Number of protected runs (overrides config)
    #[arg(long)]
    repeat: Option<u32>,

    /// Unprotected pause between runs in milliseconds (overrides config)
    #[arg(long)]
    pause_ms: Option<u64>,

    /// Keep the child in holdfast's process group
    #[arg(long)]
    no_isolate: bool,

    /// Print resolved settings and exit without running
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (section enter/exit, listener startup)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Command to run, followed by its arguments
    #[arg(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Cli {
    /// Apply CLI overrides on top of the loaded config.
    fn merge_into(&self, mut config: HoldfastConfig) -> HoldfastConfig {
        if let Some(repeat) = self.repeat {
            config.run.repeat = repeat;
        }
        if let Some(pause_ms) = self.pause_ms {
            config.run.pause_ms = pause_ms;
        }
        if self.no_isolate {
            config.run.isolate_process_group = false;
        }
        if self.verbose {
            config.logging.filter = "holdfast=debug".to_string();
        } else if self.quiet {
            config.logging.filter = "holdfast=warn".to_string();
        }
        config
    }

    /// Program and its arguments. clap's `required` guarantees at least one word.
    fn command_line(&self) -> (String, Vec<String>) {
        let mut words = self.command.iter().cloned();
        let program = words.next().unwrap_or_default();
        (program, words.collect())
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("holdfast=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = config::load_config(&cli.config);
    let config = cli.merge_into(loaded.as_ref().cloned().unwrap_or_default());
    init_tracing(&config.logging.filter);

    let config = match loaded {
        Ok(_) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::debug!(?cli, "parsed CLI arguments");

    let (program, args) = cli.command_line();
    let plan = RunPlan::new(program, args, &config.run);

    if cli.dry_run {
        println!("holdfast v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        match toml::to_string(&config) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => tracing::warn!(error = %e, "failed to render config"),
        }
        println!("Command: {} {}", plan.command, plan.args.join(" "));
        println!("Dry run: config validated, not running.");
        return;
    }

    let shield = Shield::new();
    let code = match runner::run_plan(&shield, &plan).await.map(Outcome::or_exit) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            1
        }
    };

    tracing::debug!(code, phase = ?shield.phase(), "holdfast exiting");
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_command_after_double_dash() {
        let cli = parse(&["holdfast", "--", "sh", "-c", "echo hi"]);
        assert_eq!(cli.command, vec!["sh", "-c", "echo hi"]);
        assert_eq!(cli.config, PathBuf::from("holdfast.toml"));
    }

    #[test]
    fn test_command_line_splits_program_from_args() {
        let cli = parse(&["holdfast", "--", "sh", "-c", "echo hi"]);
        assert_eq!(
            cli.command_line(),
            ("sh".to_string(), vec!["-c".to_string(), "echo hi".to_string()])
        );

        let cli = parse(&["holdfast", "--", "true"]);
        assert_eq!(cli.command_line(), ("true".to_string(), vec![]));
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["holdfast"]).is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["holdfast", "-v", "-q", "--", "true"]).is_err());
    }

    #[test]
    fn test_overrides_merge_into_config() {
        let cli = parse(&[
            "holdfast",
            "--repeat",
            "4",
            "--pause-ms",
            "100",
            "--no-isolate",
            "-v",
            "--",
            "true",
        ]);
        let config = cli.merge_into(HoldfastConfig::default());
        assert_eq!(config.run.repeat, 4);
        assert_eq!(config.run.pause_ms, 100);
        assert!(!config.run.isolate_process_group);
        assert_eq!(config.logging.filter, "holdfast=debug");
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let cli = parse(&["holdfast", "--", "true"]);
        let mut base = HoldfastConfig::default();
        base.run.repeat = 9;
        let config = cli.merge_into(base.clone());
        assert_eq!(config, base);
    }

    #[test]
    fn test_quiet_sets_warn_filter() {
        let cli = parse(&["holdfast", "-q", "--", "true"]);
        let config = cli.merge_into(HoldfastConfig::default());
        assert_eq!(config.logging.filter, "holdfast=warn");
    }
}
