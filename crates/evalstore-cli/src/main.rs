use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::args::Cli;
use cli::commands::{dispatch, exit_codes, resolve_config};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let cfg = match resolve_config(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };
    init_logging(&cfg.log_level);

    let code = match dispatch(cli, &cfg) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(event = "evalstore.cli.failed", error = %format!("{e:#}"));
            eprintln!("fatal: {e:?}");
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}
