//! tcplp-bench: point-to-point TCP goodput benchmark
//!
//! One process runs as listener, the other as connector:
//! - The listener binds the application port and accepts one peer
//! - The connector streams a requested number of bytes in fixed-size chunks
//! - A size handshake and a final byte-count acknowledgement bracket the
//!   timed transfer, so both ends verify the count
//!
//! Features:
//! - Interactive console (`init`, `listen`/`connect`, `benchmark_*`, `quit`)
//! - Unattended runs with `--auto`
//! - Configuration via CLI arguments or TOML file

mod buffer;
mod config;
mod error;
mod protocol;
mod role;
mod session;
mod shell;
mod transport;

use config::Config;
use session::Session;
use shell::Shell;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        role = %config.role,
        bind = %config.bind,
        peer = %config.peer,
        backlog = config.backlog,
        buffer_size = ?config.buffer_size,
        "Starting tcplp-bench"
    );

    let session = Session::new(config.role, config.endpoints());
    let mut shell = Shell::new(session, config.buffer_size, config.total_bytes);

    if config.auto {
        let report = shell.run_auto()?;
        println!("{report}");
        return Ok(());
    }

    println!("{}", shell::help(config.role));
    let stdin = std::io::stdin();
    shell.run(stdin.lock(), std::io::stdout())?;

    info!(state = %shell.session().state(), "Console closed");
    Ok(())
}
