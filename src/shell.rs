//! Line-oriented benchmark console.
//!
//! Each command maps onto one session operation:
//!
//! ```text
//! init [buffer_size]
//! listen | connect
//! benchmark_recv | benchmark_send [total_bytes]
//! quit
//! ```
//!
//! plus `status`, `help` and `exit`. Lines may carry a leading `tcp_app`
//! prefix. The console holds no protocol state of its own.

use std::io::{self, BufRead, Write};

use tracing::{error, info};

use crate::error::Result;
use crate::protocol::TransferReport;
use crate::role::Role;
use crate::session::{Session, SessionState};

const PROMPT: &str = "tcp_app> ";

/// Optional command prefix.
const PREFIX: &str = "tcp_app";

/// Parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init(Option<i64>),
    Listen,
    Connect,
    BenchmarkRecv,
    BenchmarkSend(Option<i64>),
    Quit,
    Status,
    Help,
    Exit,
}

/// Parse result.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// Successfully parsed command.
    Complete(Command),
    /// Blank line.
    Empty,
    /// First word is not a command.
    Unknown(String),
    /// Argument is not an integer, or there are too many.
    InvalidArgument(String),
}

/// Parse one console line.
pub fn parse(line: &str) -> ParseResult {
    let mut words = line.split_whitespace().peekable();
    if words.peek() == Some(&PREFIX) {
        words.next();
    }

    let name = match words.next() {
        Some(name) => name,
        None => return ParseResult::Empty,
    };
    let args: Vec<&str> = words.collect();

    let optional_int = |args: &[&str]| -> std::result::Result<Option<i64>, String> {
        match args {
            [] => Ok(None),
            [value] => value
                .parse()
                .map(Some)
                .map_err(|_| format!("'{value}' is not an integer")),
            _ => Err(format!("{name} takes at most one argument")),
        }
    };
    let no_args = |command: Command| -> ParseResult {
        if args.is_empty() {
            ParseResult::Complete(command)
        } else {
            ParseResult::InvalidArgument(format!("{name} takes no arguments"))
        }
    };

    match name {
        "init" => match optional_int(&args) {
            Ok(size) => ParseResult::Complete(Command::Init(size)),
            Err(msg) => ParseResult::InvalidArgument(msg),
        },
        "benchmark_send" => match optional_int(&args) {
            Ok(total) => ParseResult::Complete(Command::BenchmarkSend(total)),
            Err(msg) => ParseResult::InvalidArgument(msg),
        },
        "listen" => no_args(Command::Listen),
        "connect" => no_args(Command::Connect),
        "benchmark_recv" => no_args(Command::BenchmarkRecv),
        "quit" => no_args(Command::Quit),
        "status" => no_args(Command::Status),
        "help" => no_args(Command::Help),
        "exit" => no_args(Command::Exit),
        other => ParseResult::Unknown(other.to_string()),
    }
}

/// Help text for a role.
pub fn help(role: Role) -> String {
    let (connect_help, benchmark_usage, benchmark_help) = match role {
        Role::Listener => (
            "wait for a connection (blocking)",
            role.benchmark_command().to_string(),
            "receive data for benchmark",
        ),
        Role::Connector => (
            "connect to the configured peer",
            format!("{} [bytes]", role.benchmark_command()),
            "send data for benchmark",
        ),
    };

    let entries = [
        ("init [buffer_size]".to_string(), "initialize session"),
        (role.connect_command().to_string(), connect_help),
        (benchmark_usage, benchmark_help),
        ("quit".to_string(), "close session"),
        ("status".to_string(), "show session state"),
        ("exit".to_string(), "leave the console"),
    ];
    entries
        .iter()
        .map(|(usage, text)| format!("{usage:<24}{text}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Console bound to one session.
pub struct Shell {
    session: Session,
    /// Used by `init` without an argument.
    default_buffer_size: Option<i64>,
    /// Used by `--auto` runs.
    default_total_bytes: Option<i64>,
}

impl Shell {
    pub fn new(
        session: Session,
        default_buffer_size: Option<i64>,
        default_total_bytes: Option<i64>,
    ) -> Self {
        Self {
            session,
            default_buffer_size,
            default_total_bytes,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Execute one command and describe the outcome.
    ///
    /// `Exit` is the caller's business and yields an empty string.
    pub fn execute(&mut self, command: &Command) -> Result<String> {
        match *command {
            Command::Init(size) => {
                let outcome = self.session.init(size.or(self.default_buffer_size))?;
                let mut msg = format!("session initialized (buffer size {})", outcome.buffer_size);
                if outcome.clamped {
                    msg.push_str(", requested size clamped");
                }
                Ok(msg)
            }
            Command::Listen => match self.session.listen()? {
                Some(peer) => Ok(format!("accepted connection from {peer}")),
                None => Ok("accepted connection".to_string()),
            },
            Command::Connect => {
                let peer = self.session.connect()?;
                Ok(format!("connected to {peer}"))
            }
            Command::BenchmarkRecv => Ok(self.session.benchmark_recv()?.to_string()),
            Command::BenchmarkSend(total) => Ok(self.session.benchmark_send(total)?.to_string()),
            Command::Quit => {
                self.session.quit()?;
                Ok("session closed".to_string())
            }
            Command::Status => Ok(format!(
                "role {}, state {}, buffer size {}",
                self.session.role(),
                self.session.state(),
                self.session.buffer_size()
            )),
            Command::Help => Ok(help(self.session.role())),
            Command::Exit => Ok(String::new()),
        }
    }

    /// Read commands from `input` until `exit` or end of input.
    ///
    /// Command failures are printed and the loop continues; only I/O errors
    /// on the console itself end it early. A live session is closed on the
    /// way out.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        let mut lines = input.lines();
        loop {
            write!(output, "{PROMPT}")?;
            output.flush()?;

            let line = match lines.next() {
                Some(line) => line?,
                None => break,
            };

            let command = match parse(&line) {
                ParseResult::Complete(Command::Exit) => break,
                ParseResult::Complete(command) => command,
                ParseResult::Empty => continue,
                ParseResult::Unknown(name) => {
                    writeln!(output, "unknown command '{name}', try 'help'")?;
                    continue;
                }
                ParseResult::InvalidArgument(msg) => {
                    writeln!(output, "error: {msg}")?;
                    continue;
                }
            };

            match self.execute(&command) {
                Ok(msg) => writeln!(output, "{msg}")?,
                Err(e) => {
                    error!(command = ?command, error = %e, "Command failed");
                    writeln!(output, "error: {e}")?;
                }
            }
        }

        self.close();
        Ok(())
    }

    /// Run the whole sequence unattended: init, connect or listen, one
    /// benchmark, quit. Stops at the first failure.
    pub fn run_auto(&mut self) -> Result<TransferReport> {
        let role = self.session.role();
        info!(role = %role, "Running unattended benchmark");

        self.execute(&Command::Init(None))?;
        let result = self.connect_and_run(role);
        self.close();
        result
    }

    fn connect_and_run(&mut self, role: Role) -> Result<TransferReport> {
        match role {
            Role::Listener => {
                self.session.listen()?;
                self.session.benchmark_recv()
            }
            Role::Connector => {
                self.session.connect()?;
                self.session.benchmark_send(self.default_total_bytes)
            }
        }
    }

    fn close(&mut self) {
        if self.session.state() != SessionState::Uninitialized {
            if let Err(e) = self.session.quit() {
                error!(error = %e, "Failed to close session");
            }
        }
    }
}
