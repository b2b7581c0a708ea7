use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use jsonfifo_endpoint::{default_base_directory, Role};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod connect;
pub mod paths;
pub mod provision;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an endpoint: print events, forward stdin lines as JSON messages.
    Connect(ConnectArgs),
    /// Create the pipe directory and both FIFOs for a channel.
    Provision(ProvisionArgs),
    /// Print the in/out FIFO paths a role would use.
    Paths(PathsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Connect(args) => connect::run(args, format),
        Command::Provision(args) => provision::run(args, format),
        Command::Paths(args) => paths::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Host,
    Client,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Host => Role::Host,
            RoleArg::Client => Role::Client,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DirArg {
    /// Directory holding the FIFOs [default: ~/.pipes].
    #[arg(long, value_name = "DIR", env = "JSONFIFO_DIR")]
    pub dir: Option<PathBuf>,
}

impl DirArg {
    pub fn resolve(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_base_directory)
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Which side of the channel to run.
    pub role: RoleArg,
    /// Channel name; the FIFOs are `<name>.in` and `<name>.out`.
    pub name: String,
    #[command(flatten)]
    pub dir: DirArg,
    /// JSON message to send once the endpoint starts.
    #[arg(long, value_name = "JSON")]
    pub send: Option<String>,
    /// Repeat --send at this interval (e.g. 1s, 250ms).
    #[arg(long, value_name = "DURATION", requires = "send")]
    pub every: Option<String>,
    /// Exit after receiving N data messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Do not forward stdin to the peer.
    #[arg(long)]
    pub no_stdin: bool,
    /// Delay between reopen attempts (e.g. 100ms).
    #[arg(long, value_name = "DURATION", default_value = "100ms")]
    pub reopen_delay: String,
}

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Channel name.
    pub name: String,
    #[command(flatten)]
    pub dir: DirArg,
}

#[derive(Args, Debug)]
pub struct PathsArgs {
    /// Role whose view of the channel to print.
    pub role: RoleArg,
    /// Channel name.
    pub name: String,
    #[command(flatten)]
    pub dir: DirArg,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
