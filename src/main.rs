use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use relay::config::{Config, Mode};
use relay::server::{PingResponder, Server};
use relay::Runtime;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cooperative JSON-RPC transport server (WebSocket, SSE, stdio)", long_about = None)]
struct Cli {
    /// Transports to enable, comma separated: stdio, socket
    #[arg(long, value_delimiter = ',')]
    modes: Option<Vec<Mode>>,

    /// TCP port for the socket transport
    #[arg(long)]
    port: Option<u16>,

    /// Interface address for the socket transport
    #[arg(long)]
    host: Option<String>,

    /// TOML config file; flags take precedence over its values
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> relay::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_path(path)?,
            None => Config::default(),
        };

        if let Some(modes) = &self.modes {
            config.server.modes = modes.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    // stdout belongs to the stdio transport.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> relay::Result<()> {
    let config = cli.load_config()?;
    let modes = config.server.modes.clone();

    if modes.is_empty() {
        log::warn!("no transport enabled, exiting");
        return Ok(());
    }

    let runtime = Runtime::with_config(config.runtime_config());
    let server = Server::new(&runtime.handle(), config, PingResponder);

    let _acceptor = match modes.contains(&Mode::Socket) {
        true => Some(server.listen()?),
        false => None,
    };

    if modes.contains(&Mode::Stdio) {
        server.serve_stdio()?;
    }

    runtime.run()
}
