mod cli;

use tracing_subscriber::{fmt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();
    let command_line_interface = cli::CommandLineInterface::load();
    command_line_interface.run()
}
