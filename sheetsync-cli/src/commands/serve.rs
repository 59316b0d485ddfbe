//! `sheetsync serve`: run the daemon in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use sheetsync_daemon::{start_blocking, DaemonConfig};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen port; overrides `PORT`.
    #[arg(long, short = 'p')]
    pub port: Option<u16>,
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let mut config = DaemonConfig::from_env(&home).context("invalid daemon configuration")?;
        if let Some(port) = self.port {
            config.port = port;
        }
        start_blocking(config).context("daemon exited with error")?;
        Ok(())
    }
}
