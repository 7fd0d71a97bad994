//! Command line interface for the `wirehttp` demo server.
//!
//! Shared with `build.rs`, which renders the man page from it.

use std::{net::SocketAddr, time::Duration};

use clap::Parser;

/// Command line arguments for the `wirehttp` binary.
#[derive(Debug, Parser)]
#[command(name = "wirehttp", version, about = "Demo users API served by wirehttp")]
pub struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,

    /// Maximum number of connections served at once.
    #[arg(short, long, default_value_t = 5000)]
    pub workers: usize,

    /// Per-request read deadline in seconds.
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    pub read_timeout: u64,

    /// Per-response write deadline in seconds.
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    pub write_timeout: u64,

    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Read deadline as a [`Duration`].
    #[must_use]
    pub fn read_timeout(&self) -> Duration { Duration::from_secs(self.read_timeout) }

    /// Write deadline as a [`Duration`].
    #[must_use]
    pub fn write_timeout(&self) -> Duration { Duration::from_secs(self.write_timeout) }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn defaults_apply() {
        let cli = Cli::parse_from(["wirehttp"]);
        assert_eq!(cli.addr, "127.0.0.1:8080".parse().expect("addr"));
        assert_eq!(cli.workers, 5000);
        assert_eq!(cli.read_timeout().as_secs(), 10);
        assert!(cli.metrics_addr.is_none());
    }

    #[test]
    fn parses_options() {
        let cli = Cli::parse_from([
            "wirehttp",
            "--addr",
            "0.0.0.0:9000",
            "--workers",
            "16",
            "--write-timeout",
            "3",
            "--metrics-addr",
            "127.0.0.1:9100",
        ]);
        assert_eq!(cli.addr.port(), 9000);
        assert_eq!(cli.workers, 16);
        assert_eq!(cli.write_timeout().as_secs(), 3);
        assert_eq!(cli.metrics_addr.map(|addr| addr.port()), Some(9100));
    }
}
