use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::poller::RefreshOptions;
use crate::source::DatasetCommand;

/// Per-host network speed monitor.
#[derive(Debug, Clone, Parser)]
#[command(name = "speedmon", version, about)]
pub struct Config {
    /// Stats command, invoked as `<cmd> <ipv4|ipv6> json`
    #[arg(long, env = "SPEEDMON_STATS_CMD", default_value = "/usr/bin/aw-bpfctl")]
    pub stats_cmd: PathBuf,

    /// Poll interval in seconds
    #[arg(long, env = "SPEEDMON_INTERVAL", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// OUI vendor table (flat JSON array of prefix, bits, vendor)
    #[arg(long, env = "SPEEDMON_OUI_DB")]
    pub oui_db: Option<PathBuf>,

    /// dnsmasq lease file used for host names
    #[arg(long, env = "SPEEDMON_LEASES", default_value = "/tmp/dhcp.leases")]
    pub leases: PathBuf,

    /// Command printing the per-connection traffic dataset as JSON
    #[arg(long, env = "SPEEDMON_DATASET_CMD")]
    pub dataset_cmd: Option<PathBuf>,

    /// Arguments for the dataset command
    #[arg(
        long,
        env = "SPEEDMON_DATASET_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true,
        default_value = "-c json -g mac,ip,layer7"
    )]
    pub dataset_args: Vec<String>,

    /// Serve the JSON API on this address
    #[arg(long, env = "SPEEDMON_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Skip reverse DNS lookups of host addresses
    #[arg(long, env = "SPEEDMON_NO_RESOLVE")]
    pub no_resolve: bool,

    /// Do not print the panel after every poll
    #[arg(short, long, env = "SPEEDMON_QUIET")]
    pub quiet: bool,
}

impl Config {
    /// Reads `.env` (if any), then the environment and command line.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::parse()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn refresh_options(&self) -> RefreshOptions {
        RefreshOptions {
            leases: Some(self.leases.clone()),
            dataset: self
                .dataset_cmd
                .as_ref()
                .map(|cmd| DatasetCommand::new(cmd, self.dataset_args.clone())),
            resolve: !self.no_resolve,
            ..RefreshOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_router_layout() {
        let config = Config::try_parse_from(["speedmon"]).unwrap();
        assert_eq!(config.stats_cmd, PathBuf::from("/usr/bin/aw-bpfctl"));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.dataset_args, ["-c", "json", "-g", "mac,ip,layer7"]);
        assert!(config.listen.is_none());

        let refresh = config.refresh_options();
        assert!(refresh.resolve);
        assert!(refresh.dataset.is_none());
    }

    #[test]
    fn parses_overrides() {
        let config = Config::try_parse_from([
            "speedmon",
            "--interval",
            "2",
            "--listen",
            "127.0.0.1:8080",
            "--dataset-cmd",
            "/usr/sbin/nlbw",
            "--no-resolve",
            "-q",
        ])
        .unwrap();
        assert_eq!(config.interval, 2);
        assert_eq!(config.listen, Some("127.0.0.1:8080".parse().unwrap()));
        assert!(config.quiet);

        let refresh = config.refresh_options();
        assert!(!refresh.resolve);
        assert!(refresh.dataset.is_some());
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(Config::try_parse_from(["speedmon", "--interval", "0"]).is_err());
    }
}
