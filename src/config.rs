//! Command-line configuration (spec.md §5 "CLI"), grounded on
//! `original_source/fuzz.py`'s `getopt`-based options and
//! `original_source/fuzz-proprietary-avps.py`'s `argparse` options, carried
//! over to `clap`'s derive API the way the rest of this crate favors
//! declarative, typed parsing over hand-rolled option loops.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Connect to a target once and drive the scenario as the initiating peer.
    Client,
    /// Like `Client`, but reconnect and rerun indefinitely instead of
    /// stopping after one run (`original_source/unit.py`'s `clientloop`).
    Clientloop,
    /// Listen for a target to connect in and drive the scenario as the answering peer.
    Server,
}

#[derive(Debug, Parser)]
#[command(name = "diafuzzer", about = "Diameter protocol mutation fuzzer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Top-level `.dia` files to load message and AVP definitions from.
    #[arg(short = 'd', long = "dictionary", global = true, required = true)]
    pub dictionaries: Vec<PathBuf>,

    /// Additional directories to search for `@inherits`-ed dictionary
    /// modules, in search order.
    #[arg(long = "dictionary-path", global = true)]
    pub dictionary_path: Vec<PathBuf>,

    /// Local address(es) for SCTP multihoming bind. Accepted and validated
    /// for interface parity with the wider tool family; the transport used
    /// here is plain TCP, so these are parsed but otherwise unused until an
    /// SCTP transport is wired in (out of scope, spec.md §1).
    #[arg(long = "local-address", global = true)]
    pub local_address: Vec<std::net::IpAddr>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture one run of a scenario, then replay it once per generated
    /// mutation (spec.md §4.4 "Mutation engine"; `original_source/fuzz.py`).
    Fuzz(FuzzArgs),
    /// Sweep a range of proprietary AVP codes against a captured scenario
    /// (spec.md §4.4 "Proprietary AVP sweep";
    /// `original_source/fuzz-proprietary-avps.py`).
    Scan(ScanArgs),
}

#[derive(Debug, Parser)]
pub struct FuzzArgs {
    /// Name of a built-in scenario (see `mutator::scenarios::by_name`)
    /// describing the message exchange to fuzz.
    #[arg(short = 's', long = "scenario")]
    pub scenario: String,

    #[arg(short = 'm', long = "mode", value_enum)]
    pub mode: Mode,

    /// Diameter-Identity this fuzzer answers as in DWA/CER exchanges.
    #[arg(short = 'H', long = "local-hostname")]
    pub local_hostname: String,

    #[arg(short = 'R', long = "local-realm")]
    pub local_realm: String,

    /// `host:port` of the target (client mode) or local bind address (server mode).
    pub target: String,
}

#[derive(Debug, Parser)]
pub struct ScanArgs {
    /// Name of a built-in scenario (see `mutator::scenarios::by_name`).
    pub scenario: String,

    /// Target's IP address (client mode) or bind address (server mode).
    pub target: String,

    #[arg(short = 'p', long = "port", default_value_t = 3868)]
    pub port: u16,

    #[arg(short = 'm', long = "mode", value_enum, default_value_t = Mode::Client)]
    pub mode: Mode,

    #[arg(long = "min", default_value_t = 0)]
    pub min: u32,

    #[arg(long = "max", default_value_t = 1 << 24)]
    pub max: u32,

    #[arg(long = "vendor", default_value_t = 0)]
    pub vendor: u32,
}

impl FuzzArgs {
    pub fn host_port(&self) -> crate::error::Result<(String, u16)> {
        split_host_port(&self.target)
    }
}

fn split_host_port(target: &str) -> crate::error::Result<(String, u16)> {
    let (host, port) = target.rsplit_once(':').ok_or_else(|| -> crate::error::Error {
        crate::error::ScenarioError::RecvMismatch(format!("not a host:port pair: {target:?}")).into()
    })?;
    let port: u16 = port.parse().map_err(|_| -> crate::error::Error {
        crate::error::ScenarioError::RecvMismatch(format!("invalid port in {target:?}")).into()
    })?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_port() {
        let (host, port) = split_host_port("example.test:3868").unwrap();
        assert_eq!(host, "example.test");
        assert_eq!(port, 3868);
    }

    #[test]
    fn rejects_missing_port() {
        assert!(split_host_port("example.test").is_err());
    }
}
