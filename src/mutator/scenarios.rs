//! Built-in scenarios selected by name from the CLI binaries.
//!
//! `original_source/scenario.py`'s `load_scenario` `execfile`s a script path
//! to obtain a `run(plug)` function at runtime. Running arbitrary scripts
//! isn't idiomatic here (see [`super::driver::Scenario`]'s doc comment), so
//! the `--scenario` flag instead names one of a small compiled-in registry.

use crate::error::{Result, ScenarioError};
use crate::message::{Avp, Msg};
use crate::mutator::driver::{Scenario, ScenarioTransport};
use async_trait::async_trait;

const CER_CODE: u32 = 257;
const ORIGIN_HOST_CODE: u32 = 264;
const ORIGIN_REALM_CODE: u32 = 296;

/// Sends a Capabilities-Exchange-Request and expects a matching answer.
struct CapabilitiesExchange {
    local_hostname: String,
    local_realm: String,
}

#[async_trait]
impl Scenario for CapabilitiesExchange {
    async fn run(&self, transport: &mut ScenarioTransport) -> Result<()> {
        let mut cer = Msg::new(CER_CODE, 0, true);
        cer.avps.push(Avp::utf8(ORIGIN_HOST_CODE, 0, &self.local_hostname));
        cer.avps.push(Avp::utf8(ORIGIN_REALM_CODE, 0, &self.local_realm));
        transport.send(cer).await?;

        let cea = transport.recv().await?;
        if cea.code != CER_CODE || cea.request {
            return Err(ScenarioError::RecvMismatch(format!(
                "expected a CEA, got code={} request={}",
                cea.code, cea.request
            ))
            .into());
        }
        Ok(())
    }
}

/// Sends a bare Device-Watchdog-Request and expects the peer's answer,
/// bypassing this driver's own auto-answer (which only triggers on DWRs
/// read *from* the peer, not ones the scenario itself sends).
struct Watchdog {
    local_hostname: String,
    local_realm: String,
}

#[async_trait]
impl Scenario for Watchdog {
    async fn run(&self, transport: &mut ScenarioTransport) -> Result<()> {
        let mut dwr = Msg::new(super::driver::DWR_CODE, 0, true);
        dwr.avps.push(Avp::utf8(ORIGIN_HOST_CODE, 0, &self.local_hostname));
        dwr.avps.push(Avp::utf8(ORIGIN_REALM_CODE, 0, &self.local_realm));
        transport.send(dwr).await?;

        let dwa = transport.recv().await?;
        if dwa.code != super::driver::DWR_CODE || dwa.request {
            return Err(ScenarioError::RecvMismatch(format!(
                "expected a DWA, got code={} request={}",
                dwa.code, dwa.request
            ))
            .into());
        }
        Ok(())
    }
}

/// Resolve a `--scenario` name to a built-in [`Scenario`]. `local_hostname`
/// and `local_realm` are threaded through the same way
/// `original_source/scenario.py`'s `load_scenario` injects them as globals.
pub fn by_name(name: &str, local_hostname: &str, local_realm: &str) -> Option<Box<dyn Scenario>> {
    match name {
        "cer" | "capabilities-exchange" => Some(Box::new(CapabilitiesExchange {
            local_hostname: local_hostname.to_string(),
            local_realm: local_realm.to_string(),
        })),
        "dwr" | "watchdog" => Some(Box::new(Watchdog {
            local_hostname: local_hostname.to_string(),
            local_realm: local_realm.to_string(),
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_name_resolves_to_nothing() {
        assert!(by_name("not-a-scenario", "h", "r").is_none());
    }

    #[test]
    fn known_names_resolve() {
        assert!(by_name("cer", "h", "r").is_some());
        assert!(by_name("dwr", "h", "r").is_some());
    }
}
