//! Shared driving logic for the `dia-client`/`dia-server` binaries, grounded
//! on `original_source/fuzz.py`'s `__main__` block: capture one run of a
//! scenario, tag it, enumerate mutations, then replay once per mutation,
//! reporting pass/fail the same way.

use crate::config::{Cli, Command, FuzzArgs, Mode, ScanArgs};
use crate::dictionary::Directory;
use crate::error::{Result, ScenarioError};
use crate::mutator::driver::ReplayOutcome;
use crate::mutator::{self, scenarios, Scenario};
use crate::tagger;
use tokio::net::{TcpListener, TcpStream};

const DIRECTORY_CACHE_FILE: &str = ".diafuzzer-dictionary-cache.bin";

pub fn load_directory(cli: &Cli) -> Result<Directory> {
    let (directory, fresh) = Directory::load_cached(
        &cli.dictionaries,
        cli.dictionary_path.clone(),
        std::path::Path::new(DIRECTORY_CACHE_FILE),
    )?;
    log::debug!("dictionary cache was {}", if fresh { "fresh" } else { "stale or absent" });

    if !cli.local_address.is_empty() {
        log::debug!(
            "--local-address {:?} accepted but unused: no SCTP transport is wired in",
            cli.local_address
        );
    }

    Ok(directory)
}

fn resolve_scenario(name: &str, local_hostname: &str, local_realm: &str) -> Result<Box<dyn Scenario>> {
    scenarios::by_name(name, local_hostname, local_realm).ok_or_else(|| -> crate::error::Error {
        ScenarioError::RecvMismatch(format!("unknown scenario {name:?}")).into()
    })
}

fn report_outcome(label: &str, outcome: &ReplayOutcome) {
    match &outcome.exc_info {
        Some(e) => log::warn!("{label}: raised {e}"),
        None => log::info!("{label}: ok ({} messages exchanged)", outcome.messages.len()),
    }
}

/// Run one capture pass, tag it, then replay once per enumerated mutation
/// descriptor against fresh connections opened by `connect`.
async fn run_fuzz<F, Fut>(args: &FuzzArgs, directory: &Directory, connect: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<TcpStream>>,
{
    let scenario = resolve_scenario(&args.scenario, &args.local_hostname, &args.local_realm)?;

    let mut socket = connect().await?;
    let baseline = mutator::replay(
        scenario.as_ref(),
        &mut socket,
        &args.local_hostname,
        &args.local_realm,
        None,
    )
    .await;
    report_outcome("capture", &baseline);

    let mut sequence = baseline.messages;
    for (msg, _) in sequence.iter_mut() {
        if let Err(e) = tagger::tag(msg, directory) {
            log::warn!("failed to tag captured message (code={}): {e}", msg.code);
        }
    }

    let descriptors = mutator::analyze(&sequence);
    log::info!("generated {} scenarios of fuzzing", descriptors.len());

    for descriptor in descriptors {
        let mut socket = connect().await?;
        let description = descriptor.description.clone();
        let outcome = mutator::replay(
            scenario.as_ref(),
            &mut socket,
            &args.local_hostname,
            &args.local_realm,
            Some(descriptor),
        )
        .await;
        report_outcome(&description, &outcome);
    }

    Ok(())
}

/// Run one capture pass, then replay once per proprietary AVP code in the
/// scanned range (spec.md §4.4 "Proprietary AVP sweep").
async fn run_scan<F, Fut>(args: &ScanArgs, directory: &Directory, connect: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<TcpStream>>,
{
    // local_hostname/local_realm aren't part of a scan; reuse a neutral
    // identity since proprietary sweeps only care about DWR auto-answer.
    let scenario = resolve_scenario(&args.scenario, "diafuzzer", "diafuzzer")?;

    let mut socket = connect().await?;
    let baseline = mutator::replay(scenario.as_ref(), &mut socket, "diafuzzer", "diafuzzer", None).await;
    report_outcome("capture", &baseline);

    let mut sequence = baseline.messages;
    for (msg, _) in sequence.iter_mut() {
        if let Err(e) = tagger::tag(msg, directory) {
            log::warn!("failed to tag captured message (code={}): {e}", msg.code);
        }
    }

    let sweep: Vec<_> = mutator::proprietary_sweep(&sequence, args.vendor, args.min, args.max).collect();
    log::info!("generated {} proprietary AVP codes to sweep", sweep.len());

    for descriptor in sweep {
        let mut socket = connect().await?;
        let description = descriptor.description.clone();
        let outcome = mutator::replay(
            scenario.as_ref(),
            &mut socket,
            "diafuzzer",
            "diafuzzer",
            Some(descriptor),
        )
        .await;
        report_outcome(&description, &outcome);
    }

    Ok(())
}

/// Run `cli` with connections initiated outward (`dia-client`). `Mode::Clientloop`
/// reconnects and reruns indefinitely instead of stopping after one run
/// (`original_source/unit.py`'s `clientloop` mode); `Mode::Client` runs once.
pub async fn run_as_client(cli: &Cli) -> Result<()> {
    let directory = load_directory(cli)?;

    match &cli.command {
        Command::Fuzz(args) => {
            if args.mode == Mode::Server {
                log::warn!("dia-client only initiates connections; ignoring --mode server");
            }
            let (host, port) = args.host_port()?;
            loop {
                let result = run_fuzz(args, &directory, || async {
                    Ok(TcpStream::connect((host.as_str(), port)).await?)
                })
                .await;
                if let Err(e) = result {
                    log::warn!("run raised: {e}");
                }
                if args.mode != Mode::Clientloop {
                    return result;
                }
            }
        }
        Command::Scan(args) => {
            if args.mode == Mode::Server {
                log::warn!("dia-client only initiates connections; ignoring --mode server");
            }
            let target = args.target.clone();
            let port = args.port;
            loop {
                let result = run_scan(args, &directory, || async {
                    Ok(TcpStream::connect((target.as_str(), port)).await?)
                })
                .await;
                if let Err(e) = result {
                    log::warn!("run raised: {e}");
                }
                if args.mode != Mode::Clientloop {
                    return result;
                }
            }
        }
    }
}

/// Run `cli` by listening and accepting connections (`dia-server`).
pub async fn run_as_server(cli: &Cli) -> Result<()> {
    let directory = load_directory(cli)?;

    match &cli.command {
        Command::Fuzz(args) => {
            if args.mode != Mode::Server {
                log::warn!("dia-server only accepts connections; ignoring --mode {:?}", args.mode);
            }
            let (host, port) = args.host_port()?;
            let listener = TcpListener::bind((host.as_str(), port)).await?;
            log::info!("listening at {host}:{port}");
            run_fuzz(args, &directory, || async {
                let (socket, _) = listener.accept().await?;
                Ok(socket)
            })
            .await
        }
        Command::Scan(args) => {
            if args.mode != Mode::Server {
                log::warn!("dia-server only accepts connections; ignoring --mode {:?}", args.mode);
            }
            let listener = TcpListener::bind((args.target.as_str(), args.port)).await?;
            log::info!("listening at {}:{}", args.target, args.port);
            run_scan(args, &directory, || async {
                let (socket, _) = listener.accept().await?;
                Ok(socket)
            })
            .await
        }
    }
}
