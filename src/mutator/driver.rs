//! In-process scenario replay: routes a scenario's outgoing messages to a
//! real peer, answers Device-Watchdog-Requests transparently, and hands
//! peer responses back to the scenario (grounded on
//! `original_source/scenario.py`'s `dwr_handler`).
//!
//! The original pairs a scenario, run as a `Thread`, with the real socket
//! through an `AF_UNIX` socketpair, framing each direction with a 4-byte
//! length prefix because both ends are raw byte streams. Here the scenario
//! is a single async call (`Scenario::run`) racing the socket loop in the
//! same task; the framing was never meaningful data, just a way to get
//! whole messages across a byte pipe, so a pair of `Msg`-typed `mpsc`
//! channels replaces it outright.

use crate::error::{CodecError, Error, MutationError, Result, ScenarioError};
use crate::message::Msg;
use crate::mutator::descriptor::{MsgAnchor, MutationAction, MutationDescriptor};
use async_trait::async_trait;
use std::io::Cursor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub(crate) const DWR_CODE: u32 = 280;
const ORIGIN_HOST_CODE: u32 = 264;
const ORIGIN_REALM_CODE: u32 = 296;
const RESULT_CODE_CODE: u32 = 268;
const ORIGIN_STATE_ID_CODE: u32 = 278;
const DWA_RESULT_SUCCESS: u32 = 2001;
const DWA_ORIGIN_STATE_ID: u32 = 0xcafe_babe;

const HEADER_LEN: usize = 20;
/// Largest Diameter message length a 24-bit length field can express.
const U24_MAX: usize = 0xff_ffff;

const CHANNEL_DEPTH: usize = 16;

/// The scenario's half of the driver/scenario channel pair — what
/// `original_source/scenario.py` calls `fuzzed_plug`.
pub struct ScenarioTransport {
    outbound: mpsc::Sender<Msg>,
    inbound: mpsc::Receiver<Msg>,
}

impl ScenarioTransport {
    /// Send a message as if writing it to the real peer.
    pub async fn send(&self, msg: Msg) -> Result<()> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| ScenarioError::Disconnected.into())
    }

    /// Receive the next message the real peer sent back.
    pub async fn recv(&mut self) -> Result<Msg> {
        self.inbound
            .recv()
            .await
            .ok_or_else(|| ScenarioError::Disconnected.into())
    }
}

struct DriverTransport {
    from_scenario: mpsc::Receiver<Msg>,
    to_scenario: mpsc::Sender<Msg>,
}

fn transport_pair() -> (ScenarioTransport, DriverTransport) {
    let (scenario_tx, driver_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (driver_tx, scenario_rx) = mpsc::channel(CHANNEL_DEPTH);
    (
        ScenarioTransport {
            outbound: scenario_tx,
            inbound: scenario_rx,
        },
        DriverTransport {
            from_scenario: driver_rx,
            to_scenario: driver_tx,
        },
    )
}

/// A scripted exchange of Diameter messages, run against a
/// [`ScenarioTransport`] by [`replay`] (the async replacement of
/// `original_source/scenario.py`'s `execfile`-loaded `run` function). A
/// boxed trait object rather than a process-embedded scripting layer,
/// since dynamically loading scenario scripts at runtime is out of scope
/// here and left to an external collaborator.
#[async_trait]
pub trait Scenario: Send + Sync {
    async fn run(&self, transport: &mut ScenarioTransport) -> Result<()>;
}

/// A single mutation in flight: tracks how many sent messages have been
/// seen so far, matching `original_source/mutate.py`'s `MutateScenario.send`.
struct MutatorState {
    anchor: MsgAnchor,
    action: MutationAction,
    sent_so_far: usize,
}

impl MutatorState {
    fn new(descriptor: MutationDescriptor) -> MutatorState {
        MutatorState {
            anchor: descriptor.anchor,
            action: descriptor.action,
            sent_so_far: 0,
        }
    }

    /// Apply the mutation in place if `msg` is the anchored message, then
    /// advance the counter. Mirrors `MutateScenario.send`'s `processed_msgs`
    /// bookkeeping.
    fn maybe_apply(&mut self, msg: &mut Msg) -> Result<()> {
        let activate = self.sent_so_far == self.anchor.index;
        self.sent_so_far += 1;
        if !activate {
            return Ok(());
        }

        if msg.code != self.anchor.code || msg.request != self.anchor.is_request {
            return Err(MutationError::AnchorMismatch {
                index: self.anchor.index,
                expected_code: self.anchor.code,
                expected_request: self.anchor.is_request,
                actual_code: msg.code,
                actual_request: msg.request,
            }
            .into());
        }

        match &self.action {
            MutationAction::Absent { path } => msg.suppress_avps(path)?,
            MutationAction::Overpresent { path, count } => {
                msg.overflow_avps(path, *count as usize)?
            }
            MutationAction::SetValue { path, value } => msg.modify_value(path, value.clone())?,
            MutationAction::AppendProprietaryAvp { code, vendor } => {
                msg.length = None;
                msg.avps
                    .push(crate::message::Avp::octets(*code, *vendor, Vec::new()));
            }
        }
        Ok(())
    }
}

/// Outcome of one [`replay`] run: the messages exchanged, in order, tagged
/// with whether they were sent by the scenario (`true`) or received from
/// the peer (`false`), plus a description of whatever ended the run early.
pub struct ReplayOutcome {
    pub exc_info: Option<String>,
    pub messages: Vec<(Msg, bool)>,
}

/// Read one full Diameter message from `socket`, or `None` on a clean EOF
/// before any bytes of a new message arrive.
async fn read_msg(socket: &mut TcpStream) -> Result<Option<Msg>> {
    let mut header = [0u8; HEADER_LEN];
    let mut read = 0;
    while read < HEADER_LEN {
        let n = socket.read(&mut header[read..]).await?;
        if n == 0 {
            return if read == 0 {
                Ok(None)
            } else {
                Err(CodecError::IncompleteBuffer {
                    expected: HEADER_LEN,
                    actual: read,
                }
                .into())
            };
        }
        read += n;
    }

    let total_length = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
    if !(HEADER_LEN..=U24_MAX).contains(&total_length) {
        return Err(CodecError::InvalidMessageLength(total_length as i64).into());
    }

    let mut buf = vec![0u8; total_length];
    buf[..HEADER_LEN].copy_from_slice(&header);
    let mut read = HEADER_LEN;
    while read < total_length {
        let n = socket.read(&mut buf[read..]).await?;
        if n == 0 {
            return Err(CodecError::IncompleteBuffer {
                expected: total_length,
                actual: read,
            }
            .into());
        }
        read += n;
    }

    let mut cursor = Cursor::new(buf);
    Ok(Some(Msg::decode_from(&mut cursor)?))
}

fn build_dwa(request: &Msg, local_host: &str, local_realm: &str) -> Msg {
    let mut dwa = Msg::new(DWR_CODE, request.app_id, false);
    dwa.h2h_id = request.h2h_id;
    dwa.e2e_id = request.e2e_id;
    dwa.avps = vec![
        crate::message::Avp::utf8(ORIGIN_HOST_CODE, 0, local_host),
        crate::message::Avp::utf8(ORIGIN_REALM_CODE, 0, local_realm),
        crate::message::Avp::u32(RESULT_CODE_CODE, 0, DWA_RESULT_SUCCESS),
        crate::message::Avp::u32(ORIGIN_STATE_ID_CODE, 0, DWA_ORIGIN_STATE_ID),
    ];
    dwa
}

/// Run `scenario` against `socket`, optionally applying one mutation to the
/// anchored sent message. Returns every message exchanged, tagged by
/// direction, even when the run ends early — matching
/// `original_source/scenario.py`'s `(exc_info, msgs)` return. The scenario
/// finishing (its `run` future resolving) ends the replay immediately, the
/// same way the original's loop ends as soon as `fuzzed_plug` closes.
pub async fn replay(
    scenario: &dyn Scenario,
    socket: &mut TcpStream,
    local_host: &str,
    local_realm: &str,
    mutation: Option<MutationDescriptor>,
) -> ReplayOutcome {
    let (mut transport, mut driver) = transport_pair();
    let mut mutator = mutation.map(MutatorState::new);

    let mut messages = Vec::new();
    let mut exc_info = None;

    let mut scenario_fut = scenario.run(&mut transport);

    loop {
        tokio::select! {
            result = &mut scenario_fut => {
                if let Err(e) = result {
                    exc_info.get_or_insert(e.to_string());
                }
                break;
            }
            from_scenario = driver.from_scenario.recv() => {
                let Some(mut msg) = from_scenario else { break };
                messages.push((msg.deep_clone(), true));

                if let Some(mutator) = mutator.as_mut() {
                    if let Err(e) = mutator.maybe_apply(&mut msg) {
                        exc_info = Some(e.to_string());
                        break;
                    }
                }

                let mut buf = Vec::new();
                if let Err(e) = msg.encode_to(&mut buf) {
                    exc_info = Some(e.to_string());
                    break;
                }
                if let Err(e) = socket.write_all(&buf).await {
                    exc_info = Some(Error::from(e).to_string());
                    break;
                }
            }
            from_peer = read_msg(socket) => {
                match from_peer {
                    Err(e) => { exc_info = Some(e.to_string()); break; }
                    Ok(None) => break,
                    Ok(Some(msg)) => {
                        if msg.code == DWR_CODE && msg.request {
                            let mut dwa = build_dwa(&msg, local_host, local_realm);
                            let mut buf = Vec::new();
                            if let Err(e) = dwa.encode_to(&mut buf) {
                                exc_info = Some(e.to_string());
                                break;
                            }
                            if let Err(e) = socket.write_all(&buf).await {
                                exc_info = Some(Error::from(e).to_string());
                                break;
                            }
                        } else {
                            messages.push((msg.clone(), false));
                            if driver.to_scenario.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    ReplayOutcome { exc_info, messages }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoOnce;

    #[async_trait]
    impl Scenario for EchoOnce {
        async fn run(&self, transport: &mut ScenarioTransport) -> Result<()> {
            let mut msg = Msg::new(257, 0, true);
            msg.avps.push(crate::message::Avp::utf8(264, 0, "me"));
            transport.send(msg).await?;
            let _ = transport.recv().await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn replay_auto_answers_peer_dwr_and_forwards_the_real_reply() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();

            let probe = read_msg(&mut sock).await.unwrap().unwrap();
            assert_eq!(probe.code, 257);

            // challenge the driver with a DWR; it must answer without
            // involving the scenario at all.
            let mut dwr = Msg::new(DWR_CODE, 0, true);
            let mut buf = Vec::new();
            dwr.encode_to(&mut buf).unwrap();
            sock.write_all(&buf).await.unwrap();

            let dwa = read_msg(&mut sock).await.unwrap().unwrap();
            assert_eq!(dwa.code, DWR_CODE);
            assert!(!dwa.request);

            let mut reply = Msg::new(257, 0, false);
            reply.h2h_id = probe.h2h_id;
            reply.e2e_id = probe.e2e_id;
            let mut buf = Vec::new();
            reply.encode_to(&mut buf).unwrap();
            sock.write_all(&buf).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let outcome = replay(&EchoOnce, &mut client, "local.test", "test", None).await;

        peer.await.unwrap();
        assert!(outcome.exc_info.is_none(), "{:?}", outcome.exc_info);
        assert_eq!(outcome.messages.len(), 2, "DWR/DWA are not recorded as scenario traffic");
        assert!(outcome.messages[0].1, "the probe was sent by the scenario");
        assert!(!outcome.messages[1].1, "the reply came from the peer");
    }

    #[test]
    fn mutator_state_only_activates_on_its_anchor() {
        let mut state = MutatorState::new(MutationDescriptor {
            anchor: MsgAnchor {
                index: 1,
                code: 280,
                is_request: true,
            },
            description: "absent".to_string(),
            action: MutationAction::Absent {
                path: "/code=264".to_string(),
            },
        });

        let mut first = Msg::new(280, 0, true);
        first.avps.push(crate::message::Avp::utf8(264, 0, "x"));
        state.maybe_apply(&mut first).unwrap();
        assert_eq!(first.avps.len(), 1, "first message is not the anchor");

        let mut second = Msg::new(280, 0, true);
        second.avps.push(crate::message::Avp::utf8(264, 0, "x"));
        state.maybe_apply(&mut second).unwrap();
        assert!(second.avps.is_empty(), "second message is the anchor");
    }

    #[test]
    fn mutator_state_rejects_anchor_index_pointing_at_a_different_message() {
        let mut state = MutatorState::new(MutationDescriptor {
            anchor: MsgAnchor {
                index: 0,
                code: 280,
                is_request: true,
            },
            description: "absent".to_string(),
            action: MutationAction::Absent {
                path: "/code=264".to_string(),
            },
        });

        let mut divergent = Msg::new(272, 0, true);
        let err = state.maybe_apply(&mut divergent).unwrap_err();
        assert!(matches!(
            err,
            Error::Mutation(MutationError::AnchorMismatch { .. })
        ));
    }
}
