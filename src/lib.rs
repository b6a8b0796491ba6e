//! # diafuzzer
//!
//! A Diameter protocol mutation fuzzer (RFC 6733 and 3GPP extensions):
//! captures one run of a scripted message exchange, then replays it once per
//! generated mutation to probe a peer's robustness against malformed AVPs.
//!
//! Based on the Orange-OpenSource `diafuzzer` Python tool.
//!
//! ## Modules
//! * [`dictionary`] - parses `.dia` CCF dictionaries and resolves them into a queryable [`dictionary::Directory`].
//! * [`message`] - wire-level Diameter message/AVP decode, encode, and path-addressed mutation.
//! * [`tagger`] - annotates a decoded message against a [`dictionary::Directory`].
//! * [`mutator`] - mutation descriptors, their deterministic enumeration, and the scenario replay driver.
//! * [`config`] - CLI argument parsing for the `dia-client`/`dia-server` binaries.

pub mod cli;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod message;
pub mod mutator;
pub mod tagger;

pub use error::{Error, Result};
