//! Mutation descriptors, their deterministic enumeration from a captured
//! message sequence, and the in-process scenario replay driver that applies
//! them (spec.md §4.4 "Mutation engine", §4.5 "Scenario replay").

pub mod descriptor;
pub mod driver;
pub mod enumerate;
pub mod scenarios;

pub use descriptor::{MsgAnchor, MutationAction, MutationDescriptor};
pub use driver::{replay, Scenario, ScenarioTransport};
pub use enumerate::{analyze, proprietary_sweep};
