//! Wire-level Diameter messages: decode/encode and path-addressed mutation
//! (spec.md §3 "Msg"/"Avp (wire type)", §4.2).

pub mod avp;
pub mod header;
pub mod path;

pub use avp::Avp;
pub use header::Msg;
pub use path::{parse_path, segment_for, unfold, PathStep};
