//! Mutation descriptors: data, not closures (spec.md §9 Design Note —
//! `original_source/mutate.py` binds a Python lambda per scenario; we
//! record the intent instead so descriptors can be listed, filtered and
//! replayed without re-entering the enumeration code).

/// Identifies which sent message in a captured sequence a mutation
/// targets, matching `original_source/mutate.py`'s `MsgAnchor` namedtuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgAnchor {
    pub index: usize,
    pub code: u32,
    pub is_request: bool,
}

/// What to do to the anchored message before forwarding it.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationAction {
    /// Remove every AVP at `path` (spec.md §4.4 "structural absence").
    Absent { path: String },
    /// Pad the group at `path` out to `count` entries (spec.md §4.4
    /// "structural overpresence").
    Overpresent { path: String, count: u32 },
    /// Replace the value at `path` (spec.md §4.4 "value mutation").
    SetValue { path: String, value: Vec<u8> },
    /// Append one AVP of an unassigned `code` at the top level, used by
    /// the proprietary-AVP code-space sweep (spec.md §4.4 "Proprietary AVP
    /// sweep"; grounded on `original_source/fuzz-proprietary-avps.py`).
    AppendProprietaryAvp { code: u32, vendor: u32 },
}

/// One fuzzing variant: an anchor plus the edit to apply when that
/// message is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationDescriptor {
    pub anchor: MsgAnchor,
    pub description: String,
    pub action: MutationAction,
}
