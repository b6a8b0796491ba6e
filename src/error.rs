//! Error kinds for the dictionary, codec, tagger and mutator subsystems.
//!
//! Each subsystem gets its own `thiserror` enum so callers can match on the
//! kind of failure (dictionary/codec errors are fatal at load/decode time;
//! tag errors abort a message but not a run; scenario and mutation errors
//! are captured per descriptor). [`Error`] unifies them for code that just
//! wants to propagate with `?`.

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Tag(#[from] TagError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while parsing a `.dia` file or resolving a [`crate::dictionary::Directory`].
#[derive(Debug, ThisError)]
pub enum DictionaryError {
    #[error("section @{section} occurs more times than allowed in {path}")]
    InvalidSectionOccurrence { section: String, path: PathBuf },

    #[error("section @{section} has invalid arguments in {path}: {detail}")]
    InvalidSectionArguments {
        section: String,
        path: PathBuf,
        detail: String,
    },

    #[error("{path} contains @messages but no @id section")]
    MissingId { path: PathBuf },

    #[error(
        "AVP {name:?} is V-flagged but no vendor id is available (no @vendor and no @avp_vendor_id) in {path}"
    )]
    MissingDefaultVendorId { name: String, path: PathBuf },

    #[error("AVP defined more than once: {0:?}")]
    AvpDefinedMultipleTimes(String),

    #[error("message defined more than once: {0:?}")]
    MessageDefinedMultipleTimes(String),

    #[error("message {msg:?} declares appid {found} but application id is {expected}")]
    MessageContainsInvalidId {
        msg: String,
        found: u32,
        expected: u32,
    },

    #[error("@grouped section references unknown AVP {0:?}")]
    GroupedDefinitionForUnknownAvp(String),

    #[error("@enum section references unknown AVP {0:?}")]
    EnumDefinitionForUnknownAvp(String),

    #[error("malformed @avp_types line: {0:?}")]
    AvpTypeInvalidLine(String),

    #[error("ambiguous AVP name {name:?}: {count} candidates")]
    MultipleDefinitionFound { name: String, count: usize },

    #[error("invalid AVP datatype {0:?}")]
    InvalidAvpType(String),

    #[error("invalid AVP flags {0:?}")]
    InvalidAvpFlags(String),

    #[error("numeric literal out of range: {0:?}")]
    NumericLiteralOutOfRange(String),

    #[error("unparsable qualified-AVP line: {0:?}")]
    InvalidAvpQualifier(String),

    #[error("Enumerated AVP {0:?} has no value table")]
    EnumeratedAvpNotValued(String),

    #[error("Grouped AVP {0:?} has no CCF body")]
    GroupedAvpNotDefined(String),

    #[error("message {msg:?} references undefined AVP {avp:?}")]
    MsgUsesUndefinedAvp { msg: String, avp: String },

    #[error("grouped AVP {group:?} references undefined AVP {avp:?}")]
    AvpUsesUndefinedAvp { group: String, avp: String },

    #[error("unmatched CCF line in {path}: {line:?}")]
    UnmatchedCcfLine { path: PathBuf, line: String },

    #[error("@enum for {avp:?} has duplicate description {desc:?}")]
    EnumDuplicatedDesc { avp: String, desc: String },

    #[error("@enum for {avp:?} has duplicate value {value}")]
    EnumDuplicatedValue { avp: String, value: i64 },

    #[error("AVP name {0:?} is ambiguous across inherited dictionaries")]
    AmbiguousAvpNaming(String),

    #[error("module {module:?} not found on search path (from {path})")]
    InheritedModuleMissing { module: String, path: PathBuf },

    #[error("application id {0} unknown to this directory")]
    UnknownApplicationId(u32),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize directory cache: {0}")]
    Cache(String),
}

/// Errors raised by [`crate::message`] decode/encode.
#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("buffer incomplete: expected at least {expected} bytes, got {actual}")]
    IncompleteBuffer { expected: usize, actual: usize },

    #[error("invalid message length: {0}")]
    InvalidMessageLength(i64),

    #[error("invalid AVP length: {0}")]
    InvalidAvpLength(u32),

    #[error("truncated AVP header")]
    TruncatedAvpHeader,
}

/// Errors raised by [`crate::tagger`].
#[derive(Debug, ThisError)]
pub enum TagError {
    #[error(
        "message (app_id={app_id}, code={code}, request={is_request}) is not specified by any loaded application"
    )]
    NonSpecifiedMsg {
        app_id: u32,
        code: u32,
        is_request: bool,
    },

    #[error(
        "message (app_id={app_id}, code={code}, request={is_request}) is specified by {count} applications"
    )]
    MultipleSpecifiedMsg {
        app_id: u32,
        code: u32,
        is_request: bool,
        count: usize,
    },
}

/// Errors raised by scenario execution / the replay driver.
#[derive(Debug, ThisError)]
pub enum ScenarioError {
    #[error("received message did not meet expectations: {0}")]
    RecvMismatch(String),

    #[error("transport disconnected")]
    Disconnected,
}

/// Errors raised while applying a path-addressed mutation.
#[derive(Debug, ThisError)]
pub enum MutationError {
    #[error("path {0:?} does not resolve to any AVP")]
    PathNotFound(String),

    #[error("path {0:?} does not select a parent that permits this edit")]
    PathNotEditable(String),

    #[error("malformed path: {0:?}")]
    MalformedPath(String),

    #[error(
        "anchored message (index {index}) was expected to be code={expected_code} request={expected_request} but is code={actual_code} request={actual_request}"
    )]
    AnchorMismatch {
        index: usize,
        expected_code: u32,
        expected_request: bool,
        actual_code: u32,
        actual_request: bool,
    },
}
