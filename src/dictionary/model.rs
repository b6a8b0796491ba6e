//! Dictionary data model: the resolved, immutable picture of a Diameter
//! application as built by [`super::grammar`] and [`super::Application::load`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A closed set of Diameter datatypes, basic and derived (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    OctetString,
    Integer32,
    Integer64,
    Unsigned32,
    Unsigned64,
    Float32,
    Float64,
    Grouped,
    Address,
    Time,
    UTF8String,
    Enumerated,
    DiameterIdentity,
    DiameterURI,
    IPFilterRule,
    QoSFilterRule,
}

impl DataType {
    /// Parse a datatype token, canonicalising `DiamIdent`/`DiamURI` aliases
    /// (spec.md §4.1).
    pub fn parse(s: &str) -> Option<DataType> {
        Some(match s {
            "OctetString" => DataType::OctetString,
            "Integer32" => DataType::Integer32,
            "Integer64" => DataType::Integer64,
            "Unsigned32" => DataType::Unsigned32,
            "Unsigned64" => DataType::Unsigned64,
            "Float32" => DataType::Float32,
            "Float64" => DataType::Float64,
            "Grouped" => DataType::Grouped,
            "Address" => DataType::Address,
            "Time" => DataType::Time,
            "UTF8String" => DataType::UTF8String,
            "Enumerated" => DataType::Enumerated,
            "DiameterIdentity" | "DiamIdent" => DataType::DiameterIdentity,
            "DiameterURI" | "DiamURI" => DataType::DiameterURI,
            "IPFilterRule" => DataType::IPFilterRule,
            "QoSFilterRule" => DataType::QoSFilterRule,
            _ => return None,
        })
    }

    /// Fixed wire length for datatypes with a known length, per spec.md
    /// §4.1 ("Known fixed-length datatypes"). `Time` is 4 bytes (RFC 6733;
    /// see Open Question 4 in spec.md §9 — the original source table listed
    /// it twice, once wrongly as 8).
    pub fn known_length(&self) -> Option<&'static [u32]> {
        match self {
            DataType::Integer32 => Some(&[4]),
            DataType::Unsigned32 => Some(&[4]),
            DataType::Float32 => Some(&[4]),
            DataType::Enumerated => Some(&[4]),
            DataType::Time => Some(&[4]),
            DataType::Integer64 => Some(&[8]),
            DataType::Unsigned64 => Some(&[8]),
            DataType::Float64 => Some(&[8]),
            DataType::Address => Some(&[6, 18]),
            _ => None,
        }
    }
}

/// Dictionary AVP entity (spec.md §3 "AVP (dictionary entity)").
#[derive(Debug, Clone)]
pub struct Avp {
    pub name: String,
    pub code: u32,
    pub vendor_id: u32,
    pub datatype: DataType,
    pub mandatory: bool,
    pub vendor_specific: bool,
    pub protected: bool,
    /// `Enumerated`: value -> description.
    pub value_to_desc: HashMap<i64, String>,
    /// `Enumerated`: description -> value.
    pub desc_to_value: HashMap<String, i64>,
    /// `Grouped`: ordered CCF body.
    pub grouped: Vec<QualifiedAvp>,
}

impl Avp {
    pub fn identity(&self) -> (u32, u32) {
        (self.code, self.vendor_id)
    }

    /// True when this AVP's CCF ends with an unbounded wildcard `*AVP` slot
    /// (spec.md §4.4 "Deep self-stacking"; Design Note / Open Question 3:
    /// `allows_stacking` must be a predicate, not a method reference).
    pub fn allows_stacking(&self) -> bool {
        if self.datatype != DataType::Grouped {
            return false;
        }
        self.grouped
            .iter()
            .any(|qa| qa.name == "AVP" && qa.min.is_none() && qa.max.is_none())
    }
}

/// Semantics a [`QualifiedAvp`] carries inside a CCF (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantics {
    Fixed,
    Required,
    Optional,
}

/// A reference to an AVP inside a CCF, with multiplicity/semantics
/// (spec.md §3 "QualifiedAvp").
#[derive(Debug, Clone)]
pub struct QualifiedAvp {
    pub name: String,
    pub semantics: Semantics,
    pub multiple: bool,
    pub min: Option<u32>,
    pub max: Option<u32>,
    /// `(code, vendor_id)` of the resolved dictionary AVP; `None` for the
    /// wildcard `"AVP"` slot. Stored as an identity rather than an `Arc`
    /// so resolution doesn't need interior mutability over a graph of
    /// mutually-referencing `Avp`s (spec.md §4.1 resolution step 7).
    pub resolved: Option<(u32, u32)>,
}

impl QualifiedAvp {
    /// Acceptance predicate from spec.md §3:
    /// - fixed/required, not multiple: count == 1
    /// - fixed/required, multiple: min <= count <= max (open where unset)
    /// - optional, not multiple: count in {0, 1}
    /// - optional, multiple: always true
    pub fn accept(&self, count: u32) -> bool {
        match self.semantics {
            Semantics::Fixed | Semantics::Required => {
                if !self.multiple {
                    count == 1
                } else {
                    if let Some(min) = self.min {
                        if count < min {
                            return false;
                        }
                    }
                    if let Some(max) = self.max {
                        if count > max {
                            return false;
                        }
                    }
                    true
                }
            }
            Semantics::Optional => {
                if !self.multiple {
                    count == 0 || count == 1
                } else {
                    true
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qa(semantics: Semantics, multiple: bool, min: Option<u32>, max: Option<u32>) -> QualifiedAvp {
        QualifiedAvp {
            name: "X".to_string(),
            semantics,
            multiple,
            min,
            max,
            resolved: Some((1, 0)),
        }
    }

    #[test]
    fn fixed_single_accepts_exactly_one() {
        let avp = qa(Semantics::Fixed, false, None, None);
        assert!(!avp.accept(0));
        assert!(avp.accept(1));
        assert!(!avp.accept(2));
    }

    #[test]
    fn required_multiple_honors_min_and_max() {
        let avp = qa(Semantics::Required, true, Some(1), Some(3));
        assert!(!avp.accept(0));
        assert!(avp.accept(1));
        assert!(avp.accept(3));
        assert!(!avp.accept(4));
    }

    #[test]
    fn required_multiple_with_no_bounds_accepts_anything() {
        let avp = qa(Semantics::Required, true, None, None);
        assert!(avp.accept(0));
        assert!(avp.accept(1000));
    }

    #[test]
    fn optional_single_accepts_zero_or_one() {
        let avp = qa(Semantics::Optional, false, None, None);
        assert!(avp.accept(0));
        assert!(avp.accept(1));
        assert!(!avp.accept(2));
    }

    #[test]
    fn optional_multiple_always_accepts() {
        let avp = qa(Semantics::Optional, true, None, None);
        assert!(avp.accept(0));
        assert!(avp.accept(500));
    }

    #[test]
    fn allows_stacking_requires_unbounded_wildcard_slot() {
        let mut grouped = Avp {
            name: "Grouped-One".to_string(),
            code: 900,
            vendor_id: 0,
            datatype: DataType::Grouped,
            mandatory: false,
            vendor_specific: false,
            protected: false,
            value_to_desc: HashMap::new(),
            desc_to_value: HashMap::new(),
            grouped: vec![qa(Semantics::Optional, true, Some(0), Some(5))],
        };
        assert!(!grouped.allows_stacking(), "bounded wildcard slot doesn't count");

        grouped.grouped.push(QualifiedAvp {
            name: "AVP".to_string(),
            semantics: Semantics::Optional,
            multiple: true,
            min: None,
            max: None,
            resolved: None,
        });
        assert!(grouped.allows_stacking());
    }
}

/// Dictionary message entity (spec.md §3 "Message (dictionary entity)").
#[derive(Debug, Clone)]
pub struct Message {
    pub name: String,
    pub code: u32,
    pub appid: u32,
    pub request: bool,
    pub proxyable: bool,
    pub error: bool,
    pub avps: Vec<QualifiedAvp>,
}

/// A resolved Diameter application (spec.md §3 "Application").
#[derive(Debug)]
pub struct Application {
    pub id: Option<u32>,
    pub name: String,
    pub version: Option<String>,
    pub default_vendor_id: Option<u32>,
    pub avps: Vec<Arc<Avp>>,
    pub msgs: Vec<Arc<Message>>,
    pub inherited_avps: Vec<Arc<Avp>>,
    pub inherited_msgs: Vec<Arc<Message>>,
    /// Diagnostics only; never participates in lookup or equality.
    pub source_path: Option<PathBuf>,
}

impl Application {
    pub fn find_avps_by<F>(&self, mut f: F) -> Vec<&Arc<Avp>>
    where
        F: FnMut(&Avp) -> bool,
    {
        self.avps
            .iter()
            .filter(|a| f(a))
            .chain(self.inherited_avps.iter().filter(|a| f(a)))
            .collect()
    }

    pub fn find_msgs_by<F>(&self, mut f: F) -> Vec<&Arc<Message>>
    where
        F: FnMut(&Message) -> bool,
    {
        self.msgs
            .iter()
            .filter(|m| f(m))
            .chain(self.inherited_msgs.iter().filter(|m| f(m)))
            .collect()
    }

    /// Look up a dictionary AVP by its resolved `(code, vendor_id)` identity,
    /// own or inherited.
    pub fn avp_by_identity(&self, code: u32, vendor_id: u32) -> Option<&Arc<Avp>> {
        self.avps
            .iter()
            .chain(self.inherited_avps.iter())
            .find(|a| a.identity() == (code, vendor_id))
    }
}
