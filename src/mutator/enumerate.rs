//! Deterministic enumeration of mutation descriptors from a captured,
//! tagged message sequence, grounded on `original_source/fuzz.py`'s
//! `analyze()` and `original_source/mutate.py`'s `grouped_variants`/
//! `non_grouped_variants`.

use super::descriptor::{MsgAnchor, MutationAction, MutationDescriptor};
use crate::dictionary;
use crate::message::{segment_for, unfold, Avp, Msg};

/// Walk a captured `(message, was_sent)` sequence and produce every
/// structural and value mutation variant for every *sent* message, in the
/// same order `original_source/fuzz.py`'s `analyze()` would: per sent
/// message, top-level structural variants first, then a depth-first
/// field-level pass (structural variants recursing into Grouped AVPs,
/// value variants on everything else, plus one self-stacking variant
/// where `allows_stacking()` holds).
///
/// Every AVP in `sequence` must already be tagged (see [`crate::tagger::tag`]);
/// this panics otherwise, matching the original's bare `assert(a.model_avp)`.
pub fn analyze(sequence: &[(Msg, bool)]) -> Vec<MutationDescriptor> {
    let mut fuzzs = Vec::new();
    let mut sent = 0usize;

    for (msg, was_sent) in sequence {
        if !*was_sent {
            continue;
        }
        let anchor = MsgAnchor {
            index: sent,
            code: msg.code,
            is_request: msg.request,
        };

        grouped_variants_into(&msg.avps, "", anchor, &mut fuzzs);

        for (path, trail) in unfold(msg) {
            let a = resolve_trail(msg, &trail);
            let ma = a
                .model_avp
                .as_ref()
                .expect("message must be tagged before enumeration");

            if ma.datatype == dictionary::DataType::Grouped {
                grouped_variants_into(&a.avps, &path, anchor, &mut fuzzs);

                if ma.allows_stacking() {
                    let data = a.overflow_stacking(128);
                    let len = data.len();
                    fuzzs.push(MutationDescriptor {
                        anchor,
                        description: format!("{} self-stacked -> {len}", ma.name),
                        action: MutationAction::SetValue { path, value: data },
                    });
                }
            } else {
                for (value, description) in non_grouped_variants(ma) {
                    fuzzs.push(MutationDescriptor {
                        anchor,
                        description: format!("{} {description}", ma.name),
                        action: MutationAction::SetValue {
                            path: path.clone(),
                            value,
                        },
                    });
                }
            }
        }

        sent += 1;
    }

    fuzzs
}

fn resolve_trail<'a>(msg: &'a Msg, trail: &[usize]) -> &'a Avp {
    let mut cur = &msg.avps[trail[0]];
    for &i in &trail[1..] {
        cur = &cur.avps[i];
    }
    cur
}

/// absent / present-64-times / present-beyond-max variants for every AVP
/// in `siblings` (`original_source/mutate.py`'s `grouped_variants`).
fn grouped_variants_into(
    siblings: &[Avp],
    prefix: &str,
    anchor: MsgAnchor,
    out: &mut Vec<MutationDescriptor>,
) {
    for (i, a) in siblings.iter().enumerate() {
        let qa = a
            .qualified_avp
            .as_ref()
            .expect("message must be tagged before enumeration");
        let path = format!("{prefix}/{}", segment_for(siblings, i));

        out.push(MutationDescriptor {
            anchor,
            description: "absent".to_string(),
            action: MutationAction::Absent { path: path.clone() },
        });
        out.push(MutationDescriptor {
            anchor,
            description: "present 64 times".to_string(),
            action: MutationAction::Overpresent {
                path: path.clone(),
                count: 64,
            },
        });
        if let Some(max) = qa.max {
            out.push(MutationDescriptor {
                anchor,
                description: "present more than max allowed".to_string(),
                action: MutationAction::Overpresent {
                    path,
                    count: max + 1,
                },
            });
        }
    }
}

/// Value-level variants for one non-Grouped AVP, verbatim from
/// `original_source/mutate.py`'s `non_grouped_variants` (byte strings
/// carried over exactly; Python 2 `str` literals there are already raw
/// bytes).
fn non_grouped_variants(ma: &dictionary::Avp) -> Vec<(Vec<u8>, String)> {
    let mut out = Vec::new();

    match ma.datatype {
        dictionary::DataType::Enumerated => {
            let mn = *ma.value_to_desc.keys().min().expect("Enumerated AVP with no values");
            let mx = *ma.value_to_desc.keys().max().expect("Enumerated AVP with no values");
            out.push((
                ((mn - 1) as i32).to_be_bytes().to_vec(),
                "Enumerated lower than allowed".to_string(),
            ));
            out.push((
                ((mx + 1) as i32).to_be_bytes().to_vec(),
                "Enumerated bigger than allowed".to_string(),
            ));
        }
        dictionary::DataType::UTF8String => {
            for bad in [vec![0x80u8], vec![0xbf], vec![0x80u8; 128]] {
                out.push((bad, "UTF8String continuations".to_string()));
            }
            out.push((vec![0xc0, b' '], "UTF8String lonely start".to_string()));
            for bad in [vec![0xfeu8], vec![0xffu8]] {
                out.push((bad, "UTF8String impossible bytes".to_string()));
            }
            out.push((vec![0xc0, 0xaf], "UTF8String overlong".to_string()));
            for bad in [vec![0xef, 0xbf, 0xbe], vec![0xef, 0xbf, 0xbf]] {
                out.push((bad, "UTF8String non-characters in 16bits".to_string()));
            }
        }
        _ => {}
    }

    out.push((Vec::new(), "empty value".to_string()));

    for length in [3usize, 128 + 64, 8192 + 64] {
        out.push((
            vec![0xfeu8; length],
            format!("Generic overflow with {length} bytes"),
        ));
    }

    for fmt in ["%n", "%-1$n", "%4096$n"] {
        out.push((
            fmt.repeat(1024).into_bytes(),
            format!("Generic overflow with format specifier {fmt:?}"),
        ));
    }

    out
}

/// Lazily sweep AVP codes `[min_code, max_code)` for `vendor`, appending one
/// synthetic proprietary AVP to each sent message of the sequence
/// (`original_source/fuzz-proprietary-avps.py`'s `analyze(seq, v, a, b)`).
///
/// The original never advances its `sent` counter, so every sweep anchors
/// on the first sent message regardless of how many messages the captured
/// sequence holds; that's indistinguishable from intent for the
/// single-request scenarios this mode is built for, but it silently drops
/// later messages for anything bigger. We anchor each message's own slice
/// of the sweep on its own index instead.
pub fn proprietary_sweep(
    sequence: &[(Msg, bool)],
    vendor: u32,
    min_code: u32,
    max_code: u32,
) -> impl Iterator<Item = MutationDescriptor> + '_ {
    sequence
        .iter()
        .filter(|(_, was_sent)| *was_sent)
        .enumerate()
        .flat_map(move |(sent, (msg, _))| {
            let anchor = MsgAnchor {
                index: sent,
                code: msg.code,
                is_request: msg.request,
            };
            (min_code..max_code).map(move |code| MutationDescriptor {
                anchor,
                description: "Try with the proprietary AVP".to_string(),
                action: MutationAction::AppendProprietaryAvp { code, vendor },
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{DataType, QualifiedAvp, Semantics};
    use std::sync::Arc;

    fn model(name: &str, code: u32, datatype: DataType) -> Arc<dictionary::Avp> {
        Arc::new(dictionary::Avp {
            name: name.to_string(),
            code,
            vendor_id: 0,
            datatype,
            mandatory: true,
            vendor_specific: false,
            protected: false,
            value_to_desc: [(0i64, "A".to_string()), (2i64, "B".to_string())]
                .into_iter()
                .collect(),
            desc_to_value: [("A".to_string(), 0i64), ("B".to_string(), 2i64)]
                .into_iter()
                .collect(),
            grouped: Vec::new(),
        })
    }

    fn qa(code: u32) -> QualifiedAvp {
        QualifiedAvp {
            name: "X".to_string(),
            semantics: Semantics::Optional,
            multiple: true,
            min: None,
            max: Some(2),
            resolved: Some((code, 0)),
        }
    }

    #[test]
    fn grouped_variants_cover_absent_present_and_beyond_max() {
        let mut avps = vec![Avp::octets(280, 0, b"toto".to_vec())];
        avps[0].qualified_avp = Some(qa(280));
        let anchor = MsgAnchor {
            index: 0,
            code: 280,
            is_request: true,
        };
        let mut out = Vec::new();
        grouped_variants_into(&avps, "", anchor, &mut out);
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0].action, MutationAction::Absent { .. }));
        assert!(matches!(
            out[2].action,
            MutationAction::Overpresent { count: 3, .. }
        ));
    }

    #[test]
    fn enumerated_variants_bracket_the_known_range() {
        let ma = model("Session-State", 277, DataType::Enumerated);
        let variants = non_grouped_variants(&ma);
        assert_eq!(variants[0].0, (-1i32).to_be_bytes().to_vec());
        assert_eq!(variants[1].0, (3i32).to_be_bytes().to_vec());
    }

    #[test]
    fn utf8_variants_include_overlong_and_format_specifier_payloads() {
        let ma = model("User-Name", 1, DataType::UTF8String);
        let variants = non_grouped_variants(&ma);
        assert!(variants.iter().any(|(d, desc)| d == &vec![0xc0, 0xaf] && desc == "UTF8String overlong"));
        assert!(variants
            .iter()
            .any(|(d, desc)| desc.contains("format specifier") && d.len() == "%4096$n".len() * 1024));
    }

    #[test]
    fn analyze_is_deterministic_over_a_tagged_capture() {
        let session_id = model("Session-Id", 263, DataType::UTF8String);
        let origin_host = model("Origin-Host", 264, DataType::DiameterIdentity);

        let mut cer = Msg::new(257, 0, true);
        let mut session_avp = Avp::utf8(263, 0, "abc;1;2");
        session_avp.qualified_avp = Some(QualifiedAvp {
            name: "Session-Id".to_string(),
            semantics: Semantics::Fixed,
            multiple: false,
            min: None,
            max: None,
            resolved: Some((263, 0)),
        });
        session_avp.model_avp = Some(session_id);
        cer.avps.push(session_avp);

        let mut host_avp = Avp::utf8(264, 0, "client.test");
        host_avp.qualified_avp = Some(QualifiedAvp {
            name: "Origin-Host".to_string(),
            semantics: Semantics::Required,
            multiple: false,
            min: None,
            max: None,
            resolved: Some((264, 0)),
        });
        host_avp.model_avp = Some(origin_host);
        cer.avps.push(host_avp);

        let sequence = vec![(cer, true)];

        let first = analyze(&sequence);
        let second = analyze(&sequence);
        assert_eq!(first, second, "enumeration over the same capture must be deterministic");
        assert!(!first.is_empty());
        // both AVPs are non-Grouped and not Enumerated, so only the shared
        // value-variant set applies to each, in message order.
        assert!(first.iter().all(|d| d.anchor.index == 0 && d.anchor.code == 257));
    }

    #[test]
    fn proprietary_sweep_enumerates_requested_code_range() {
        let msg = Msg::new(280, 0, true);
        let seq = vec![(msg, true)];
        let descriptors: Vec<_> = proprietary_sweep(&seq, 10415, 100, 103).collect();
        assert_eq!(descriptors.len(), 3);
        assert_eq!(
            descriptors[0].action,
            MutationAction::AppendProprietaryAvp { code: 100, vendor: 10415 }
        );
    }
}
