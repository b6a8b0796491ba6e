//! Recursive `model_avp`/`qualified_avp` annotation of a decoded wire
//! message, grounded on `original_source/Dia.py`'s `Directory.tag`
//! (spec.md §4.3 "Tagging").

use crate::dictionary::{Directory, QualifiedAvp};
use crate::error::{Result, TagError};
use crate::message::{Avp, Msg};

/// Tag `msg` in place against `dir`. Every wire AVP gets a `qualified_avp`
/// (the CCF slot it filled, if any) and a `model_avp` (the dictionary AVP
/// definition, if known); unrecognised AVPs get both set to `None`.
pub fn tag(msg: &mut Msg, dir: &Directory) -> Result<()> {
    let candidates = dir.find_msgs(msg.app_id, msg.code, msg.request)?;
    match candidates.len() {
        0 => {
            return Err(TagError::NonSpecifiedMsg {
                app_id: msg.app_id,
                code: msg.code,
                is_request: msg.request,
            }
            .into())
        }
        1 => {}
        count => {
            return Err(TagError::MultipleSpecifiedMsg {
                app_id: msg.app_id,
                code: msg.code,
                is_request: msg.request,
                count,
            }
            .into())
        }
    }

    let model = &candidates[0];
    tag_avps(&mut msg.avps, &model.avps, dir);
    Ok(())
}

fn find_matching_qa<'a>(avp: &Avp, model_qavps: &'a [QualifiedAvp]) -> Option<&'a QualifiedAvp> {
    let wildcard = model_qavps.iter().find(|qa| qa.name == "AVP");
    let identity = avp.identity();

    model_qavps
        .iter()
        .find(|qa| qa.resolved == Some(identity))
        .or(wildcard)
}

fn tag_avps(wire_avps: &mut [Avp], model_qavps: &[QualifiedAvp], dir: &Directory) {
    for a in wire_avps.iter_mut() {
        let qa = find_matching_qa(a, model_qavps).cloned();

        let model_avp = match &qa {
            Some(qa) if qa.resolved.is_some() => {
                let (code, vendor) = qa.resolved.unwrap();
                dir.avp_by_identity(code, vendor)
            }
            _ => {
                let (code, vendor) = a.identity();
                dir.avp_by_identity(code, vendor)
            }
        };

        a.qualified_avp = qa;

        if let Some(model_avp) = &model_avp {
            if model_avp.datatype == crate::dictionary::DataType::Grouped {
                tag_avps(&mut a.avps, &model_avp.grouped, dir);
            }
        }

        a.model_avp = model_avp;
    }
}
