//! Path addressing into a decoded message: `/code=N[,vendor=N][[idx]]`
//! steps, one per tree level (spec.md §4.2 "Path addressing").
//!
//! A trailing step with no index selects *every* AVP sharing that
//! `(code, vendor)` when the operation acts on a whole group (suppress,
//! overflow); the same step selects exactly one (by index, default 0)
//! when the operation needs a single target to descend into or replace
//! (eval, modify). This mirrors `original_source/Diameter.py`'s
//! `get_matcher` (group-wide, index-blind) vs `get_filter` (index-aware).

use super::avp::Avp;
use super::header::Msg;
use crate::error::{MutationError, Result};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy)]
pub struct PathStep {
    pub code: u32,
    pub vendor: u32,
    pub index: Option<usize>,
}

fn step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^code=(\d+)(?:,vendor=(\d+))?(?:\[(\d+)\])?$").unwrap()
    })
}

pub fn parse_path(path: &str) -> Result<Vec<PathStep>> {
    let mut parts = path.split('/');
    match parts.next() {
        Some("") => {}
        _ => return Err(MutationError::MalformedPath(path.to_string()).into()),
    }

    let mut steps = Vec::new();
    for elm in parts {
        let caps = step_re()
            .captures(elm)
            .ok_or_else(|| MutationError::MalformedPath(path.to_string()))?;
        let code: u32 = caps[1].parse().unwrap();
        let vendor: u32 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap())
            .unwrap_or(0);
        let index = caps.get(3).map(|m| m.as_str().parse().unwrap());
        steps.push(PathStep { code, vendor, index });
    }

    if steps.is_empty() {
        return Err(MutationError::MalformedPath(path.to_string()).into());
    }
    Ok(steps)
}

fn select_one<'a>(avps: &'a [Avp], step: &PathStep) -> Result<&'a Avp> {
    let matching: Vec<&Avp> = avps
        .iter()
        .filter(|a| a.identity() == (step.code, step.vendor))
        .collect();
    let index = step.index.unwrap_or(0);
    matching.get(index).copied().ok_or_else(|| {
        MutationError::PathNotFound(format!(
            "code={},vendor={}[{}]",
            step.code, step.vendor, index
        ))
        .into()
    })
}

fn select_one_mut<'a>(avps: &'a mut [Avp], step: &PathStep) -> Result<&'a mut Avp> {
    let index = step.index.unwrap_or(0);
    let mut seen = 0usize;
    for a in avps.iter_mut() {
        if a.identity() == (step.code, step.vendor) {
            if seen == index {
                return Ok(a);
            }
            seen += 1;
        }
    }
    Err(MutationError::PathNotFound(format!("code={},vendor={}[{}]", step.code, step.vendor, index)).into())
}

impl Msg {
    pub fn eval_path(&self, path: &str) -> Result<&Avp> {
        let steps = parse_path(path)?;
        let mut avp = select_one(&self.avps, &steps[0])?;
        for step in &steps[1..] {
            avp = select_one(&avp.avps, step)?;
        }
        Ok(avp)
    }

    /// Traverse down to the target, unpinning every intermediate node's
    /// length, then replace the target's data (spec.md §4.2).
    pub fn modify_value(&mut self, path: &str, value: Vec<u8>) -> Result<()> {
        let steps = parse_path(path)?;
        self.length = None;
        let mut avp = select_one_mut(&mut self.avps, &steps[0])?;
        avp.length = None;
        for step in &steps[1..] {
            require_group(avp)?;
            avp = select_one_mut(&mut avp.avps, step)?;
            avp.length = None;
        }
        avp.data = value;
        avp.avps = Vec::new();
        Ok(())
    }

    /// Remove every AVP matching the final step's `(code, vendor)`.
    pub fn suppress_avps(&mut self, path: &str) -> Result<()> {
        let steps = parse_path(path)?;
        self.length = None;
        if steps.len() == 1 {
            let step = steps[0];
            self.avps
                .retain(|a| !(a.identity() == (step.code, step.vendor)));
            return Ok(());
        }
        let mut avp = select_one_mut(&mut self.avps, &steps[0])?;
        avp.length = None;
        for step in &steps[1..steps.len() - 1] {
            require_group(avp)?;
            avp = select_one_mut(&mut avp.avps, step)?;
            avp.length = None;
        }
        require_group(avp)?;
        let last = steps[steps.len() - 1];
        avp.avps
            .retain(|a| !(a.identity() == (last.code, last.vendor)));
        Ok(())
    }

    /// Pad the group matching the final step's `(code, vendor)` out to
    /// `count` entries by repeating its last member (spec.md §4.4
    /// "structural overpresence").
    pub fn overflow_avps(&mut self, path: &str, count: usize) -> Result<()> {
        let steps = parse_path(path)?;
        self.length = None;
        if steps.len() == 1 {
            return overflow_group(&mut self.avps, &steps[0], count);
        }
        let mut avp = select_one_mut(&mut self.avps, &steps[0])?;
        avp.length = None;
        for step in &steps[1..steps.len() - 1] {
            require_group(avp)?;
            avp = select_one_mut(&mut avp.avps, step)?;
            avp.length = None;
        }
        require_group(avp)?;
        overflow_group(&mut avp.avps, &steps[steps.len() - 1], count)
    }
}

/// A path step can only descend into (or act on the group membership of)
/// an AVP that already carries children, i.e. was decoded or built as a
/// grouped AVP (spec.md §7 "path does not select a parent that permits
/// the edit").
fn require_group(avp: &Avp) -> Result<()> {
    if avp.avps.is_empty() {
        return Err(MutationError::PathNotEditable(format!(
            "code={},vendor={}",
            avp.code, avp.vendor
        ))
        .into());
    }
    Ok(())
}

fn overflow_group(avps: &mut Vec<Avp>, step: &PathStep, count: usize) -> Result<()> {
    let existing: Vec<usize> = avps
        .iter()
        .enumerate()
        .filter(|(_, a)| a.identity() == (step.code, step.vendor))
        .map(|(i, _)| i)
        .collect();
    if existing.is_empty() {
        return Err(MutationError::PathNotFound(format!("code={},vendor={}", step.code, step.vendor)).into());
    }
    let last = avps[*existing.last().unwrap()].clone();
    for _ in existing.len()..count {
        avps.push(last.clone());
    }
    Ok(())
}

/// Canonical path of every AVP in the tree, pre-order depth-first,
/// matching `original_source/mutate.py`'s `unfold_avps`/`get_path` (the
/// algorithm actually used for mutation targeting; fixes the unrelated
/// `Avp.compute_path`'s uninitialized `seen` counter by not using that
/// method at all).
pub fn unfold(msg: &Msg) -> Vec<(String, Vec<usize>)> {
    let mut out = Vec::new();
    explode(&msg.avps, String::new(), Vec::new(), &mut out);
    out
}

/// `/code=N[,vendor=N][[idx]]` segment for `siblings[i]`, matching
/// `original_source/mutate.py`'s `get_path` (index only appears when more
/// than one sibling shares `(code, vendor)`).
pub fn segment_for(siblings: &[Avp], i: usize) -> String {
    let key = siblings[i].identity();
    let group: Vec<usize> = siblings
        .iter()
        .enumerate()
        .filter(|(_, a)| a.identity() == key)
        .map(|(j, _)| j)
        .collect();

    let mut segment = format!("code={}", key.0);
    if key.1 != 0 {
        segment.push_str(&format!(",vendor={}", key.1));
    }
    if group.len() != 1 {
        let idx_in_group = group.iter().position(|&j| j == i).unwrap();
        segment.push_str(&format!("[{idx_in_group}]"));
    }
    segment
}

fn explode(
    siblings: &[Avp],
    prefix: String,
    trail: Vec<usize>,
    out: &mut Vec<(String, Vec<usize>)>,
) {
    for (i, a) in siblings.iter().enumerate() {
        let path = format!("{prefix}/{}", segment_for(siblings, i));
        let mut child_trail = trail.clone();
        child_trail.push(i);
        out.push((path.clone(), child_trail.clone()));

        if !a.avps.is_empty() {
            explode(&a.avps, path, child_trail, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_with(avps: Vec<Avp>) -> Msg {
        let mut m = Msg::new(280, 0, true);
        m.avps = avps;
        m
    }

    #[test]
    fn unfold_indexes_only_duplicated_groups() {
        let msg = msg_with(vec![
            Avp::octets(280, 0, b"toto".to_vec()),
            Avp::octets(280, 0, b"toto".to_vec()),
            Avp::octets(280, 0, b"tata".to_vec()),
        ]);
        let paths: Vec<String> = unfold(&msg).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["/code=280[0]", "/code=280[1]", "/code=280[2]"]);
    }

    #[test]
    fn unfold_omits_index_when_unique() {
        let msg = msg_with(vec![
            Avp::octets(280, 0, b"toto".to_vec()),
            Avp::octets(281, 0, b"toto".to_vec()),
        ]);
        let paths: Vec<String> = unfold(&msg).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["/code=280", "/code=281"]);
    }

    #[test]
    fn eval_path_selects_by_index() {
        let msg = msg_with(vec![
            Avp::octets(280, 0, b"toto".to_vec()),
            Avp::octets(280, 0, b"titi".to_vec()),
            Avp::octets(280, 0, b"tata".to_vec()),
        ]);
        assert_eq!(msg.eval_path("/code=280[2]").unwrap().data, b"tata");
        assert_eq!(msg.eval_path("/code=280,vendor=0[1]").unwrap().data, b"titi");
    }

    #[test]
    fn suppress_avps_removes_whole_group() {
        let mut msg = msg_with(vec![
            Avp::octets(280, 0, b"toto".to_vec()),
            Avp::octets(280, 0, b"titi".to_vec()),
            Avp::octets(281, 0, b"tata".to_vec()),
        ]);
        msg.suppress_avps("/code=280").unwrap();
        assert_eq!(msg.avps.len(), 1);
        assert_eq!(msg.avps[0].code, 281);
    }

    #[test]
    fn overflow_avps_pads_to_count() {
        let mut msg = msg_with(vec![Avp::octets(280, 0, b"toto".to_vec())]);
        msg.overflow_avps("/code=280", 4).unwrap();
        assert_eq!(msg.avps.len(), 4);
        assert!(msg.avps.iter().all(|a| a.data == b"toto"));
    }

    #[test]
    fn suppress_avps_rejects_non_group_parent() {
        let mut msg = msg_with(vec![Avp::octets(280, 0, b"toto".to_vec())]);
        let err = msg.suppress_avps("/code=280/code=281").unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Mutation(MutationError::PathNotEditable(_))
        ));
    }

    #[test]
    fn overflow_avps_rejects_non_group_parent() {
        let mut msg = msg_with(vec![Avp::octets(280, 0, b"toto".to_vec())]);
        let err = msg.overflow_avps("/code=280/code=281", 3).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Mutation(MutationError::PathNotEditable(_))
        ));
    }
}
