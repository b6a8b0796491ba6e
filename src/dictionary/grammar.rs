//! Textual grammar for `.dia` files (spec.md §4.1).
//!
//! This module only tokenizes and parses into raw, unresolved records; cross
//! reference resolution (inheritance, enum/grouped attachment, vendor id
//! stamping) happens in [`super::Application::load`].

use crate::error::DictionaryError;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;

use super::model::Semantics;

/// A CCF numeric token, matching what Python's `int(x, 0)` accepts:
/// `0x`/`0o`/`0b`-prefixed literals as well as bare decimal
/// (`original_source/Dia.py` parses every CCF code/appid/vendor/occurrence
/// token this way).
const NUM: &str = r"0[xX][0-9a-fA-F]+|0[oO][0-7]+|0[bB][01]+|\d+";

lazy_static! {
    static ref SECTION: Regex =
        Regex::new(r"(?ms)^@(\w+)((?:[ \t]+[a-zA-Z0-9_-]+)*)[ \t]*$([^@]*)").unwrap();
    static ref SECTION_ARG: Regex = Regex::new(r"[a-zA-Z0-9_-]+").unwrap();
    static ref QUAL_AVP: Regex = Regex::new(&format!(
        r"^\s*({NUM})?\s*(\*)?\s*({NUM})?\s*([\[{{<])\s*([a-zA-Z0-9-]+)\s*([\]}}>])\s*$"
    ))
    .unwrap();
    static ref CMD_DEF: Regex = Regex::new(&format!(
        r"(?i)\s*([a-zA-Z0-9-]+)\s*::\s*=\s*<\s*Diameter[- ]Header\s*:\s*({NUM})((?:\s*,\s*(?:REQ|PXY|ERR))*)(?:\s*,\s*({NUM}))?\s*>"
    ))
    .unwrap();
    static ref CMD_FLAG: Regex = Regex::new(r"\s*,\s*(REQ|PXY|ERR)").unwrap();
    static ref GAV_DEF: Regex = Regex::new(&format!(
        r"\s*([a-zA-Z0-9-]+)\s*::\s*=\s*<\s*AVP[- ][Hh]eader\s*:\s*({NUM})(?:\s*,?\s*({NUM}))?\s*>"
    ))
    .unwrap();
}

/// Parse a numeric literal the way `int(x, 0)` would: `0x`/`0X` hex,
/// `0o`/`0O` octal, `0b`/`0B` binary, otherwise decimal.
pub fn parse_int_literal(s: &str) -> Option<i64> {
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(rest, 16).ok()?
    } else if let Some(rest) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        i64::from_str_radix(rest, 8).ok()?
    } else if let Some(rest) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        i64::from_str_radix(rest, 2).ok()?
    } else {
        digits.parse().ok()?
    };
    Some(if neg { -value } else { value })
}

/// [`parse_int_literal`] narrowed to `u32`, for the unsigned CCF
/// code/vendor/appid/occurrence tokens.
pub fn parse_u32_literal(s: &str) -> Option<u32> {
    u32::try_from(parse_int_literal(s)?).ok()
}

/// One `@name arg1 arg2\n...body...` block.
#[derive(Debug)]
pub struct RawSection {
    pub name: String,
    pub args: Vec<String>,
    pub body: String,
}

/// Split a `.dia` file into top-level `@`-introduced sections.
pub fn split_sections(whole: &str) -> Vec<RawSection> {
    SECTION
        .captures_iter(whole)
        .map(|caps| {
            let name = caps[1].to_string();
            let args = SECTION_ARG
                .find_iter(&caps[2])
                .map(|m| m.as_str().to_string())
                .collect();
            let body = caps[3].to_string();
            RawSection { name, args, body }
        })
        .collect()
}

/// Strip `;`-comments and blank lines, matching `original_source/Dia.py`'s
/// `tokenize`.
pub fn tokenize(body: &str) -> Vec<String> {
    body.lines()
        .map(|l| {
            let l = l.trim_end_matches(['\r']);
            match l.find(';') {
                Some(idx) => &l[..idx],
                None => l,
            }
        })
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

#[derive(Debug)]
pub struct RawQualifiedAvp {
    pub multiple: bool,
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub semantics: Semantics,
    pub name: String,
}

/// Parse one Qualified-AVP line: `[min] [*] [max] (<name>|{name}|[name])`.
/// Returns `Ok(None)` only for lines that aren't even a candidate (callers
/// use this to detect "this line starts a new CCF header instead");
/// anything that looks like a qualifier but doesn't parse is a hard error,
/// per spec.md §9 Open Question 2 (the original silently dropped these).
pub fn parse_qualified_avp(line: &str) -> Result<Option<RawQualifiedAvp>, DictionaryError> {
    let Some(caps) = QUAL_AVP.captures(line) else {
        return Ok(None);
    };

    let min = caps
        .get(1)
        .map(|m| {
            parse_u32_literal(m.as_str())
                .ok_or_else(|| DictionaryError::InvalidAvpQualifier(line.to_string()))
        })
        .transpose()?;
    let multiple = caps.get(2).is_some();
    let max = caps
        .get(3)
        .map(|m| {
            parse_u32_literal(m.as_str())
                .ok_or_else(|| DictionaryError::InvalidAvpQualifier(line.to_string()))
        })
        .transpose()?;
    let open = &caps[4];
    let close = &caps[6];
    let name = caps[5].to_string();

    let semantics = match (open, close) {
        ("<", ">") => Semantics::Fixed,
        ("[", "]") => Semantics::Optional,
        ("{", "}") => Semantics::Required,
        _ => return Err(DictionaryError::InvalidAvpQualifier(line.to_string())),
    };

    Ok(Some(RawQualifiedAvp {
        multiple,
        min,
        max,
        semantics,
        name,
    }))
}

#[derive(Debug)]
pub struct RawCcfHeader {
    pub name: String,
    pub code: u32,
    pub request: bool,
    pub proxyable: bool,
    pub error: bool,
    pub appid: Option<u32>,
}

/// Parse `<Name> ::= <Diameter Header: code[, FLAG]*[, appid]>`. Angle
/// brackets around `Name` are optional (RFC 6733 itself is inconsistent,
/// spec.md §4.1). `Ok(None)` means the line isn't even a candidate; a line
/// that matches the header shape but carries an out-of-range code/appid is
/// a hard error rather than a silent non-match.
pub fn parse_ccf_header(line: &str) -> Result<Option<RawCcfHeader>, DictionaryError> {
    let Some(caps) = CMD_DEF.captures(line) else {
        return Ok(None);
    };
    let name = caps[1].trim_start_matches('<').trim_end_matches('>').to_string();
    let code = parse_u32_literal(&caps[2])
        .ok_or_else(|| DictionaryError::NumericLiteralOutOfRange(caps[2].to_string()))?;
    let flags = &caps[3];

    let mut request = false;
    let mut proxyable = false;
    let mut error = false;
    for flag_caps in CMD_FLAG.captures_iter(flags) {
        match &flag_caps[1] {
            "REQ" => request = true,
            "PXY" => proxyable = true,
            "ERR" => error = true,
            _ => unreachable!(),
        }
    }

    let appid = caps
        .get(4)
        .map(|m| {
            parse_u32_literal(m.as_str())
                .ok_or_else(|| DictionaryError::NumericLiteralOutOfRange(m.as_str().to_string()))
        })
        .transpose()?;

    Ok(Some(RawCcfHeader {
        name,
        code,
        request,
        proxyable,
        error,
        appid,
    }))
}

#[derive(Debug)]
pub struct RawGavHeader {
    pub name: String,
    pub code: u32,
    pub vendor_id: Option<u32>,
}

/// Parse `<Name> ::= <AVP-Header: code[, vendor]>`. `Ok(None)` means the
/// line isn't even a candidate; a line that matches the header shape but
/// carries an out-of-range code/vendor is a hard error.
pub fn parse_gav_header(line: &str) -> Result<Option<RawGavHeader>, DictionaryError> {
    let Some(caps) = GAV_DEF.captures(line) else {
        return Ok(None);
    };
    let name = caps[1].to_string();
    let code = parse_u32_literal(&caps[2])
        .ok_or_else(|| DictionaryError::NumericLiteralOutOfRange(caps[2].to_string()))?;
    let vendor_id = caps
        .get(3)
        .map(|m| {
            parse_u32_literal(m.as_str())
                .ok_or_else(|| DictionaryError::NumericLiteralOutOfRange(m.as_str().to_string()))
        })
        .transpose()?;
    Ok(Some(RawGavHeader {
        name,
        code,
        vendor_id,
    }))
}

/// Parse a `@messages` or `@grouped` body: a sequence of `(header, qualified
/// AVPs until next header)` blocks (spec.md §4.1; `original_source/Dia.py`
/// `parse_6733`). `parse_header` recognises the header line; any
/// non-blank, non-header line that isn't a valid qualified-AVP line is a
/// hard parse error.
pub fn parse_blocks<H>(
    path: &Path,
    body: &str,
    parse_header: impl Fn(&str) -> Result<Option<H>, DictionaryError>,
) -> Result<Vec<(H, Vec<RawQualifiedAvp>)>, DictionaryError> {
    let mut blocks = Vec::new();
    let mut ongoing: Option<H> = None;
    let mut avps = Vec::new();

    for line in tokenize(body) {
        if ongoing.is_none() {
            let header = parse_header(&line)?.ok_or_else(|| DictionaryError::UnmatchedCcfLine {
                path: path.to_path_buf(),
                line: line.clone(),
            })?;
            ongoing = Some(header);
            avps = Vec::new();
            continue;
        }

        if let Some(qa) = parse_qualified_avp(&line)? {
            avps.push(qa);
            continue;
        }

        match parse_header(&line)? {
            Some(next_header) => {
                blocks.push((ongoing.take().unwrap(), std::mem::take(&mut avps)));
                ongoing = Some(next_header);
            }
            None => {
                return Err(DictionaryError::UnmatchedCcfLine {
                    path: path.to_path_buf(),
                    line,
                });
            }
        }
    }

    if let Some(header) = ongoing {
        blocks.push((header, avps));
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_strips_comments_and_blanks() {
        let body = "foo ; this is a comment\n\nbar\n  ; only comment\nbaz  \r\n";
        let toks = tokenize(body);
        assert_eq!(toks, vec!["foo ".to_string(), "bar".to_string(), "baz  ".to_string()]);
    }

    #[test]
    fn split_sections_finds_each_block() {
        let whole = "@id 0\n@name Base\n@avp_types\nSession-Id 263 UTF8String M\n";
        let sections = split_sections(whole);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].name, "id");
        assert_eq!(sections[0].args, vec!["0"]);
        assert_eq!(sections[2].name, "avp_types");
        assert!(sections[2].body.contains("Session-Id"));
    }

    #[test]
    fn parses_fixed_required_optional_qualifiers() {
        let fixed = parse_qualified_avp("<Session-Id>").unwrap().unwrap();
        assert_eq!(fixed.semantics, Semantics::Fixed);
        assert!(!fixed.multiple);

        let required = parse_qualified_avp("1*3{Proxy-Info}").unwrap().unwrap();
        assert_eq!(required.semantics, Semantics::Required);
        assert!(required.multiple);
        assert_eq!(required.min, Some(1));
        assert_eq!(required.max, Some(3));

        let optional = parse_qualified_avp("*[AVP]").unwrap().unwrap();
        assert_eq!(optional.semantics, Semantics::Optional);
        assert!(optional.multiple);
        assert_eq!(optional.min, None);
        assert_eq!(optional.max, None);
    }

    #[test]
    fn parses_ccf_header_with_and_without_angle_brackets() {
        let h1 = parse_ccf_header("CER ::= < Diameter Header: 257, REQ, PXY >").unwrap().unwrap();
        assert_eq!(h1.name, "CER");
        assert_eq!(h1.code, 257);
        assert!(h1.request);
        assert!(h1.proxyable);
        assert!(!h1.error);
        assert_eq!(h1.appid, None);

        let h2 = parse_ccf_header("<DWR> ::= < Diameter Header: 280, REQ >").unwrap().unwrap();
        assert_eq!(h2.name, "DWR");
        assert!(h2.request);
    }

    #[test]
    fn parses_grouped_header() {
        let h = parse_gav_header("Subscription-Id ::= < AVP Header: 443, 10415 >").unwrap().unwrap();
        assert_eq!(h.name, "Subscription-Id");
        assert_eq!(h.code, 443);
        assert_eq!(h.vendor_id, Some(10415));
    }

    #[test]
    fn non_qualifier_line_is_not_a_candidate() {
        let result = parse_qualified_avp("(Session-Id)");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn mismatched_brackets_are_a_hard_error() {
        let result = parse_qualified_avp("[Session-Id>");
        assert!(result.is_err());
    }

    #[test]
    fn parse_int_literal_accepts_hex_octal_binary_and_decimal() {
        assert_eq!(parse_int_literal("0x28af"), Some(0x28af));
        assert_eq!(parse_int_literal("0o17"), Some(0o17));
        assert_eq!(parse_int_literal("0b101"), Some(0b101));
        assert_eq!(parse_int_literal("10415"), Some(10415));
        assert_eq!(parse_int_literal("-5"), Some(-5));
        assert_eq!(parse_int_literal("not-a-number"), None);
    }

    #[test]
    fn ccf_header_accepts_hex_code_and_appid() {
        let h = parse_ccf_header("CER ::= < Diameter Header: 0x101, REQ, 0x0 >").unwrap().unwrap();
        assert_eq!(h.code, 0x101);
        assert_eq!(h.appid, Some(0));
    }

    #[test]
    fn gav_header_accepts_hex_vendor_id() {
        let h = parse_gav_header("Subscription-Id ::= < AVP Header: 443, 0x28af >").unwrap().unwrap();
        assert_eq!(h.code, 443);
        assert_eq!(h.vendor_id, Some(0x28af));
    }

    #[test]
    fn qualifier_occurrence_bounds_accept_hex() {
        let qa = parse_qualified_avp("0x1*0x3{Proxy-Info}").unwrap().unwrap();
        assert_eq!(qa.min, Some(1));
        assert_eq!(qa.max, Some(3));
    }
}
