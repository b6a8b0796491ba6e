//! Wire AVP: the generic `code/flags/vendor/data` tree spec.md §3 calls the
//! "wire AVP", as opposed to the dictionary AVP in [`crate::dictionary`].
//!
//! Unlike the dictionary's per-datatype builders, a wire AVP carries raw
//! bytes and an optional nested tree; grouped AVPs are auto-detected on
//! decode rather than requiring the caller to know the datatype up front
//! (spec.md §4.2 "Tolerant recursive grouped-AVP detection").

use crate::dictionary;
use crate::error::{CodecError, Result};
use std::io::{Read, Seek, Write};
use std::sync::Arc;

const VENDOR_FLAG: u8 = 0x80;
const MANDATORY_FLAG: u8 = 0x40;
const PRIVATE_FLAG: u8 = 0x20;
const AVP_HEADER_LEN: u32 = 8;
const MIN_BYTES_TO_TRY_GROUPED: usize = 12;

/// A Diameter AVP as it appears on the wire (spec.md §3 "Avp (wire type)").
#[derive(Debug, Clone)]
pub struct Avp {
    pub code: u32,
    pub vendor_flag: bool,
    pub mandatory: bool,
    pub private: bool,
    pub reserved: u8,
    pub vendor: u32,
    pub data: Vec<u8>,
    pub avps: Vec<Avp>,
    /// `None` until encoded once; cleared by any mutation so length is
    /// always recomputed (spec.md §4.2 "Length pinning").
    pub length: Option<u32>,
    /// Dictionary AVP this wire AVP was matched against by the tagger.
    pub model_avp: Option<Arc<dictionary::Avp>>,
    /// CCF slot (semantics/multiplicity) this wire AVP filled in its parent.
    pub qualified_avp: Option<dictionary::QualifiedAvp>,
}

impl Avp {
    fn new(code: u32, vendor: u32, mandatory: bool, data: Vec<u8>) -> Avp {
        Avp {
            code,
            vendor_flag: vendor != 0,
            mandatory,
            private: false,
            reserved: 0,
            vendor,
            data,
            avps: Vec::new(),
            length: None,
            model_avp: None,
            qualified_avp: None,
        }
    }

    pub fn u32(code: u32, vendor: u32, value: u32) -> Avp {
        Avp::new(code, vendor, true, value.to_be_bytes().to_vec())
    }

    pub fn s32(code: u32, vendor: u32, value: i32) -> Avp {
        Avp::new(code, vendor, true, value.to_be_bytes().to_vec())
    }

    pub fn u64(code: u32, vendor: u32, value: u64) -> Avp {
        Avp::new(code, vendor, true, value.to_be_bytes().to_vec())
    }

    pub fn f32(code: u32, vendor: u32, value: f32) -> Avp {
        Avp::new(code, vendor, true, value.to_be_bytes().to_vec())
    }

    pub fn f64(code: u32, vendor: u32, value: f64) -> Avp {
        Avp::new(code, vendor, true, value.to_be_bytes().to_vec())
    }

    pub fn octets(code: u32, vendor: u32, data: Vec<u8>) -> Avp {
        Avp::new(code, vendor, true, data)
    }

    pub fn utf8(code: u32, vendor: u32, s: &str) -> Avp {
        Avp::new(code, vendor, true, s.as_bytes().to_vec())
    }

    pub fn grouped(code: u32, vendor: u32, avps: Vec<Avp>) -> Avp {
        let mut avp = Avp::new(code, vendor, true, Vec::new());
        avp.avps = avps;
        avp
    }

    pub fn identity(&self) -> (u32, u32) {
        (self.code, if self.vendor_flag { self.vendor } else { 0 })
    }

    /// Deep-clone that unpins (`length = None`) every node in the tree, so
    /// the clone is safe to mutate without disturbing the source's pinned
    /// lengths (spec.md §4.2 "Deep-clone semantics"). A derived `Clone`
    /// would copy `length` verbatim and desync it from a later edit.
    pub fn deep_clone(&self) -> Avp {
        Avp {
            code: self.code,
            vendor_flag: self.vendor_flag,
            mandatory: self.mandatory,
            private: self.private,
            reserved: self.reserved,
            vendor: self.vendor,
            data: self.data.clone(),
            avps: self.avps.iter().map(Avp::deep_clone).collect(),
            length: None,
            model_avp: self.model_avp.clone(),
            qualified_avp: self.qualified_avp.clone(),
        }
    }

    /// Build a `depth`-deep stack of nested self-copies and return its wire
    /// encoding, installed as this AVP's value via `Msg::modify_value`
    /// (spec.md §4.4 "Deep self-stacking", gated on `allows_stacking()`).
    pub fn overflow_stacking(&self, depth: usize) -> Vec<u8> {
        let mut new_avp = self.deep_clone();
        for _ in 0..depth {
            let mut stack_avp = self.deep_clone();
            stack_avp.length = None;
            stack_avp.avps.push(new_avp);
            new_avp = stack_avp;
        }

        let mut data = Vec::new();
        for a in &self.avps {
            a.encode_to(&mut data).expect("encoding into a Vec<u8> cannot fail");
        }
        new_avp
            .encode_to(&mut data)
            .expect("encoding into a Vec<u8> cannot fail");
        data
    }

    /// Recursively yield this AVP and every descendant, pre-order, matching
    /// `original_source/Diameter.py`'s `Avp.all_avps`.
    pub fn all_avps(&self) -> Box<dyn Iterator<Item = &Avp> + '_> {
        Box::new(
            std::iter::once(self).chain(self.avps.iter().flat_map(|a| a.all_avps())),
        )
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R) -> Result<Avp> {
        let mut header = [0u8; 8];
        reader
            .read_exact(&mut header)
            .map_err(|_| CodecError::TruncatedAvpHeader)?;

        let code = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let flag_byte = header[4];
        let vendor_flag = flag_byte & VENDOR_FLAG != 0;
        let mandatory = flag_byte & MANDATORY_FLAG != 0;
        let private = flag_byte & PRIVATE_FLAG != 0;
        let reserved = flag_byte & 0x1f;

        let length = u32::from_be_bytes([0, header[5], header[6], header[7]]);

        let mut header_len = AVP_HEADER_LEN;
        let vendor = if vendor_flag {
            let mut v = [0u8; 4];
            reader
                .read_exact(&mut v)
                .map_err(|_| CodecError::TruncatedAvpHeader)?;
            header_len += 4;
            u32::from_be_bytes(v)
        } else {
            0
        };

        if length < header_len {
            return Err(CodecError::InvalidAvpLength(length).into());
        }
        let data_len = (length - header_len) as usize;

        let mut data = vec![0u8; data_len];
        reader.read_exact(&mut data).map_err(|_| {
            CodecError::IncompleteBuffer {
                expected: data_len,
                actual: 0,
            }
        })?;

        let padded_len = if data_len % 4 != 0 { data_len + (4 - data_len % 4) } else { data_len };
        let padding = padded_len - data_len;
        if padding > 0 {
            let mut pad = vec![0u8; padding];
            reader
                .read_exact(&mut pad)
                .map_err(|_| CodecError::TruncatedAvpHeader)?;
        }

        let mut avp = Avp {
            code,
            vendor_flag,
            mandatory,
            private,
            reserved,
            vendor,
            data: data.clone(),
            avps: Vec::new(),
            length: Some(length),
            model_avp: None,
            qualified_avp: None,
        };

        if data_len >= MIN_BYTES_TO_TRY_GROUPED {
            if let Some(children) = try_decode_grouped(&data) {
                avp.avps = children;
                avp.data = Vec::new();
            }
        }

        Ok(avp)
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.code.to_be_bytes())?;

        let mut flags = 0u8;
        if self.vendor_flag {
            flags |= VENDOR_FLAG;
        }
        if self.mandatory {
            flags |= MANDATORY_FLAG;
        }
        if self.private {
            flags |= PRIVATE_FLAG;
        }
        flags |= self.reserved & 0x1f;
        writer.write_all(&[flags])?;

        let mut content = Vec::new();
        if !self.avps.is_empty() {
            for child in &self.avps {
                child.encode_to(&mut content)?;
            }
        } else {
            content.extend_from_slice(&self.data);
        }

        let header_len = if self.vendor_flag { AVP_HEADER_LEN + 4 } else { AVP_HEADER_LEN };
        let length = self.length.unwrap_or(header_len + content.len() as u32);
        writer.write_all(&length.to_be_bytes()[1..])?;

        if self.vendor_flag {
            writer.write_all(&self.vendor.to_be_bytes())?;
        }

        writer.write_all(&content)?;

        let padding = (4 - (length as usize % 4)) % 4;
        if padding > 0 {
            writer.write_all(&vec![0u8; padding])?;
        }

        Ok(())
    }
}

/// Try to parse `data` as a fully-consumed, 4-byte-aligned sequence of
/// child AVPs. Returns `None` on any decode error or leftover bytes, in
/// which case the caller keeps `data` as an opaque leaf (spec.md §4.2).
fn try_decode_grouped(data: &[u8]) -> Option<Vec<Avp>> {
    let mut cursor = std::io::Cursor::new(data);
    let mut children = Vec::new();

    while (cursor.position() as usize) < data.len() {
        let before = cursor.position();
        let child = Avp::decode_from(&mut cursor).ok()?;
        if cursor.position() <= before {
            return None;
        }
        children.push(child);
    }

    if cursor.position() as usize != data.len() {
        return None;
    }

    Some(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn unpadded_avp_round_trips() {
        let bytes = hex("0000012b4000000c00000000");
        let mut cursor = std::io::Cursor::new(&bytes);
        let avp = Avp::decode_from(&mut cursor).unwrap();
        assert_eq!(avp.code, 0x12b);
        let mut out = Vec::new();
        avp.encode_to(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn padded_avp_round_trips() {
        let bytes = hex(
            "0000010d400000334d75205365727669636520416e616c797a6572204469616d6574657220496d706c656d656e746174696f6e00",
        );
        let mut cursor = std::io::Cursor::new(&bytes);
        let avp = Avp::decode_from(&mut cursor).unwrap();
        assert_eq!(avp.data.len(), 0x33 - 8);
        let mut out = Vec::new();
        avp.encode_to(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn deep_clone_unpins_length_recursively() {
        let mut child = Avp::u32(1, 0, 7);
        child.length = Some(12);
        let mut parent = Avp::grouped(2, 0, vec![child]);
        parent.length = Some(999);

        let cloned = parent.deep_clone();
        assert_eq!(cloned.length, None);
        assert_eq!(cloned.avps[0].length, None);
    }

    #[test]
    fn short_data_is_never_treated_as_grouped() {
        let avp = Avp::octets(1, 0, vec![1, 2, 3]);
        let mut out = Vec::new();
        avp.encode_to(&mut out).unwrap();
        let mut cursor = std::io::Cursor::new(&out);
        let decoded = Avp::decode_from(&mut cursor).unwrap();
        assert!(decoded.avps.is_empty());
        assert_eq!(decoded.data, vec![1, 2, 3]);
    }
}
