//! Wire message: the Diameter header plus its top-level AVP list
//! (spec.md §3 "Msg (wire type)").

use super::avp::Avp;
use crate::error::{CodecError, Result};
use rand::random;
use std::io::{Read, Seek, Write};

const HEADER_LEN: u32 = 20;

/// A Diameter message as it appears on the wire.
#[derive(Debug, Clone)]
pub struct Msg {
    pub version: u8,
    /// `None` until encoded once; cleared by any mutation so length is
    /// always recomputed.
    pub length: Option<u32>,
    pub request: bool,
    pub proxyable: bool,
    pub error: bool,
    pub retransmit: bool,
    pub reserved: u8,
    pub code: u32,
    pub app_id: u32,
    pub h2h_id: Option<u32>,
    pub e2e_id: Option<u32>,
    pub avps: Vec<Avp>,
}

impl Msg {
    pub fn new(code: u32, app_id: u32, request: bool) -> Msg {
        Msg {
            version: 1,
            length: None,
            request,
            proxyable: false,
            error: false,
            retransmit: false,
            reserved: 0,
            code,
            app_id,
            h2h_id: None,
            e2e_id: None,
            avps: Vec::new(),
        }
    }

    /// Deep-clone that unpins `length` (and every descendant AVP's length),
    /// matching [`Avp::deep_clone`].
    pub fn deep_clone(&self) -> Msg {
        Msg {
            version: self.version,
            length: None,
            request: self.request,
            proxyable: self.proxyable,
            error: self.error,
            retransmit: self.retransmit,
            reserved: self.reserved,
            code: self.code,
            app_id: self.app_id,
            h2h_id: self.h2h_id,
            e2e_id: self.e2e_id,
            avps: self.avps.iter().map(Avp::deep_clone).collect(),
        }
    }

    pub fn all_avps(&self) -> impl Iterator<Item = &Avp> + '_ {
        self.avps.iter().flat_map(|a| a.all_avps())
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R) -> Result<Msg> {
        let mut header = [0u8; 20];
        reader
            .read_exact(&mut header)
            .map_err(|_| CodecError::IncompleteBuffer {
                expected: 20,
                actual: 0,
            })?;

        let version = header[0];
        let total_length = u32::from_be_bytes([0, header[1], header[2], header[3]]);

        let flags = header[4];
        let request = flags & 0x80 != 0;
        let proxyable = flags & 0x40 != 0;
        let error = flags & 0x20 != 0;
        let retransmit = flags & 0x10 != 0;
        let reserved = flags & 0x0f;

        let code = u32::from_be_bytes([0, header[5], header[6], header[7]]);
        let app_id = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        let h2h_id = u32::from_be_bytes([header[12], header[13], header[14], header[15]]);
        let e2e_id = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);

        if total_length < HEADER_LEN {
            return Err(CodecError::InvalidMessageLength(total_length as i64).into());
        }
        let body_len = (total_length - HEADER_LEN) as usize;

        let mut body = vec![0u8; body_len];
        reader
            .read_exact(&mut body)
            .map_err(|_| CodecError::IncompleteBuffer {
                expected: body_len,
                actual: 0,
            })?;

        let mut avps = Vec::new();
        let mut cursor = std::io::Cursor::new(&body[..]);
        while (cursor.position() as usize) < body.len() {
            avps.push(Avp::decode_from(&mut cursor)?);
        }

        Ok(Msg {
            version,
            length: Some(total_length),
            request,
            proxyable,
            error,
            retransmit,
            reserved,
            code,
            app_id,
            h2h_id: Some(h2h_id),
            e2e_id: Some(e2e_id),
            avps,
        })
    }

    pub fn encode_to<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        let mut content = Vec::new();
        for a in &self.avps {
            a.encode_to(&mut content)?;
        }

        let length = self.length.unwrap_or(HEADER_LEN + content.len() as u32);

        writer.write_all(&[self.version])?;
        writer.write_all(&length.to_be_bytes()[1..])?;

        let mut flags = 0u8;
        if self.request {
            flags |= 0x80;
        }
        if self.proxyable {
            flags |= 0x40;
        }
        if self.error {
            flags |= 0x20;
        }
        if self.retransmit {
            flags |= 0x10;
        }
        flags |= self.reserved & 0x0f;
        writer.write_all(&[flags])?;

        writer.write_all(&self.code.to_be_bytes()[1..])?;
        writer.write_all(&self.app_id.to_be_bytes())?;

        let h2h_id = *self.h2h_id.get_or_insert_with(|| random::<u32>());
        writer.write_all(&h2h_id.to_be_bytes())?;

        let e2e_id = *self.e2e_id.get_or_insert_with(|| random::<u32>());
        writer.write_all(&e2e_id.to_be_bytes())?;

        writer.write_all(&content)?;

        Ok(())
    }
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
    fn cer_round_trips() {
        let bytes = hex(
            "010000c88000010100000000000000000000000000000108400000113132372e302e302e3100000000000128400000166473742e646f6d61696e2e636f6d0000000001014000000e00017f00000100000000010a4000000c000000000000010d400000334d75205365727669636520416e616c797a6572204469616d6574657220496d706c656d656e746174696f6e000000012b4000000c000000000000010c4000000c000007d100000104400000200000010a4000000c000028af000001024000000c01000000",
        );
        let mut cursor = std::io::Cursor::new(&bytes);
        let mut msg = Msg::decode_from(&mut cursor).unwrap();
        assert_eq!(msg.code, 257);
        assert!(msg.request);
        assert!(!msg.proxyable);

        let mut out = Vec::new();
        msg.encode_to(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn missing_ids_are_randomly_filled_on_encode() {
        let mut msg = Msg::new(257, 0, true);
        let mut out = Vec::new();
        msg.encode_to(&mut out).unwrap();
        assert!(msg.h2h_id.is_some());
        assert!(msg.e2e_id.is_some());
    }
}
