//! Address resolution payloads.

use rmpv::Value;

use crate::error::WireError;
use crate::types::{LlAddr, NlAddr};

use super::{expect_bin, expect_str, expect_uint, read_array, write_array};

/// ARP payload type. Ordinals are wire-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArpType {
    Request = 0,
    Response = 1,
}

impl ArpType {
    pub fn from_ordinal(value: u64) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            _ => Err(WireError::UnknownOrdinal {
                what: "arp type",
                value,
            }),
        }
    }
}

/// The content of an ARP RESPONSE: the requested address and where to
/// transmit to reach it on the answering link.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ArpReply {
    pub l3: NlAddr,
    pub l2: LlAddr,
}

impl ArpReply {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, WireError> {
        write_array(vec![
            Value::from(self.l3.as_str()),
            Value::from(self.l2.as_str()),
        ])
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, WireError> {
        let fields = read_array(bytes, 2, "arp reply")?;
        Ok(Self {
            l3: NlAddr::new(expect_str(&fields[0], "arp reply l3")?),
            l2: LlAddr::new(expect_str(&fields[1], "arp reply l2")?),
        })
    }
}

/// An ARP payload: a typed content blob.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ArpPayload {
    pub arp_type: ArpType,
    /// Msgpack-encoded content: a string for REQUEST, an [`ArpReply`] for
    /// RESPONSE.
    pub content: Vec<u8>,
}

impl ArpPayload {
    /// Build a REQUEST asking who holds `target`.
    pub fn request(target: &NlAddr) -> Result<Self, WireError> {
        let mut content = Vec::new();
        rmpv::encode::write_value(&mut content, &Value::from(target.as_str()))
            .map_err(|e| WireError::Encode(e.to_string()))?;
        Ok(Self {
            arp_type: ArpType::Request,
            content,
        })
    }

    /// Build a RESPONSE carrying the resolved mapping.
    pub fn response(reply: &ArpReply) -> Result<Self, WireError> {
        Ok(Self {
            arp_type: ArpType::Response,
            content: reply.to_msgpack()?,
        })
    }

    /// Decode a REQUEST's content: the address being resolved.
    pub fn requested_address(&self) -> Result<NlAddr, WireError> {
        let value = rmpv::decode::read_value(&mut &self.content[..])
            .map_err(|e| WireError::Decode(e.to_string()))?;
        Ok(NlAddr::new(expect_str(&value, "arp request target")?))
    }

    /// Decode a RESPONSE's content.
    pub fn reply(&self) -> Result<ArpReply, WireError> {
        ArpReply::from_msgpack(&self.content)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, WireError> {
        write_array(vec![
            Value::from(self.arp_type as u8),
            Value::Binary(self.content.clone()),
        ])
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, WireError> {
        let fields = read_array(bytes, 2, "arp payload")?;
        Ok(Self {
            arp_type: ArpType::from_ordinal(expect_uint(&fields[0], "arp type")?)?,
            content: expect_bin(&fields[1], "arp content")?,
        })
    }
}
