// src/header.rs

use crate::types::{OpId, RawAddress, StageId, RAW_ADDRESS_SIZE};

/// Wire size of the operation header, in bytes.
///
/// Layout (little-endian, field order matters for correlation):
///
/// ```text
/// offset  0  u64  op id: transport identifier
/// offset  8  u64  op id: sequence number
/// offset 16  u32  stage id
/// offset 20  [u8; RAW_ADDRESS_SIZE]  reply address (opaque)
/// ```
pub const HEADER_SIZE: usize = 8 + 8 + 4 + RAW_ADDRESS_SIZE;

const STAGE_OFFSET: usize = 16;
const REPLY_OFFSET: usize = 20;

const _: () = {
    assert!(HEADER_SIZE == REPLY_OFFSET + RAW_ADDRESS_SIZE);
    assert!(STAGE_OFFSET + 4 == REPLY_OFFSET);
};

/// The operation header prepended to every message this layer sends.
///
/// Carries just enough to correlate a message with an operation: which op
/// it belongs to, which hop of the delegation chain it is, and where the
/// ultimate response should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub op_id: OpId,
    pub stage: StageId,
    pub reply_address: RawAddress,
}

impl Header {
    /// Encode to the fixed wire layout.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.op_id.transport_id().to_le_bytes());
        buf[8..16].copy_from_slice(&self.op_id.sequence().to_le_bytes());
        buf[STAGE_OFFSET..REPLY_OFFSET].copy_from_slice(&self.stage.get().to_le_bytes());
        buf[REPLY_OFFSET..].copy_from_slice(self.reply_address.as_bytes());
        buf
    }

    /// Decode from the fixed wire layout.
    ///
    /// Infallible: every bit pattern is a structurally valid header. Whether
    /// the op id matches a live operation is the registry's concern.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let transport_id = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let sequence = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let stage = u32::from_le_bytes(buf[STAGE_OFFSET..REPLY_OFFSET].try_into().unwrap());
        let mut reply = [0u8; RAW_ADDRESS_SIZE];
        reply.copy_from_slice(&buf[REPLY_OFFSET..]);
        Header {
            op_id: OpId::new(transport_id, sequence),
            stage: StageId::from_wire(stage),
            reply_address: RawAddress::from_bytes(reply),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let header = Header {
            op_id: OpId::new(0xDEAD_BEEF, 77),
            stage: StageId::from_wire(3),
            reply_address: RawAddress::from_bytes([0x5A; RAW_ADDRESS_SIZE]),
        };
        let wire = header.encode();
        assert_eq!(Header::decode(&wire), header);
    }

    #[test]
    fn sentinels_survive_the_wire() {
        for stage in [StageId::INITIAL_REQUEST, StageId::ULTIMATE_RESPONSE] {
            let header = Header {
                op_id: OpId::new(1, 2),
                stage,
                reply_address: RawAddress::default(),
            };
            assert_eq!(Header::decode(&header.encode()).stage, stage);
        }
    }

    #[test]
    fn field_offsets_are_fixed() {
        let header = Header {
            op_id: OpId::new(0x0102_0304_0506_0708, 0x1112_1314_1516_1718),
            stage: StageId::from_wire(0x2122_2324),
            reply_address: RawAddress::from_bytes([0xFF; RAW_ADDRESS_SIZE]),
        };
        let wire = header.encode();
        assert_eq!(wire[0], 0x08); // little-endian transport id
        assert_eq!(wire[8], 0x18); // little-endian sequence
        assert_eq!(wire[STAGE_OFFSET], 0x24);
        assert_eq!(&wire[REPLY_OFFSET..], &[0xFF; RAW_ADDRESS_SIZE]);
    }
}
