// src/proptests.rs

use proptest::prelude::*;

use crate::header::Header;
use crate::types::{OpId, RawAddress, StageId, RAW_ADDRESS_SIZE};

proptest! {
    #[test]
    fn header_roundtrips_any_field_values(
        transport_id in any::<u64>(),
        sequence in any::<u64>(),
        stage in any::<u32>(),
        reply in any::<[u8; RAW_ADDRESS_SIZE]>(),
    ) {
        let header = Header {
            op_id: OpId::new(transport_id, sequence),
            stage: StageId::from_wire(stage),
            reply_address: RawAddress::from_bytes(reply),
        };
        prop_assert_eq!(Header::decode(&header.encode()), header);
    }

    #[test]
    fn stage_chains_strictly_increase(start in 0u32..1024, hops in 1usize..16) {
        let mut stage = StageId::from_wire(start);
        for _ in 0..hops {
            let next = stage.next();
            prop_assert!(next.get() > stage.get());
            stage = next;
        }
    }
}
