//! Interep contract ABI and the conversions between its types and ours.

use crate::chain::types::{BlockOrder, ChainError, GroupUpdate, OnchainGroupRecord};
use crate::groups::GroupKey;
use crate::utils::{format_bytes32_string, parse_bytes32_string};

use alloy::rpc::types::Log;
use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IInterep {
        struct OffchainGroup {
            bytes32 provider;
            bytes32 name;
            uint8 depth;
            uint256 root;
        }

        function updateGroups(OffchainGroup[] calldata groups) external;

        event OffchainGroupUpdated(bytes32 provider, bytes32 name, uint256 root, uint8 depth);
    }
}

/// Arguments of `updateGroups` for a batch of updates.
pub fn offchain_groups(updates: &[GroupUpdate]) -> Result<Vec<IInterep::OffchainGroup>, ChainError> {
    updates
        .iter()
        .map(|update| -> Result<IInterep::OffchainGroup, ChainError> {
            Ok(IInterep::OffchainGroup {
                provider: format_bytes32_string(&update.provider)?,
                name: format_bytes32_string(&update.name)?,
                depth: update.depth,
                root: update.root,
            })
        })
        .collect()
}

/// Decode an `OffchainGroupUpdated` log returned by the node into a typed record.
pub fn decode_group_updated(log: &Log) -> Result<OnchainGroupRecord, ChainError> {
    let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
        return Err(ChainError::InvalidResponse(
            "log is missing its block number or log index".into(),
        ));
    };

    let event = log
        .log_decode::<IInterep::OffchainGroupUpdated>()
        .map_err(|e| ChainError::DecodeError(e.to_string()))?
        .inner
        .data;

    let provider = parse_bytes32_string(&event.provider)?;
    let name = parse_bytes32_string(&event.name)?;
    let key = GroupKey::new(&provider, &name)
        .map_err(|e| ChainError::DecodeError(format!("invalid group identifier: {}", e)))?;

    Ok(OnchainGroupRecord {
        key,
        root: event.root,
        depth: event.depth,
        order: BlockOrder::new(block_number, log_index),
    })
}
