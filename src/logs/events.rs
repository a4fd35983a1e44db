//! Event signatures emitted by the identity registry.

use alloy::sol;

sol! {
    /// Emitted by the identity registry when an agent is registered.
    #[derive(Debug, PartialEq, Eq)]
    event Registered(uint256 indexed agentId, string tokenURI, address indexed owner);

    /// ERC-721 transfer; a mint has `from == address(0)`.
    #[derive(Debug, PartialEq, Eq)]
    event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
}

/// Topic position of `agentId` in a `Registered` log.
pub const REGISTERED_ID_TOPIC: usize = 1;

/// Topic position of `tokenId` in a `Transfer` log.
pub const TRANSFER_ID_TOPIC: usize = 3;
