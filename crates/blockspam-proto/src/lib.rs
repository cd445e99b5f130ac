//! Generated gRPC code and converters for the node API.
//!
//! This crate contains:
//! - Generated protobuf message types for `node.v1`
//! - Generated gRPC service stubs (client and server) for the runtime,
//!   consensus, beacon, registry and roothash services
//! - Converters between proto types and `blockspam-core` domain types

pub mod convert;

/// Generated protobuf types and services.
pub mod pb {
    // The path matches the proto package: node.v1
    tonic::include_proto!("node.v1");

    /// Consensus height meaning "latest".
    pub const HEIGHT_LATEST: i64 = 0;

    /// `Runtime` is also the runtime service's name, so the registry message
    /// is `RegisteredRuntime` in the proto.
    pub type Runtime = RegisteredRuntime;
}

// Re-export commonly used types
pub use convert::decode_round;
pub use pb::beacon_client::BeaconClient;
pub use pb::beacon_server::{Beacon, BeaconServer};
pub use pb::consensus_client::ConsensusClient;
pub use pb::consensus_server::{Consensus, ConsensusServer};
pub use pb::registry_client::RegistryClient;
pub use pb::registry_server::{Registry, RegistryServer};
pub use pb::root_hash_client::RootHashClient;
pub use pb::root_hash_server::{RootHash, RootHashServer};
pub use pb::runtime_client::RuntimeClient;
pub use pb::runtime_server::{Runtime, RuntimeServer};

#[cfg(test)]
mod tests {
    use super::pb::{Block, BlockHeader, GetBlockRequest};
    use super::*;
    use prost::Message;
    use tonic::transport::Channel;

    #[test]
    fn test_block_header_wire_roundtrip() {
        let block = Block {
            header: Some(BlockHeader {
                version: 1,
                namespace: vec![7; 32],
                round: 812_345,
                timestamp: 1_700_000_000,
                header_type: 1,
                ..Default::default()
            }),
        };

        let bytes = block.encode_to_vec();
        let back = Block::decode(bytes.as_slice()).unwrap();
        assert_eq!(back, block);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_returns_status() {
        let channel = Channel::from_static("http://127.0.0.1:1").connect_lazy();
        let mut client = RuntimeClient::new(channel);

        let err = client
            .get_block(GetBlockRequest {
                runtime_id: vec![0; 32],
                round: 1,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.code(),
            tonic::Code::Unavailable | tonic::Code::Unknown
        ));
    }
}
