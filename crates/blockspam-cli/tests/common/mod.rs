use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;

use blockspam_core::block::Hash;
use blockspam_core::{BlockHeader, RuntimeId};

/// Serve `router` on an ephemeral localhost port for the rest of the test.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(router.serve_with_incoming(TcpListenerStream::new(listener)));
    addr
}

pub fn header(round: u64) -> BlockHeader {
    BlockHeader {
        version: 4,
        namespace: RuntimeId::SAPPHIRE,
        round,
        timestamp: 1_700_000_000,
        header_type: 1,
        previous_hash: Hash::digest(b"previous"),
        io_root: Hash::digest(b"io"),
        state_root: Hash::digest(b"state"),
        messages_hash: Hash::default(),
        in_messages_hash: Hash::default(),
    }
}
