use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::channel::types::PeerId;
use crate::errors::Result;

/// The peer-to-peer overlay the node rides on. The overlay resolves peer
/// ids to network addresses and hands out full-duplex streams; everything
/// else (transports, discovery, the DHT) is its own business.
#[async_trait]
pub trait Overlay: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Our own routing identity.
    fn local_peer_id(&self) -> PeerId;

    /// The identity public key behind [`Overlay::local_peer_id`], embedded
    /// into the channel addresses we hand out.
    fn local_public_key(&self) -> [u8; 32];

    /// Opens a new stream to the peer for the given protocol.
    async fn open_stream(&self, peer_id: &PeerId, protocol: &str) -> Result<Self::Stream>;

    /// Waits for the next inbound stream on our registered protocols.
    /// Returns `None` once the overlay shuts down.
    async fn accept(&self) -> Option<(PeerId, Self::Stream)>;
}
