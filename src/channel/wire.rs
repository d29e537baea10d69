use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::error;

use super::types::Hash256;
use crate::errors::{Error, Result};

/// Upper bound on a single wire frame. Anything larger is treated as a
/// protocol violation.
pub const MAX_FRAME_SIZE: u64 = 1 << 20;

/// The tagged envelope exchanged over payment channel streams. Frames are
/// varint-length-prefixed; the payload is the serialized enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeMessage {
    ChannelOpen(ChannelOpen),
    ChannelAccept(ChannelAccept),
    InitialCommitment(InitialCommitment),
    InitialCommitmentSignature(InitialCommitmentSignature),
    ChannelUpdateProposal(ChannelUpdateProposal),
    UpdateProposalAccept(UpdateProposalAccept),
    FinalizeUpdate(FinalizeUpdate),
    Error(ErrorMessage),
}

impl NodeMessage {
    pub fn name(&self) -> &'static str {
        match self {
            NodeMessage::ChannelOpen(_) => "ChannelOpen",
            NodeMessage::ChannelAccept(_) => "ChannelAccept",
            NodeMessage::InitialCommitment(_) => "InitialCommitment",
            NodeMessage::InitialCommitmentSignature(_) => "InitialCommitmentSignature",
            NodeMessage::ChannelUpdateProposal(_) => "ChannelUpdateProposal",
            NodeMessage::UpdateProposalAccept(_) => "UpdateProposalAccept",
            NodeMessage::FinalizeUpdate(_) => "FinalizeUpdate",
            NodeMessage::Error(_) => "Error",
        }
    }
}

/// First message of the open exchange, sent by the would-be funder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOpen {
    /// Tag from the payee's channel address, echoed back verbatim.
    pub address_id: Vec<u8>,
    /// Funder's escrow pubkey, compressed.
    pub channel_pubkey: Vec<u8>,
    /// Funder's first revocation pubkey, compressed.
    pub revocation_pubkey: Vec<u8>,
    /// Where the funder wants its share paid out.
    pub payout_script: Vec<u8>,
    /// Proposed CSV delay, in blocks.
    pub delay: u32,
    /// Proposed commitment fee rate, satoshis per byte.
    pub fee_per_byte: u64,
    /// Proposed dust limit, satoshis.
    pub dust_limit: u64,
}

/// The fundee's half of the key exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAccept {
    pub channel_pubkey: Vec<u8>,
    pub revocation_pubkey: Vec<u8>,
    pub payout_script: Vec<u8>,
}

/// Tells the fundee where the escrow will land on chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialCommitment {
    /// Funding transaction id, hex.
    pub funding_txid: String,
    pub funding_index: u32,
    pub initial_funding_amount: u64,
}

/// The fundee's signature on the funder's initial commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialCommitmentSignature {
    pub signature: Vec<u8>,
}

/// Asks the counterparty to move `amount` from our balance to theirs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelUpdateProposal {
    /// Channel id, hex.
    pub channel_id: String,
    pub amount: i64,
    /// Revocation pubkey for the proposer's next commitment, compressed.
    pub new_revocation_pubkey: Vec<u8>,
    /// Proposer's signature of the counterparty's new commitment.
    pub signature: Vec<u8>,
}

impl ChannelUpdateProposal {
    /// Identifier both parties journal for this update: the hash of the
    /// serialized proposal.
    pub fn digest(&self) -> Result<Hash256> {
        Ok(Hash256::digest(&bincode::serialize(self)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProposalAccept {
    /// Revocation pubkey for the accepter's next commitment, compressed.
    pub new_revocation_pubkey: Vec<u8>,
    /// Accepter's signature of the proposer's new commitment.
    pub signature: Vec<u8>,
    /// The revocation secret for the accepter's now-superseded commitment.
    pub revocation_privkey: Vec<u8>,
}

/// Final message of the update exchange: the proposer reveals its own
/// superseded revocation secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeUpdate {
    pub revocation_privkey: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

async fn read_uvarint<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for i in 0..10 {
        let byte = reader.read_u8().await?;
        if byte < 0x80 {
            if i == 9 && byte > 1 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "varint overflow"));
            }
            return Ok(value | (u64::from(byte) << shift));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint overflow"))
}

async fn write_uvarint<W: AsyncWrite + Unpin>(writer: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        if value < 0x80 {
            return writer.write_u8(value as u8).await;
        }
        writer.write_u8((value as u8) | 0x80).await?;
        value >>= 7;
    }
}

/// Writes one length-delimited message frame and flushes the stream.
pub async fn write_message<S>(stream: &mut S, message: &NodeMessage) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(message)?;
    write_uvarint(stream, payload.len() as u64).await?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one message frame, without a deadline. Prefer
/// [`read_message_timeout`] inside protocol exchanges.
pub async fn read_message<S>(stream: &mut S) -> Result<NodeMessage>
where
    S: AsyncRead + Unpin,
{
    let len = read_uvarint(stream).await?;
    if len > MAX_FRAME_SIZE {
        return Err(Error::Validation(format!("frame of {} bytes too large", len)));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}

/// Reads one message frame, failing with [`Error::Timeout`] if the remote
/// peer does not respond within `timeout`.
pub async fn read_message_timeout<S>(stream: &mut S, timeout: Duration) -> Result<NodeMessage>
where
    S: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, read_message(stream))
        .await
        .map_err(|_| Error::Timeout)?
}

/// Best-effort Error reply before tearing an exchange down. Failures are
/// logged and swallowed; the exchange is over either way.
pub async fn send_error_message<S>(stream: &mut S, message: &str)
where
    S: AsyncWrite + Unpin,
{
    let reply = NodeMessage::Error(ErrorMessage {
        message: message.to_string(),
    });
    if let Err(err) = write_message(stream, &reply).await {
        error!("error sending error message to peer: {}", err);
    }
}
