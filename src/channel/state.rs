use std::collections::HashMap;
use std::time::SystemTime;

use bitcoin::{Address, OutPoint, ScriptBuf, Transaction, Txid};
use serde::{Deserialize, Serialize};

use super::serde_utils::address_string;
use super::types::{Hash256, PeerId, Privkey, Pubkey};

/// The state the channel is in at any given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    /// Initial state of the channel until both parties have exchanged and
    /// signed the initial commitment transaction.
    Opening,
    /// Normal running state for a channel.
    Open,
    /// Either party broadcast a commitment transaction which has not
    /// confirmed yet.
    PendingClosure,
    /// The channel has been paid out, including by a broadcast commitment.
    Closed,
    /// Terminal state for protocol aborts.
    Error,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            ChannelStatus::Opening => "Opening",
            ChannelStatus::Open => "Open",
            ChannelStatus::PendingClosure => "Pending Closure",
            ChannelStatus::Closed => "Closed",
            ChannelStatus::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

/// All the data relevant to one payment channel. This is the record the
/// store persists; cryptographic material is serialized in canonical byte
/// form (compressed pubkeys, raw scalars) and addresses as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// SHA-256 of the concatenated channel pubkeys, channel opener's key
    /// first. Deterministic, so no id negotiation is needed.
    pub id: Hash256,

    pub status: ChannelStatus,

    pub creation_time: SystemTime,

    /// Whether the channel was opened by the remote peer.
    pub inbound: bool,

    /// Tag taken from the payee's channel address. Higher layers use it to
    /// map channels to external actions.
    pub address_id: [u8; 16],

    /// The counterparty's routing identity on the overlay.
    pub remote_peer_id: PeerId,

    /// Our contribution to the 2-of-2 escrow. The corresponding pubkey also
    /// appears in breach-remedy outputs.
    pub local_channel_privkey: Privkey,

    /// The other party's escrow key.
    pub remote_channel_pubkey: Pubkey,

    /// Our revocation key for the current commitment. Disclosed to the
    /// other party once a superseding commitment has been signed, then
    /// replaced.
    pub local_revocation_privkey: Privkey,

    /// The revocation pubkey parameterizing the commitment the remote peer
    /// currently holds.
    pub remote_revocation_pubkey: Pubkey,

    /// Revocation secrets the other party has revealed for superseded
    /// commitments, keyed by the breach-remedy address each one unlocks.
    pub remote_revocation_privkeys: HashMap<String, Privkey>,

    /// Negotiated CSV timeout on the unilateral branch of commitments, in
    /// blocks.
    pub delay_blocks: u32,

    /// Negotiated fee rate for commitment transactions, satoshis per byte.
    pub fee_per_byte: u64,

    /// Commitment outputs at or below this value are omitted.
    pub dust_limit: u64,

    /// Where we want our share to land when the channel resolves.
    pub local_payout_script: ScriptBuf,

    /// Where the other party wants their share to land.
    pub remote_payout_script: ScriptBuf,

    pub local_balance: u64,

    pub remote_balance: u64,

    /// P2SH address of the 2-of-2 escrow.
    #[serde(with = "address_string")]
    pub channel_address: Address,

    /// Redeem script for `channel_address`.
    pub redeem_script: ScriptBuf,

    /// Our latest fully signed commitment transaction. Sign-and-broadcast
    /// is all it takes to force close. The fundee has none until the first
    /// update.
    pub commitment_tx: Option<Transaction>,

    pub funding_txid: Option<Txid>,

    /// The escrow outpoint every commitment transaction spends.
    pub funding_outpoint: Option<OutPoint>,

    /// Set once a payout transaction confirms.
    pub payout_txid: Option<Txid>,

    /// Number of updates processed while the channel is open, not counting
    /// the initial funding. Strictly increasing; each increment has a
    /// matching journal entry.
    pub transaction_count: u64,
}

impl Channel {
    /// Computes the channel id from the two escrow pubkeys. The channel
    /// opener's key always goes first.
    pub fn compute_id(funder_pubkey: &Pubkey, fundee_pubkey: &Pubkey) -> Hash256 {
        let mut data = Vec::with_capacity(66);
        data.extend_from_slice(&funder_pubkey.serialize());
        data.extend_from_slice(&fundee_pubkey.serialize());
        Hash256::digest(&data)
    }

    /// Total value locked in the escrow.
    pub fn capacity(&self) -> u64 {
        self.local_balance + self.remote_balance
    }

    pub fn local_pubkey(&self) -> Pubkey {
        self.local_channel_privkey.pubkey()
    }

    /// The escrow pubkeys in script order (funder first).
    pub fn escrow_pubkeys(&self) -> (Pubkey, Pubkey) {
        if self.inbound {
            (self.remote_channel_pubkey, self.local_pubkey())
        } else {
            (self.local_pubkey(), self.remote_channel_pubkey)
        }
    }
}

impl std::fmt::Display for Channel {
    /// JSON overview of the channel, for logs and user-facing listings.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ChannelOverview<'a> {
            id: String,
            status: String,
            creation_time: &'a SystemTime,
            address_id: String,
            inbound: bool,
            channel_address: String,
            remote_peer_id: String,
            delay_blocks: u32,
            dust_limit: u64,
            fee_per_byte: u64,
            #[serde(skip_serializing_if = "Option::is_none")]
            funding_txid: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            payout_txid: Option<String>,
            local_balance: u64,
            remote_balance: u64,
            channel_capacity: u64,
            transaction_count: u64,
        }

        let overview = ChannelOverview {
            id: format!("{:x}", self.id),
            status: self.status.to_string(),
            creation_time: &self.creation_time,
            address_id: hex::encode(self.address_id),
            inbound: self.inbound,
            channel_address: self.channel_address.to_string(),
            remote_peer_id: self.remote_peer_id.to_string(),
            delay_blocks: self.delay_blocks,
            dust_limit: self.dust_limit,
            fee_per_byte: self.fee_per_byte,
            funding_txid: self.funding_txid.map(|txid| txid.to_string()),
            payout_txid: self.payout_txid.map(|txid| txid.to_string()),
            local_balance: self.local_balance,
            remote_balance: self.remote_balance,
            channel_capacity: self.capacity(),
            transaction_count: self.transaction_count,
        };
        let out = serde_json::to_string_pretty(&overview).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", out)
    }
}

/// Journal entry written once per successful channel update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTransaction {
    /// SHA-256 of the serialized update proposal, so both parties record
    /// the same id.
    pub id: Hash256,

    pub channel_id: Hash256,

    /// Amount transacted, from the local perspective: positive means we
    /// paid.
    pub amount: i64,

    pub timestamp: SystemTime,
}

impl std::fmt::Display for ChannelTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct TransactionOverview<'a> {
            ctxid: String,
            channel_id: String,
            amount: i64,
            timestamp: &'a SystemTime,
        }

        let overview = TransactionOverview {
            ctxid: format!("{:x}", self.id),
            channel_id: format!("{:x}", self.channel_id),
            amount: self.amount,
            timestamp: &self.timestamp,
        };
        let out = serde_json::to_string_pretty(&overview).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", out)
    }
}
