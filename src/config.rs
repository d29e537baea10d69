use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default CSV delay on commitment breach-remedy outputs, in blocks (one day).
pub const DEFAULT_DELAY_BLOCKS: u32 = 6 * 24;

/// Channel open requests with a longer delay are rejected (one week).
pub const MAX_DELAY_BLOCKS: u32 = 6 * 24 * 7;

/// Default fee rate used when materializing commitment transactions.
pub const DEFAULT_FEE_PER_BYTE: u64 = 5;

/// Channel open requests with a lower fee rate are rejected.
pub const MIN_FEE_PER_BYTE: u64 = 1;

/// Commitment outputs at or below this value are omitted.
pub const DEFAULT_DUST_LIMIT: u64 = 1000;

/// Channel open requests with a higher dust limit are rejected.
pub const MAX_DUST_LIMIT: u64 = 1000;

/// How long to wait for a response from the remote peer before erroring.
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);

/// Fee rate handed to the wallet when authoring the funding transaction.
pub const DEFAULT_RELAY_FEE_PER_KB: u64 = 1000;

/// Protocol identifier for payment channel streams on the overlay. One
/// stream is opened per channel action (open, each update).
pub const PROTOCOL_PAYMENT_CHANNEL: &str = "/bitcoincash/paymentchannel/1.0.0";

/// Configuration for the payment channel node. All fields are optional;
/// unset fields fall back to the module defaults above.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// CSV delay negotiated into new channels, in blocks.
    pub delay_blocks: Option<u32>,
    /// Fee rate negotiated into new channels, in satoshis per byte.
    pub fee_per_byte: Option<u64>,
    /// Dust limit negotiated into new channels, in satoshis.
    pub dust_limit: Option<u64>,
    /// Per-read deadline on wire exchanges, in seconds.
    pub network_timeout_secs: Option<u64>,
}

impl ChannelConfig {
    pub fn delay_blocks(&self) -> u32 {
        self.delay_blocks.unwrap_or(DEFAULT_DELAY_BLOCKS)
    }

    pub fn fee_per_byte(&self) -> u64 {
        self.fee_per_byte.unwrap_or(DEFAULT_FEE_PER_BYTE)
    }

    pub fn dust_limit(&self) -> u64 {
        self.dust_limit.unwrap_or(DEFAULT_DUST_LIMIT)
    }

    pub fn network_timeout(&self) -> Duration {
        self.network_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_NETWORK_TIMEOUT)
    }
}
