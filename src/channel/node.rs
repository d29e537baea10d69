use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::anyhow;
use bitcoin::{Amount, Network, OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use rand::RngCore;
use tokio::io::AsyncWrite;
use tracing::{debug, error, info};

use super::address::ChannelAddress;
use super::commitment::{build_commitment_transaction, validate_commitment_signatures};
use super::scripts::{build_breach_remedy_address, build_commitment_script_sig, build_escrow_address};
use super::state::{Channel, ChannelStatus, ChannelTransaction};
use super::types::{Hash256, PeerId, Privkey, Pubkey};
use super::wire::{
    self, ChannelAccept, ChannelOpen, ChannelUpdateProposal, FinalizeUpdate, InitialCommitment,
    InitialCommitmentSignature, NodeMessage, UpdateProposalAccept,
};
use crate::config::{
    ChannelConfig, DEFAULT_RELAY_FEE_PER_KB, MAX_DELAY_BLOCKS, MAX_DUST_LIMIT, MIN_FEE_PER_BYTE,
    PROTOCOL_PAYMENT_CHANNEL,
};
use crate::errors::{Error, Result};
use crate::kmutex::Kmutex;
use crate::overlay::Overlay;
use crate::store::ChannelStore;
use crate::tasks::TaskTrackerWithCancellation;
use crate::wallet::WalletBackend;

/// Our node in the payment channel overlay. It answers inbound open and
/// update exchanges from peers and drives outbound ones on behalf of the
/// wallet's owner. All channel mutations run under a per-channel lock and
/// reach the store only once the exchange they belong to has fully
/// succeeded.
pub struct PaymentChannelNode<S, W, N> {
    config: ChannelConfig,
    network: Network,
    store: S,
    wallet: W,
    overlay: N,
    channel_lock: Kmutex<Hash256>,
    tasks: TaskTrackerWithCancellation,
}

/// Keeps the funding inputs reserved while an exchange is in flight and
/// releases them on every exit path, including timeouts.
struct OutpointLocks<'a, W: WalletBackend> {
    wallet: &'a W,
    outpoints: Vec<OutPoint>,
}

impl<'a, W: WalletBackend> OutpointLocks<'a, W> {
    fn lock(wallet: &'a W, tx: &Transaction) -> Self {
        let outpoints: Vec<OutPoint> = tx.input.iter().map(|input| input.previous_output).collect();
        for outpoint in &outpoints {
            wallet.lock_outpoint(*outpoint);
        }
        Self { wallet, outpoints }
    }
}

impl<W: WalletBackend> Drop for OutpointLocks<'_, W> {
    fn drop(&mut self) {
        for outpoint in &self.outpoints {
            self.wallet.unlock_outpoint(*outpoint);
        }
    }
}

/// Parses a compressed pubkey received off the wire, replying with an Error
/// message before failing the exchange when it does not parse.
async fn parse_pubkey<T>(stream: &mut T, bytes: &[u8], error_text: &'static str) -> Result<Pubkey>
where
    T: AsyncWrite + Unpin,
{
    match Pubkey::from_slice(bytes) {
        Ok(pubkey) => Ok(pubkey),
        Err(_) => {
            wire::send_error_message(stream, error_text).await;
            Err(Error::Validation(error_text.to_string()))
        }
    }
}

impl<S, W, N> PaymentChannelNode<S, W, N>
where
    S: ChannelStore,
    W: WalletBackend,
    N: Overlay,
{
    pub fn new(config: ChannelConfig, network: Network, store: S, wallet: W, overlay: N) -> Self {
        Self {
            config,
            network,
            store,
            wallet,
            overlay,
            channel_lock: Kmutex::new(),
            tasks: TaskTrackerWithCancellation::new(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Accepts inbound payment channel streams until the node is shut down
    /// or the overlay goes away. Each stream gets its own task.
    pub async fn run(self: Arc<Self>) {
        let token = self.tasks.cancellation_token();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                inbound = self.overlay.accept() => match inbound {
                    Some((peer_id, stream)) => {
                        let node = Arc::clone(&self);
                        self.tasks.tracker().spawn(async move {
                            node.handle_inbound_stream(peer_id, stream).await;
                        });
                    }
                    None => break,
                },
            }
        }
    }

    /// Cancels in-flight exchanges and waits for their tasks to finish.
    pub async fn shutdown(&self) {
        self.tasks.close().await;
    }

    /// Returns a fresh channel address bound to our overlay identity, with
    /// a random address id.
    pub fn new_address(&self) -> ChannelAddress {
        let mut address_id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut address_id);
        ChannelAddress::new(self.overlay.local_public_key(), address_id)
    }

    pub fn get_channel(&self, channel_id: Hash256) -> Result<Channel> {
        self.store
            .get_channel(&channel_id)?
            .ok_or(Error::ChannelNotFound(channel_id))
    }

    /// Both open and closed channels.
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        self.store.list_channels()
    }

    pub fn list_transactions(&self) -> Result<Vec<ChannelTransaction>> {
        self.store.list_transactions()
    }

    /// Records that a commitment transaction for this channel has been
    /// broadcast and is awaiting confirmation. Chain observation belongs to
    /// the surrounding wallet, which calls this.
    pub async fn mark_pending_closure(&self, channel_id: Hash256) -> Result<()> {
        let _guard = self.channel_lock.lock(channel_id).await;
        let mut channel = self.get_channel(channel_id)?;
        channel.status = ChannelStatus::PendingClosure;
        self.store.put_channel(&channel)
    }

    /// Records that a payout transaction for this channel has confirmed.
    /// The record moves to the closed bucket.
    pub async fn mark_closed(&self, channel_id: Hash256, payout_txid: Txid) -> Result<()> {
        let _guard = self.channel_lock.lock(channel_id).await;
        let mut channel = self.get_channel(channel_id)?;
        channel.status = ChannelStatus::Closed;
        channel.payout_txid = Some(payout_txid);
        self.store.put_channel(&channel)
    }

    /// Cooperative mutual close. Not implemented yet; broadcasting the
    /// latest commitment transaction is the only way out of a channel
    /// today.
    // TODO: negotiate a mutual payout transaction so neither party has to
    // sit out the CSV delay.
    pub async fn close_channel(&self, _channel_id: Hash256) -> Result<()> {
        Err(Error::Internal(anyhow!("cooperative close is not implemented")))
    }

    /// Steps through the channel opening protocol. At the end we either
    /// have an open, funded channel to the other node, or it has failed.
    ///
    ///    +-------+                                       +-------+
    ///    |       |--(1)---------   ChannelOpen  -------->|       |
    ///    |       |<-(2)--------   ChannelAccept  --------|       |
    ///    |   A   |                                       |   B   |
    ///    |       |--(3)------  InitialCommitment  ------>|       |
    ///    |       |<-(4)--- InitialCommitmentSignature ---|       |
    ///    +-------+                                       +-------+
    ///
    ///    - where node A is 'funder' and node B is 'fundee'
    pub async fn open_channel(&self, address: &ChannelAddress, amount: u64) -> Result<Txid> {
        let peer_id = address.peer_id();

        // Authoring a throwaway transaction both checks that the wallet can
        // fund the channel and tells us which outpoints to reserve while
        // the exchange runs. We cannot build the real funding output yet:
        // the escrow script needs the remote peer's pubkey.
        let dummy_output = TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: ScriptBuf::from_bytes(vec![0u8; 24]),
        };
        let dummy_tx = self
            .wallet
            .create_simple_tx(0, vec![dummy_output], 0, DEFAULT_RELAY_FEE_PER_KB)
            .await?;
        let reserved = OutpointLocks::lock(&self.wallet, &dummy_tx);

        let channel_privkey = Privkey::generate();
        let revocation_privkey = Privkey::generate();
        let payout_address = self.wallet.new_address(0).await?;
        let local_payout_script = payout_address.script_pubkey();

        // One stream for the entire channel initiation. New channel actions
        // get a new stream.
        let mut stream = self
            .overlay
            .open_stream(&peer_id, PROTOCOL_PAYMENT_CHANNEL)
            .await
            .map_err(|_| Error::UnreachablePeer(peer_id))?;

        let open = ChannelOpen {
            address_id: address.address_id.to_vec(),
            channel_pubkey: channel_privkey.pubkey().serialize().to_vec(),
            revocation_pubkey: revocation_privkey.pubkey().serialize().to_vec(),
            payout_script: local_payout_script.to_bytes(),
            delay: self.config.delay_blocks(),
            fee_per_byte: self.config.fee_per_byte(),
            dust_limit: self.config.dust_limit(),
        };
        // Nothing has been saved yet, so a failure here costs nothing.
        wire::write_message(&mut stream, &NodeMessage::ChannelOpen(open)).await?;

        let reply = wire::read_message_timeout(&mut stream, self.config.network_timeout()).await?;
        let accept = match reply {
            NodeMessage::ChannelAccept(accept) => accept,
            NodeMessage::Error(err) => {
                error!(
                    "received error message from peer {} while opening channel: {}",
                    peer_id, err.message
                );
                return Err(Error::Remote(err.message));
            }
            other => {
                wire::send_error_message(&mut stream, "Invalid message type").await;
                return Err(Error::UnexpectedMessage(other.name()));
            }
        };

        let remote_channel_pubkey =
            parse_pubkey(&mut stream, &accept.channel_pubkey, "Invalid channel public key").await?;
        let remote_revocation_pubkey = parse_pubkey(
            &mut stream,
            &accept.revocation_pubkey,
            "Invalid revocation public key",
        )
        .await?;
        if accept.payout_script.is_empty() {
            wire::send_error_message(&mut stream, "Invalid payout script").await;
            return Err(Error::Validation("remote peer sent empty payout script".to_string()));
        }

        // The channel opener's public key always goes first.
        let local_pubkey = channel_privkey.pubkey();
        let id = Channel::compute_id(&local_pubkey, &remote_channel_pubkey);
        let (channel_address, redeem_script) =
            build_escrow_address(&local_pubkey, &remote_channel_pubkey, self.network)?;
        let escrow_script = channel_address.script_pubkey();

        // Release the reservation long enough to rebuild the funding
        // transaction against the real escrow script, then reserve the
        // actual inputs until channel creation finishes.
        drop(reserved);
        let funding_output = TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: escrow_script.clone(),
        };
        let funding_tx = self
            .wallet
            .create_simple_tx(0, vec![funding_output], 0, DEFAULT_RELAY_FEE_PER_KB)
            .await?;
        let _reserved = OutpointLocks::lock(&self.wallet, &funding_tx);
        let funding_txid = funding_tx.compute_txid();
        let funding_index = funding_tx
            .output
            .iter()
            .position(|output| output.script_pubkey == escrow_script)
            .unwrap_or(0) as u32;

        let mut channel = Channel {
            id,
            status: ChannelStatus::Opening,
            creation_time: SystemTime::now(),
            inbound: false,
            address_id: address.address_id,
            remote_peer_id: peer_id,
            local_channel_privkey: channel_privkey,
            remote_channel_pubkey,
            local_revocation_privkey: revocation_privkey,
            remote_revocation_pubkey,
            remote_revocation_privkeys: HashMap::new(),
            delay_blocks: self.config.delay_blocks(),
            fee_per_byte: self.config.fee_per_byte(),
            dust_limit: self.config.dust_limit(),
            local_payout_script,
            remote_payout_script: ScriptBuf::from_bytes(accept.payout_script),
            local_balance: amount,
            remote_balance: 0,
            channel_address,
            redeem_script,
            commitment_tx: None,
            funding_txid: Some(funding_txid),
            funding_outpoint: Some(OutPoint {
                txid: funding_txid,
                vout: funding_index,
            }),
            payout_txid: None,
            transaction_count: 0,
        };

        let initial = InitialCommitment {
            funding_txid: funding_txid.to_string(),
            funding_index,
            initial_funding_amount: amount,
        };
        wire::write_message(&mut stream, &NodeMessage::InitialCommitment(initial)).await?;

        let reply = wire::read_message_timeout(&mut stream, self.config.network_timeout()).await?;
        let remote_signature = match reply {
            NodeMessage::InitialCommitmentSignature(msg) => msg.signature,
            NodeMessage::Error(err) => {
                error!(
                    "received error message from peer {} while opening channel: {}",
                    peer_id, err.message
                );
                return Err(Error::Remote(err.message));
            }
            other => return Err(Error::UnexpectedMessage(other.name())),
        };

        let (mut commitment_tx, local_signature) =
            build_commitment_transaction(&channel, true, self.network)?;
        let script_sig =
            build_commitment_script_sig(&local_signature, &remote_signature, &channel.redeem_script)?;
        commitment_tx.input[0].script_sig = script_sig;
        if let Err(err) = validate_commitment_signatures(&channel, &commitment_tx) {
            error!(
                "remote peer {} sent invalid signature on initial commitment transaction",
                peer_id
            );
            return Err(err);
        }
        channel.commitment_tx = Some(commitment_tx);
        channel.status = ChannelStatus::Open;

        self.wallet.import_address(&channel.channel_address, false).await?;
        self.store.put_channel(&channel)?;
        self.wallet.publish_transaction(&funding_tx).await?;
        info!("opened channel {:x} to peer {}", channel.id, peer_id);
        Ok(funding_txid)
    }

    /// Sends a payment to the remote peer via an open channel.
    ///
    ///    +-------+                                       +-------+
    ///    |       |--(1)----  ChannelUpdateProposal  ---->|       |
    ///    |   X   |<-(2)----  UpdateProposalAccept   -----|   Y   |
    ///    |       |--(3)-------  FinalizeUpdate  -------->|       |
    ///    +-------+                                       +-------+
    pub async fn send_payment(&self, channel_id: Hash256, amount: u64) -> Result<()> {
        let _guard = self.channel_lock.lock(channel_id).await;

        let mut channel = self.get_channel(channel_id)?;
        if channel.status != ChannelStatus::Open {
            return Err(Error::ChannelNotOpen);
        }
        if amount == 0 || amount > channel.local_balance {
            return Err(Error::InsufficientFunds);
        }
        channel.local_balance -= amount;
        channel.remote_balance += amount;

        // Rotate our revocation key. The superseded secret travels to the
        // peer in the FinalizeUpdate message once their countersignature
        // checks out.
        let old_revocation_privkey = channel.local_revocation_privkey;
        let new_revocation_privkey = Privkey::generate();
        channel.local_revocation_privkey = new_revocation_privkey;

        let (_, remote_commitment_sig) = build_commitment_transaction(&channel, false, self.network)?;

        let proposal = ChannelUpdateProposal {
            channel_id: format!("{:x}", channel.id),
            amount: amount as i64,
            new_revocation_pubkey: new_revocation_privkey.pubkey().serialize().to_vec(),
            signature: remote_commitment_sig,
        };
        let proposal_digest = proposal.digest()?;

        let mut stream = self
            .overlay
            .open_stream(&channel.remote_peer_id, PROTOCOL_PAYMENT_CHANNEL)
            .await
            .map_err(|_| Error::UnreachablePeer(channel.remote_peer_id))?;
        wire::write_message(&mut stream, &NodeMessage::ChannelUpdateProposal(proposal)).await?;

        let reply = wire::read_message_timeout(&mut stream, self.config.network_timeout()).await?;
        let accept = match reply {
            NodeMessage::UpdateProposalAccept(accept) => accept,
            NodeMessage::Error(err) => {
                error!(
                    "received error message from peer {} while sending payment: {}",
                    channel.remote_peer_id, err.message
                );
                return Err(Error::Remote(err.message));
            }
            other => {
                wire::send_error_message(&mut stream, "Invalid message type").await;
                return Err(Error::UnexpectedMessage(other.name()));
            }
        };

        // The revealed secret must back the revocation pubkey their
        // soon-to-be-stale commitment was built with.
        let revealed = match Privkey::from_slice(&accept.revocation_privkey) {
            Ok(key) => key,
            Err(_) => {
                wire::send_error_message(&mut stream, "Invalid revocation privkey").await;
                return Err(Error::Validation(
                    "remote peer sent malformed revocation privkey".to_string(),
                ));
            }
        };
        if revealed.pubkey() != channel.remote_revocation_pubkey {
            wire::send_error_message(&mut stream, "Invalid revocation privkey").await;
            return Err(Error::Validation(
                "revealed revocation privkey does not match the held pubkey".to_string(),
            ));
        }

        // Until the first update completes the remote peer holds no
        // commitment transaction, so there is nothing to punish and no
        // secret worth keeping.
        let breach_address = if channel.transaction_count > 0 {
            let (address, _) = build_breach_remedy_address(
                &revealed.pubkey(),
                &channel.local_pubkey(),
                &channel.remote_channel_pubkey,
                channel.delay_blocks,
                self.network,
            )?;
            channel
                .remote_revocation_privkeys
                .insert(address.to_string(), revealed);
            Some(address)
        } else {
            None
        };

        let new_remote_revocation_pubkey = parse_pubkey(
            &mut stream,
            &accept.new_revocation_pubkey,
            "Invalid revocation pubkey",
        )
        .await?;
        channel.remote_revocation_pubkey = new_remote_revocation_pubkey;

        let (mut commitment_tx, local_commitment_sig) =
            build_commitment_transaction(&channel, true, self.network)?;
        let script_sig = if channel.inbound {
            build_commitment_script_sig(&accept.signature, &local_commitment_sig, &channel.redeem_script)?
        } else {
            build_commitment_script_sig(&local_commitment_sig, &accept.signature, &channel.redeem_script)?
        };
        commitment_tx.input[0].script_sig = script_sig;
        if validate_commitment_signatures(&channel, &commitment_tx).is_err() {
            wire::send_error_message(&mut stream, "Invalid commitment signature").await;
            error!(
                "remote peer {} sent an invalid commitment signature",
                channel.remote_peer_id
            );
            return Err(Error::Signature);
        }
        channel.commitment_tx = Some(commitment_tx);

        let finalize = FinalizeUpdate {
            revocation_privkey: old_revocation_privkey.serialize().to_vec(),
        };
        wire::write_message(&mut stream, &NodeMessage::FinalizeUpdate(finalize)).await?;

        if let Some(address) = &breach_address {
            self.wallet.import_address(address, false).await?;
        }

        channel.transaction_count += 1;
        let journal = ChannelTransaction {
            id: proposal_digest,
            channel_id: channel.id,
            amount: amount as i64,
            timestamp: SystemTime::now(),
        };
        self.store.put_channel_with_transaction(&channel, &journal)?;
        debug!(
            "sent {} satoshis over channel {:x}; local balance {}",
            amount, channel.id, channel.local_balance
        );
        Ok(())
    }

    /// Entry point for inbound streams. One message starts each exchange;
    /// anything else is answered with an Error message.
    async fn handle_inbound_stream(&self, peer_id: PeerId, mut stream: N::Stream) {
        let message =
            match wire::read_message_timeout(&mut stream, self.config.network_timeout()).await {
                Ok(message) => message,
                Err(err) => {
                    error!("error reading inbound stream from {}: {}", peer_id, err);
                    return;
                }
            };
        let name = message.name();
        let result = match message {
            NodeMessage::ChannelOpen(open) => {
                self.handle_channel_open(open, peer_id, &mut stream).await
            }
            NodeMessage::ChannelUpdateProposal(proposal) => {
                self.handle_update_proposal(proposal, peer_id, &mut stream).await
            }
            other => {
                error!(
                    "received invalid incoming message type {} from {}",
                    other.name(),
                    peer_id
                );
                wire::send_error_message(&mut stream, "Invalid message type").await;
                return;
            }
        };
        if let Err(err) = result {
            error!("error handling {} message from {}: {}", name, peer_id, err);
        }
    }

    /// Fundee half of the open exchange. The sender is the only party
    /// putting money in at this point, so all we ultimately do is sign
    /// their commitment transaction; our own balance is zero and we hold no
    /// commitment until the first update.
    async fn handle_channel_open(
        &self,
        open: ChannelOpen,
        peer_id: PeerId,
        stream: &mut N::Stream,
    ) -> Result<()> {
        if open.dust_limit > MAX_DUST_LIMIT {
            wire::send_error_message(stream, "Unacceptable dust limit").await;
            return Err(Error::Validation(format!(
                "channel open request has unacceptable dust limit {}",
                open.dust_limit
            )));
        }
        if open.delay > MAX_DELAY_BLOCKS {
            wire::send_error_message(stream, "Unacceptable delay").await;
            return Err(Error::Validation(format!(
                "channel open request has unacceptable delay {}",
                open.delay
            )));
        }
        if open.fee_per_byte < MIN_FEE_PER_BYTE {
            wire::send_error_message(stream, "Unacceptable fee rate").await;
            return Err(Error::Validation(format!(
                "channel open request has unacceptable fee rate {}",
                open.fee_per_byte
            )));
        }
        let remote_channel_pubkey =
            parse_pubkey(stream, &open.channel_pubkey, "Invalid channel public key").await?;
        let remote_revocation_pubkey =
            parse_pubkey(stream, &open.revocation_pubkey, "Invalid revocation public key").await?;
        if open.payout_script.is_empty() {
            wire::send_error_message(stream, "Invalid payout script").await;
            return Err(Error::Validation("channel open request has empty payout script".to_string()));
        }
        let address_id: [u8; 16] = match open.address_id.as_slice().try_into() {
            Ok(address_id) => address_id,
            Err(_) => {
                wire::send_error_message(stream, "Invalid address ID").await;
                return Err(Error::Validation("channel open request has malformed address id".to_string()));
            }
        };

        let channel_privkey = Privkey::generate();
        let revocation_privkey = Privkey::generate();
        let payout_address = match self.wallet.new_address(0).await {
            Ok(address) => address,
            Err(err) => {
                wire::send_error_message(stream, "Internal node error").await;
                return Err(err);
            }
        };

        // The channel opener's public key always goes first.
        let local_pubkey = channel_privkey.pubkey();
        let id = Channel::compute_id(&remote_channel_pubkey, &local_pubkey);
        let (channel_address, redeem_script) =
            build_escrow_address(&remote_channel_pubkey, &local_pubkey, self.network)?;

        let mut channel = Channel {
            id,
            status: ChannelStatus::Opening,
            creation_time: SystemTime::now(),
            inbound: true,
            address_id,
            remote_peer_id: peer_id,
            local_channel_privkey: channel_privkey,
            remote_channel_pubkey,
            local_revocation_privkey: revocation_privkey,
            remote_revocation_pubkey,
            remote_revocation_privkeys: HashMap::new(),
            delay_blocks: open.delay,
            fee_per_byte: open.fee_per_byte,
            dust_limit: open.dust_limit,
            local_payout_script: payout_address.script_pubkey(),
            remote_payout_script: ScriptBuf::from_bytes(open.payout_script),
            local_balance: 0,
            remote_balance: 0,
            channel_address,
            redeem_script,
            commitment_tx: None,
            funding_txid: None,
            funding_outpoint: None,
            payout_txid: None,
            transaction_count: 0,
        };

        let accept = ChannelAccept {
            channel_pubkey: local_pubkey.serialize().to_vec(),
            revocation_pubkey: channel.local_revocation_privkey.pubkey().serialize().to_vec(),
            payout_script: channel.local_payout_script.to_bytes(),
        };
        wire::write_message(stream, &NodeMessage::ChannelAccept(accept)).await?;

        let reply = wire::read_message_timeout(stream, self.config.network_timeout()).await?;
        let initial = match reply {
            NodeMessage::InitialCommitment(initial) => initial,
            NodeMessage::Error(err) => {
                error!(
                    "received error message from peer {} while accepting channel: {}",
                    peer_id, err.message
                );
                return Err(Error::Remote(err.message));
            }
            other => {
                wire::send_error_message(stream, "Invalid message type").await;
                return Err(Error::UnexpectedMessage(other.name()));
            }
        };

        let funding_txid = match Txid::from_str(&initial.funding_txid) {
            Ok(txid) => txid,
            Err(_) => {
                wire::send_error_message(stream, "Invalid funding txid").await;
                return Err(Error::Validation("remote peer sent invalid funding txid".to_string()));
            }
        };
        channel.funding_txid = Some(funding_txid);
        channel.funding_outpoint = Some(OutPoint {
            txid: funding_txid,
            vout: initial.funding_index,
        });
        channel.remote_balance = initial.initial_funding_amount;

        let (_, signature) = build_commitment_transaction(&channel, false, self.network)?;
        wire::write_message(
            stream,
            &NodeMessage::InitialCommitmentSignature(InitialCommitmentSignature { signature }),
        )
        .await?;

        self.wallet.import_address(&channel.channel_address, false).await?;
        channel.status = ChannelStatus::Open;
        self.store.put_channel(&channel)?;
        info!("accepted channel {:x} from peer {}", channel.id, peer_id);
        Ok(())
    }

    /// Accepter half of the update exchange: verify the proposer's
    /// signature on our new commitment, countersign theirs, and swap
    /// superseded revocation secrets.
    async fn handle_update_proposal(
        &self,
        proposal: ChannelUpdateProposal,
        peer_id: PeerId,
        stream: &mut N::Stream,
    ) -> Result<()> {
        let channel_id = match Hash256::from_str(&proposal.channel_id) {
            Ok(channel_id) => channel_id,
            Err(_) => {
                wire::send_error_message(stream, "Invalid channel ID").await;
                return Err(Error::Validation("update proposal has malformed channel id".to_string()));
            }
        };

        let _guard = self.channel_lock.lock(channel_id).await;

        let mut channel = match self.store.get_channel(&channel_id)? {
            Some(channel) => channel,
            None => {
                wire::send_error_message(stream, "Invalid channel ID").await;
                return Err(Error::ChannelNotFound(channel_id));
            }
        };
        if channel.remote_peer_id != peer_id {
            wire::send_error_message(stream, "Invalid channel ID").await;
            return Err(Error::Validation(
                "received a channel update message from a peer who is not party to the channel"
                    .to_string(),
            ));
        }
        if channel.status != ChannelStatus::Open {
            wire::send_error_message(stream, "Channel is not open").await;
            return Err(Error::ChannelNotOpen);
        }
        if proposal.amount <= 0 || proposal.amount as u64 > channel.remote_balance {
            wire::send_error_message(stream, "Invalid amount").await;
            return Err(Error::Validation(format!(
                "update proposal has invalid amount {}",
                proposal.amount
            )));
        }
        let amount = proposal.amount as u64;
        channel.remote_balance -= amount;
        channel.local_balance += amount;

        let new_remote_revocation_pubkey = parse_pubkey(
            stream,
            &proposal.new_revocation_pubkey,
            "Invalid revocation pubkey",
        )
        .await?;
        let old_remote_revocation_pubkey = channel.remote_revocation_pubkey;
        channel.remote_revocation_pubkey = new_remote_revocation_pubkey;

        // Our new commitment must carry a valid signature from the
        // proposer before we sign anything ourselves.
        let (mut commitment_tx, local_commitment_sig) =
            build_commitment_transaction(&channel, true, self.network)?;
        let script_sig = if channel.inbound {
            build_commitment_script_sig(&proposal.signature, &local_commitment_sig, &channel.redeem_script)?
        } else {
            build_commitment_script_sig(&local_commitment_sig, &proposal.signature, &channel.redeem_script)?
        };
        commitment_tx.input[0].script_sig = script_sig;
        if validate_commitment_signatures(&channel, &commitment_tx).is_err() {
            wire::send_error_message(stream, "Invalid commitment signature").await;
            error!(
                "remote peer {} sent an invalid commitment signature",
                channel.remote_peer_id
            );
            return Err(Error::Signature);
        }
        channel.commitment_tx = Some(commitment_tx);

        // Hold on to the superseded secret: it is sent to the proposer only
        // after our signature on their new commitment, in the accept
        // message below.
        let old_revocation_privkey = channel.local_revocation_privkey;
        channel.local_revocation_privkey = Privkey::generate();

        let (_, remote_commitment_sig) = build_commitment_transaction(&channel, false, self.network)?;

        let accept = UpdateProposalAccept {
            new_revocation_pubkey: channel.local_revocation_privkey.pubkey().serialize().to_vec(),
            signature: remote_commitment_sig,
            revocation_privkey: old_revocation_privkey.serialize().to_vec(),
        };
        wire::write_message(stream, &NodeMessage::UpdateProposalAccept(accept)).await?;

        let reply = wire::read_message_timeout(stream, self.config.network_timeout()).await?;
        let finalize = match reply {
            NodeMessage::FinalizeUpdate(finalize) => finalize,
            NodeMessage::Error(err) => {
                error!(
                    "received error message from peer {} while accepting update: {}",
                    peer_id, err.message
                );
                return Err(Error::Remote(err.message));
            }
            other => {
                wire::send_error_message(stream, "Invalid message type").await;
                return Err(Error::UnexpectedMessage(other.name()));
            }
        };

        let revealed = match Privkey::from_slice(&finalize.revocation_privkey) {
            Ok(key) => key,
            Err(_) => {
                wire::send_error_message(stream, "Invalid revocation privkey").await;
                return Err(Error::Validation(
                    "remote peer sent malformed revocation privkey".to_string(),
                ));
            }
        };
        if revealed.pubkey() != old_remote_revocation_pubkey {
            wire::send_error_message(stream, "Invalid revocation privkey").await;
            return Err(Error::Validation(
                "revealed revocation privkey does not match the held pubkey".to_string(),
            ));
        }

        // Key the secret by the breach-remedy address of the commitment it
        // invalidates, and have the wallet watch that address.
        let (breach_address, _) = build_breach_remedy_address(
            &revealed.pubkey(),
            &channel.local_pubkey(),
            &channel.remote_channel_pubkey,
            channel.delay_blocks,
            self.network,
        )?;
        channel
            .remote_revocation_privkeys
            .insert(breach_address.to_string(), revealed);
        self.wallet.import_address(&breach_address, false).await?;

        channel.transaction_count += 1;
        let journal = ChannelTransaction {
            id: proposal.digest()?,
            channel_id: channel.id,
            amount: -proposal.amount,
            timestamp: SystemTime::now(),
        };
        self.store.put_channel_with_transaction(&channel, &journal)?;
        debug!(
            "received {} satoshis over channel {:x}; local balance {}",
            amount, channel.id, channel.local_balance
        );
        Ok(())
    }
}
