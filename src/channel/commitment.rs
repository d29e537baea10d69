use anyhow::anyhow;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize as consensus_serialize;
use bitcoin::hashes::{sha256d, Hash as _};
use bitcoin::script::Instruction;
use bitcoin::transaction::Version;
use bitcoin::{Amount, Network, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use secp256k1::{ecdsa::Signature, Message};

use super::scripts::{build_breach_remedy_address, build_commitment_script_sig};
use super::state::Channel;
use super::types::secp256k1_instance;
use crate::errors::{Error, Result};

/// SIGHASH_ALL with the Bitcoin Cash fork id bit. Signatures commit to the
/// spent input value.
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Signature placeholder length used when estimating the serialized size of
/// a fully signed commitment.
const ESTIMATED_SIGNATURE_LEN: usize = 72;

/// Builds a commitment transaction from the current channel state and
/// returns it together with our signature on its input.
///
/// If `for_local` is set the commitment is the one our own node will hold:
/// the breach-remedy output is ours (parameterized by our revocation key)
/// and the direct output pays the remote peer. Otherwise the roles invert
/// and the result is the commitment held by the remote node.
pub fn build_commitment_transaction(
    channel: &Channel,
    for_local: bool,
    network: Network,
) -> Result<(Transaction, Vec<u8>)> {
    let funding_outpoint = channel
        .funding_outpoint
        .ok_or_else(|| Error::Internal(anyhow!("channel has no funding outpoint")))?;

    // CSV delays live in the breach-remedy script, not on this input.
    let mut tx = Transaction {
        version: Version(1),
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: funding_outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        }],
        output: Vec::new(),
    };

    let (revocation_pubkey, commitment_pubkey, delay_pubkey, direct_script, direct_value, breach_value) =
        if for_local {
            (
                channel.local_revocation_privkey.pubkey(),
                channel.remote_channel_pubkey,
                channel.local_pubkey(),
                channel.remote_payout_script.clone(),
                channel.remote_balance,
                channel.local_balance,
            )
        } else {
            (
                channel.remote_revocation_pubkey,
                channel.local_pubkey(),
                channel.remote_channel_pubkey,
                channel.local_payout_script.clone(),
                channel.local_balance,
                channel.remote_balance,
            )
        };

    let (breach_address, _) = build_breach_remedy_address(
        &revocation_pubkey,
        &commitment_pubkey,
        &delay_pubkey,
        channel.delay_blocks,
        network,
    )?;

    // Outputs at or below the dust limit are omitted. The direct output
    // always comes first.
    if direct_value > channel.dust_limit {
        tx.output.push(TxOut {
            value: Amount::from_sat(direct_value),
            script_pubkey: direct_script,
        });
    }
    if breach_value > channel.dust_limit {
        tx.output.push(TxOut {
            value: Amount::from_sat(breach_value),
            script_pubkey: breach_address.script_pubkey(),
        });
    }
    if tx.output.is_empty() {
        return Err(Error::OutputsBelowDust);
    }

    let size = estimate_signed_size(&tx, &channel.redeem_script)?;
    let fee = channel.fee_per_byte * size as u64;
    apply_fee(&mut tx.output, fee)?;

    let signature = sign_commitment_input(channel, &tx);
    Ok((tx, signature))
}

/// Splits the fee over the remaining outputs: a lone output pays it whole,
/// otherwise each pays half with the odd satoshi borne by the first.
fn apply_fee(outputs: &mut [TxOut], fee: u64) -> Result<()> {
    match outputs {
        [single] => deduct(single, fee),
        [first, second] => {
            let half = fee / 2;
            deduct(first, fee - half)?;
            deduct(second, half)
        }
        _ => Err(Error::Internal(anyhow!(
            "commitment transaction has {} outputs",
            outputs.len()
        ))),
    }
}

fn deduct(output: &mut TxOut, fee: u64) -> Result<()> {
    let value = output
        .value
        .to_sat()
        .checked_sub(fee)
        .ok_or(Error::FeeExceedsBalance)?;
    output.value = Amount::from_sat(value);
    Ok(())
}

/// Serialized size of the commitment once its scriptSig is filled in with
/// two signatures and the redeem script.
fn estimate_signed_size(tx: &Transaction, redeem_script: &ScriptBuf) -> Result<usize> {
    let placeholder = [0u8; ESTIMATED_SIGNATURE_LEN];
    let script_sig = build_commitment_script_sig(&placeholder, &placeholder, redeem_script)?;
    let mut signed = tx.clone();
    signed.input[0].script_sig = script_sig;
    Ok(signed.total_size())
}

/// Our half of the commitment's input signature: DER with the hash type
/// byte appended, ready for a scriptSig slot.
pub fn sign_commitment_input(channel: &Channel, tx: &Transaction) -> Vec<u8> {
    let digest = commitment_sighash(tx, &channel.redeem_script, channel.capacity());
    let message = Message::from_digest(digest);
    let signature = secp256k1_instance().sign_ecdsa(&message, &channel.local_channel_privkey.0);
    let mut sig = signature.serialize_der().to_vec();
    sig.push(SIGHASH_ALL_FORKID as u8);
    sig
}

/// Checks a fully assembled commitment against the escrow: the scriptSig
/// must carry the channel's redeem script and two valid signatures in
/// funder-first order.
pub fn validate_commitment_signatures(channel: &Channel, tx: &Transaction) -> Result<()> {
    let input = tx.input.first().ok_or(Error::Signature)?;

    let mut pushes = Vec::with_capacity(4);
    for instruction in input.script_sig.instructions() {
        match instruction {
            Ok(Instruction::PushBytes(data)) => pushes.push(data.as_bytes().to_vec()),
            _ => return Err(Error::Signature),
        }
    }
    let [empty, first_sig, second_sig, redeem] = pushes.as_slice() else {
        return Err(Error::Signature);
    };
    if !empty.is_empty() || redeem.as_slice() != channel.redeem_script.as_bytes() {
        return Err(Error::Signature);
    }

    let digest = commitment_sighash(tx, &channel.redeem_script, channel.capacity());
    let (funder_pubkey, fundee_pubkey) = channel.escrow_pubkeys();
    verify_input_signature(first_sig, &funder_pubkey.0, &digest)?;
    verify_input_signature(second_sig, &fundee_pubkey.0, &digest)
}

fn verify_input_signature(
    sig: &[u8],
    pubkey: &secp256k1::PublicKey,
    digest: &[u8; 32],
) -> Result<()> {
    let (&hash_type, der) = sig.split_last().ok_or(Error::Signature)?;
    if hash_type != SIGHASH_ALL_FORKID as u8 {
        return Err(Error::Signature);
    }
    let signature = Signature::from_der(der).map_err(|_| Error::Signature)?;
    secp256k1_instance()
        .verify_ecdsa(&Message::from_digest(*digest), &signature, pubkey)
        .map_err(|_| Error::Signature)
}

/// The value-committing signature digest for the commitment's only input,
/// in the replay-protected layout Bitcoin Cash uses for all signatures.
fn commitment_sighash(tx: &Transaction, redeem_script: &ScriptBuf, value: u64) -> [u8; 32] {
    let mut prevouts = Vec::new();
    let mut sequences = Vec::new();
    for input in &tx.input {
        prevouts.extend_from_slice(&consensus_serialize(&input.previous_output));
        sequences.extend_from_slice(&consensus_serialize(&input.sequence));
    }
    let mut outputs = Vec::new();
    for output in &tx.output {
        outputs.extend_from_slice(&consensus_serialize(output));
    }

    let input = &tx.input[0];
    let mut preimage = Vec::new();
    preimage.extend_from_slice(&consensus_serialize(&tx.version));
    preimage.extend_from_slice(sha256d::Hash::hash(&prevouts).as_byte_array());
    preimage.extend_from_slice(sha256d::Hash::hash(&sequences).as_byte_array());
    preimage.extend_from_slice(&consensus_serialize(&input.previous_output));
    preimage.extend_from_slice(&consensus_serialize(redeem_script));
    preimage.extend_from_slice(&value.to_le_bytes());
    preimage.extend_from_slice(&consensus_serialize(&input.sequence));
    preimage.extend_from_slice(sha256d::Hash::hash(&outputs).as_byte_array());
    preimage.extend_from_slice(&consensus_serialize(&tx.lock_time));
    preimage.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());
    sha256d::Hash::hash(&preimage).to_byte_array()
}
