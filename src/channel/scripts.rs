use anyhow::anyhow;
use bitcoin::opcodes::all::{
    OP_CHECKMULTISIG, OP_CHECKSIG, OP_CSV, OP_DROP, OP_ELSE, OP_ENDIF, OP_IF, OP_PUSHBYTES_0,
};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{Address, Network, ScriptBuf};

use super::types::Pubkey;
use crate::errors::{Error, Result};

/// Builds the 2-of-2 multisig redeem script holding the channel funds and
/// its P2SH address. The channel opener's public key always goes first.
pub fn build_escrow_address(
    funder_pubkey: &Pubkey,
    fundee_pubkey: &Pubkey,
    network: Network,
) -> Result<(Address, ScriptBuf)> {
    let redeem_script = Builder::new()
        .push_int(2)
        .push_slice(funder_pubkey.serialize())
        .push_slice(fundee_pubkey.serialize())
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();
    let address = p2sh_address(&redeem_script, network)?;
    Ok((address, redeem_script))
}

/// Builds the redeem script for a commitment transaction's breach-remedy
/// output and its P2SH address. The IF branch lets the counterparty claim
/// the output by cosigning with a leaked revocation key; the ELSE branch
/// lets the broadcaster sweep it after `delay` blocks.
pub fn build_breach_remedy_address(
    revocation_pubkey: &Pubkey,
    commitment_pubkey: &Pubkey,
    delay_pubkey: &Pubkey,
    delay: u32,
    network: Network,
) -> Result<(Address, ScriptBuf)> {
    let redeem_script = Builder::new()
        .push_opcode(OP_IF)
        .push_int(2)
        .push_slice(revocation_pubkey.serialize())
        .push_slice(commitment_pubkey.serialize())
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .push_opcode(OP_ELSE)
        .push_int(i64::from(delay))
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_slice(delay_pubkey.serialize())
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_script();
    let address = p2sh_address(&redeem_script, network)?;
    Ok((address, redeem_script))
}

/// Assembles the scriptSig spending the escrow output. Signature ordering
/// mirrors the pubkey ordering of the escrow script: the funder's signature
/// occupies the first slot.
pub fn build_commitment_script_sig(
    first_sig: &[u8],
    second_sig: &[u8],
    redeem_script: &ScriptBuf,
) -> Result<ScriptBuf> {
    Ok(Builder::new()
        .push_opcode(OP_PUSHBYTES_0)
        .push_slice(push_bytes(first_sig)?)
        .push_slice(push_bytes(second_sig)?)
        .push_slice(push_bytes(redeem_script.as_bytes())?)
        .into_script())
}

fn push_bytes(data: &[u8]) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(data.to_vec())
        .map_err(|err| Error::Internal(anyhow!("script push too large: {err}")))
}

fn p2sh_address(redeem_script: &ScriptBuf, network: Network) -> Result<Address> {
    Address::p2sh(redeem_script, network)
        .map_err(|err| Error::Internal(anyhow!("building p2sh address: {err}")))
}
