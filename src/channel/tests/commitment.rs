use bitcoin::consensus::encode::serialize as consensus_serialize;

use crate::channel::commitment::{
    build_commitment_transaction, sign_commitment_input, validate_commitment_signatures,
};
use crate::channel::scripts::build_commitment_script_sig;
use crate::errors::Error;

use super::test_utils::{channel_pair, TEST_NETWORK};

/// Placeholder scriptSig length used by the size estimate: OP_0, two
/// 72-byte signature pushes, and the 71-byte redeem script push.
const PLACEHOLDER_SCRIPT_SIG_LEN: usize = 1 + 73 + 73 + 72;

#[test]
fn build_is_deterministic() {
    let fixture = channel_pair(6000, 4000);
    let (tx1, sig1) = build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    let (tx2, sig2) = build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    assert_eq!(consensus_serialize(&tx1), consensus_serialize(&tx2));
    assert_eq!(sig1, sig2);
}

#[test]
fn both_parties_build_identical_transactions() {
    let fixture = channel_pair(6000, 4000);
    // The commitment the funder holds, built from each party's view.
    let (funder_view, _) = build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    let (fundee_view, _) =
        build_commitment_transaction(&fixture.fundee, false, TEST_NETWORK).unwrap();
    assert_eq!(consensus_serialize(&funder_view), consensus_serialize(&fundee_view));
}

#[test]
fn commitment_shape() {
    let fixture = channel_pair(6000, 4000);
    let (tx, _) = build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    assert_eq!(tx.version.0, 1);
    assert_eq!(tx.lock_time.to_consensus_u32(), 0);
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.input[0].previous_output, fixture.funder.funding_outpoint.unwrap());
    assert_eq!(tx.input[0].sequence.0, u32::MAX);
    assert_eq!(tx.output.len(), 2);
    // Direct output first, paying the remote side's payout script.
    assert_eq!(tx.output[0].script_pubkey, fixture.funder.remote_payout_script);
}

#[test]
fn fee_split_between_two_outputs() {
    let fixture = channel_pair(6000, 4000);
    let (tx, _) = build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();

    let size = tx.total_size() - 1 + 1 + PLACEHOLDER_SCRIPT_SIG_LEN;
    let fee = fixture.funder.fee_per_byte * size as u64;
    let direct = tx.output[0].value.to_sat();
    let breach = tx.output[1].value.to_sat();
    // The direct output bears the odd satoshi.
    assert_eq!(direct, 4000 - (fee - fee / 2));
    assert_eq!(breach, 6000 - fee / 2);
    assert_eq!(direct + breach, fixture.funder.capacity() - fee);
}

#[test]
fn lone_output_pays_entire_fee() {
    // The fundee side is empty, so the funder's commitment only carries the
    // breach output.
    let fixture = channel_pair(10_000, 0);
    let (tx, _) = build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    assert_eq!(tx.output.len(), 1);

    let size = tx.total_size() - 1 + 1 + PLACEHOLDER_SCRIPT_SIG_LEN;
    let fee = fixture.funder.fee_per_byte * size as u64;
    assert_eq!(tx.output[0].value.to_sat(), 10_000 - fee);
}

#[test]
fn both_outputs_below_dust_is_fatal() {
    let fixture = channel_pair(600, 300);
    let err = build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap_err();
    assert!(matches!(err, Error::OutputsBelowDust));
}

#[test]
fn fee_larger_than_output_is_rejected() {
    let mut channel = channel_pair(9000, 1001).funder;
    channel.fee_per_byte = 20;
    let err = build_commitment_transaction(&channel, true, TEST_NETWORK).unwrap_err();
    assert!(matches!(err, Error::FeeExceedsBalance));
}

#[test]
fn countersigned_commitment_validates_on_both_sides() {
    let fixture = channel_pair(6000, 4000);
    let (mut tx, funder_sig) =
        build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    let (_, fundee_sig) = build_commitment_transaction(&fixture.fundee, false, TEST_NETWORK).unwrap();

    // Funder's signature occupies the first slot.
    tx.input[0].script_sig =
        build_commitment_script_sig(&funder_sig, &fundee_sig, &fixture.funder.redeem_script)
            .unwrap();
    validate_commitment_signatures(&fixture.funder, &tx).unwrap();
    validate_commitment_signatures(&fixture.fundee, &tx).unwrap();
}

#[test]
fn swapped_signature_order_is_rejected() {
    let fixture = channel_pair(6000, 4000);
    let (mut tx, funder_sig) =
        build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    let (_, fundee_sig) = build_commitment_transaction(&fixture.fundee, false, TEST_NETWORK).unwrap();

    tx.input[0].script_sig =
        build_commitment_script_sig(&fundee_sig, &funder_sig, &fixture.funder.redeem_script)
            .unwrap();
    let err = validate_commitment_signatures(&fixture.funder, &tx).unwrap_err();
    assert!(matches!(err, Error::Signature));
}

#[test]
fn tampered_output_invalidates_signatures() {
    let fixture = channel_pair(6000, 4000);
    let (mut tx, funder_sig) =
        build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    let (_, fundee_sig) = build_commitment_transaction(&fixture.fundee, false, TEST_NETWORK).unwrap();
    tx.input[0].script_sig =
        build_commitment_script_sig(&funder_sig, &fundee_sig, &fixture.funder.redeem_script)
            .unwrap();

    tx.output[0].value = bitcoin::Amount::from_sat(tx.output[0].value.to_sat() + 1);
    let err = validate_commitment_signatures(&fixture.funder, &tx).unwrap_err();
    assert!(matches!(err, Error::Signature));
}

#[test]
fn signature_covers_the_built_transaction() {
    let fixture = channel_pair(6000, 4000);
    let (tx, sig) = build_commitment_transaction(&fixture.funder, true, TEST_NETWORK).unwrap();
    assert_eq!(sig, sign_commitment_input(&fixture.funder, &tx));
    // DER signature plus the appended hash type byte.
    assert_eq!(*sig.last().unwrap(), 0x41);
    assert!(sig.len() >= 70 && sig.len() <= 73);
}
