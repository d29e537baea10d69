use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::channel::wire::{
    read_message, read_message_timeout, send_error_message, write_message, ChannelOpen,
    ChannelUpdateProposal, NodeMessage,
};
use crate::errors::Error;

fn sample_open() -> ChannelOpen {
    ChannelOpen {
        address_id: vec![9u8; 16],
        channel_pubkey: vec![2u8; 33],
        revocation_pubkey: vec![3u8; 33],
        payout_script: vec![0x76, 0xa9],
        delay: 864,
        fee_per_byte: 5,
        dust_limit: 1000,
    }
}

fn sample_proposal() -> ChannelUpdateProposal {
    ChannelUpdateProposal {
        channel_id: "aa".repeat(32),
        amount: 500,
        new_revocation_pubkey: vec![2u8; 33],
        signature: vec![0x30; 72],
    }
}

#[tokio::test]
async fn frame_round_trip() {
    let (mut near, mut far) = tokio::io::duplex(1 << 16);
    let sent = sample_open();
    write_message(&mut near, &NodeMessage::ChannelOpen(sent.clone()))
        .await
        .unwrap();

    match read_message(&mut far).await.unwrap() {
        NodeMessage::ChannelOpen(received) => {
            assert_eq!(received.address_id, sent.address_id);
            assert_eq!(received.channel_pubkey, sent.channel_pubkey);
            assert_eq!(received.delay, sent.delay);
            assert_eq!(received.fee_per_byte, sent.fee_per_byte);
            assert_eq!(received.dust_limit, sent.dust_limit);
        }
        other => panic!("unexpected message {}", other.name()),
    }
}

#[tokio::test]
async fn multi_byte_length_prefix_round_trips() {
    let (mut near, mut far) = tokio::io::duplex(1 << 16);
    let mut open = sample_open();
    // Force the frame length over the single-byte varint range.
    open.payout_script = vec![0xab; 300];
    write_message(&mut near, &NodeMessage::ChannelOpen(open.clone()))
        .await
        .unwrap();
    match read_message(&mut far).await.unwrap() {
        NodeMessage::ChannelOpen(received) => assert_eq!(received.payout_script, open.payout_script),
        other => panic!("unexpected message {}", other.name()),
    }
}

#[tokio::test]
async fn sequential_frames_preserve_order() {
    let (mut near, mut far) = tokio::io::duplex(1 << 16);
    write_message(&mut near, &NodeMessage::ChannelOpen(sample_open()))
        .await
        .unwrap();
    write_message(
        &mut near,
        &NodeMessage::ChannelUpdateProposal(sample_proposal()),
    )
    .await
    .unwrap();

    assert_eq!(read_message(&mut far).await.unwrap().name(), "ChannelOpen");
    assert_eq!(
        read_message(&mut far).await.unwrap().name(),
        "ChannelUpdateProposal"
    );
}

#[tokio::test]
async fn read_times_out() {
    let (_near, mut far) = tokio::io::duplex(1 << 16);
    let err = read_message_timeout(&mut far, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let (mut near, mut far) = tokio::io::duplex(1 << 16);
    // Varint announcing a 2 MiB frame.
    near.write_all(&[0x80, 0x80, 0x80, 0x01]).await.unwrap();
    let err = read_message(&mut far).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn error_reply_round_trips() {
    let (mut near, mut far) = tokio::io::duplex(1 << 16);
    send_error_message(&mut near, "Invalid channel ID").await;
    match read_message(&mut far).await.unwrap() {
        NodeMessage::Error(err) => assert_eq!(err.message, "Invalid channel ID"),
        other => panic!("unexpected message {}", other.name()),
    }
}

#[test]
fn proposal_digest_is_stable_and_content_bound() {
    let proposal = sample_proposal();
    let again = sample_proposal();
    assert_eq!(proposal.digest().unwrap(), again.digest().unwrap());

    let mut changed = sample_proposal();
    changed.amount = 501;
    assert_ne!(proposal.digest().unwrap(), changed.digest().unwrap());
}
