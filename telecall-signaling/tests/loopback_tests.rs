//! Integration tests for the loopback signaling channel

use telecall_core::{CallError, IceCandidate, SessionDescription};
use telecall_signaling::*;

#[tokio::test]
async fn test_pair_delivers_in_order() {
    let (doctor, patient) = LoopbackSignaling::pair();
    let mut inbox = patient.subscribe().unwrap();

    doctor
        .send(SignalingMessage::offer("visit-1", SessionDescription::offer("v=0")))
        .await
        .unwrap();
    doctor
        .send(SignalingMessage::ice_candidate("visit-1", IceCandidate::new("candidate:1")))
        .await
        .unwrap();

    assert_eq!(inbox.recv().await.unwrap().kind(), "offer");
    assert_eq!(inbox.recv().await.unwrap().kind(), "ice_candidate");
    assert_eq!(doctor.sent().len(), 2);
    assert!(patient.sent().is_empty());
}

#[test]
fn test_messages_do_not_echo_to_sender() {
    let (doctor, _patient) = LoopbackSignaling::pair();
    let mut own = doctor.subscribe().unwrap();

    tokio_test::assert_ok!(tokio_test::block_on(doctor.send(SignalingMessage::answer(
        "visit-1",
        SessionDescription::answer("v=0")
    ))));
    assert!(own.try_recv().is_err());
}

#[tokio::test]
async fn test_every_subscriber_receives() {
    let (doctor, patient) = LoopbackSignaling::pair();
    let mut first = patient.subscribe().unwrap();
    let mut second = patient.subscribe().unwrap();

    doctor
        .send(SignalingMessage::offer("visit-1", SessionDescription::offer("v=0")))
        .await
        .unwrap();
    assert!(first.recv().await.is_some());
    assert!(second.recv().await.is_some());
}

#[tokio::test]
async fn test_closed_channel_rejects_send() {
    let (doctor, patient) = LoopbackSignaling::pair();
    doctor.close();

    let result = doctor
        .send(SignalingMessage::offer("visit-1", SessionDescription::offer("v=0")))
        .await;
    assert_eq!(result, Err(SignalingError::ChannelClosed));
    assert!(doctor.subscribe().is_err());

    let result = patient
        .send(SignalingMessage::answer("visit-1", SessionDescription::answer("v=0")))
        .await;
    assert!(matches!(result, Err(SignalingError::SendFailed { .. })));

    let call: CallError = SignalingError::ChannelClosed.into();
    assert_eq!(call.error_code(), "SIGNALING_ERROR");
}

#[tokio::test]
async fn test_unconnected_records_and_injects() {
    let channel = LoopbackSignaling::unconnected();
    let mut inbox = channel.subscribe().unwrap();

    channel
        .send(SignalingMessage::offer("visit-1", SessionDescription::offer("v=0")))
        .await
        .unwrap();
    assert_eq!(channel.sent().len(), 1);

    let delivered = channel.inject(SignalingMessage::answer(
        "visit-1",
        SessionDescription::answer("v=0"),
    ));
    assert_eq!(delivered, 1);
    assert_eq!(inbox.recv().await.unwrap().kind(), "answer");
}
