//! Tests for message types.

use super::*;

#[test]
fn test_queue_name_validation() {
    // Valid names
    assert!(QueueName::new("test-queue".to_string()).is_ok());
    assert!(QueueName::new("queue_123".to_string()).is_ok());
    assert!(QueueName::new("orders.v2".to_string()).is_ok());
    assert!(QueueName::new("tenant/orders".to_string()).is_ok());
    assert!(QueueName::new("a".to_string()).is_ok());

    // Invalid names
    assert!(QueueName::new("".to_string()).is_err());
    assert!(QueueName::new("a".repeat(261)).is_err());
    assert!(QueueName::new("-leading-hyphen".to_string()).is_err());
    assert!(QueueName::new("trailing-hyphen-".to_string()).is_err());
    assert!(QueueName::new("double//slash".to_string()).is_err());
    assert!(QueueName::new("special@chars".to_string()).is_err());
    assert!(QueueName::new("with space".to_string()).is_err());
}

#[test]
fn test_queue_name_deserializes_with_validation() {
    let valid: QueueName = serde_json::from_str("\"orders\"").unwrap();
    assert_eq!(valid.as_str(), "orders");

    let invalid: Result<QueueName, _> = serde_json::from_str("\"bad name\"");
    assert!(invalid.is_err());
}

#[test]
fn test_outbound_message_rejects_empty_payload() {
    let result = OutboundMessage::from_text("");

    match result {
        Err(ValidationError::Required { field }) => assert_eq!(field, "payload"),
        other => panic!("Expected Required error, got: {:?}", other),
    }
}

#[test]
fn test_outbound_message_keeps_utf8_bytes() {
    let message = OutboundMessage::from_text("héllo").unwrap();

    assert_eq!(message.body().as_ref(), "héllo".as_bytes());
    assert_eq!(message.len(), 6);
    assert!(!message.is_empty());
}

#[test]
fn test_sequence_numbers_order() {
    assert!(SequenceNumber::new(1) < SequenceNumber::new(2));
    assert_eq!(SequenceNumber::new(7).value(), 7);
    assert_eq!(SequenceNumber::new(7).to_string(), "7");
}

#[test]
fn test_inbound_message_render() {
    let message = InboundMessage {
        sequence_number: SequenceNumber::new(15),
        payload: "hello".to_string(),
        enqueued_at: None,
    };

    assert_eq!(message.render(), "Seq#:15 data:hello");
    assert_eq!(render_receive_outcome(Some(&message)), "Seq#:15 data:hello");
}

#[test]
fn test_empty_receive_renders_sentinel() {
    assert_eq!(render_receive_outcome(None), "<no messages in queue>");
}

#[test]
fn test_brokered_message_builder() {
    let enqueued_at = Timestamp::now();
    let message = BrokeredMessage::new(SequenceNumber::new(3), Bytes::from("x"))
        .with_enqueued_at(enqueued_at.clone());

    assert_eq!(message.sequence_number, SequenceNumber::new(3));
    assert_eq!(message.enqueued_at, Some(enqueued_at));
}
