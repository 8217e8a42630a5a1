//! Tests for `src/delivery/controller.rs`: strategy selection, fallback, aggregation.

use std::sync::Arc;
use std::time::Duration;

use imessage_relay::delivery::controller::FallbackPolicy;
use imessage_relay::delivery::{
    DeliveryController, DeliveryError, DeliveryFailure, DeliveryOutcome, DeliveryRequest,
};

use crate::fake_backend::{Call, FakeBackend};

const ALICE: &str = "+13133650246";
const BOB: &str = "+16127072757";

fn numbers(list: &[&str]) -> Vec<String> {
    list.iter().map(|n| (*n).to_owned()).collect()
}

fn controller(backend: &Arc<FakeBackend>) -> DeliveryController {
    DeliveryController::new(backend.clone())
}

fn expect_individual(
    outcome: Result<DeliveryOutcome, DeliveryError>,
) -> (usize, usize, Vec<DeliveryFailure>, Option<String>) {
    match outcome {
        Ok(DeliveryOutcome::IndividualDelivered {
            succeeded,
            failed,
            failures,
            fallback_from,
            ..
        }) => (succeeded, failed, failures, fallback_from),
        other => panic!("expected individual delivery, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Individual delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn individual_delivery_to_two_recipients() {
    let backend = Arc::new(FakeBackend::new());
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual("hi", numbers(&[ALICE, BOB])))
        .await;

    let (succeeded, failed, failures, fallback_from) = expect_individual(outcome);
    assert_eq!(succeeded, 2);
    assert_eq!(failed, 0);
    assert!(failures.is_empty());
    assert!(fallback_from.is_none());
    assert_eq!(backend.addressee_sends(), vec![ALICE, BOB]);
    assert!(backend.conversation_sends().is_empty());
}

#[tokio::test]
async fn one_send_per_addressee_and_counts_sum_to_list_length() {
    let list = ["+15550000001", "+15550000002", "+15550000003", "+15550000004"];
    let backend = Arc::new(FakeBackend::new().with_failing(&["+15550000002", "+15550000004"]));

    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual("hi", numbers(&list)))
        .await;

    let (succeeded, failed, failures, _) = expect_individual(outcome);
    assert_eq!(succeeded.saturating_add(failed), list.len());
    assert_eq!(backend.addressee_sends().len(), list.len());
    assert_eq!(
        failures
            .iter()
            .map(|f| f.addressee.as_str())
            .collect::<Vec<_>>(),
        vec!["+15550000002", "+15550000004"]
    );
}

#[tokio::test]
async fn partial_failure_is_still_success() {
    let backend = Arc::new(FakeBackend::new().with_failing(&[BOB]));
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual("hi", numbers(&[ALICE, BOB])))
        .await;

    let (succeeded, failed, failures, _) = expect_individual(outcome);
    assert_eq!((succeeded, failed), (1, 1));
    assert_eq!(failures[0].addressee, BOB);
    assert!(failures[0].reason.contains("not found"));
}

#[tokio::test]
async fn all_sends_failing_is_an_error() {
    let backend = Arc::new(FakeBackend::new().with_failing(&[ALICE, BOB]));
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual("hi", numbers(&[ALICE, BOB])))
        .await;

    match outcome {
        Err(DeliveryError::AllDeliveriesFailed { failures }) => assert_eq!(failures.len(), 2),
        other => panic!("expected AllDeliveriesFailed, got {other:?}"),
    }
    assert_eq!(backend.addressee_sends().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sends_are_dispatched_concurrently() {
    let backend = Arc::new(
        FakeBackend::new()
            .with_failing(&["+15550000001"])
            .with_delay(Duration::from_millis(100)),
    );
    let list = numbers(&["+15550000001", "+15550000002", "+15550000003"]);

    let started = tokio::time::Instant::now();
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual("hi", list))
        .await;

    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(backend.max_in_flight(), 3);
    let (succeeded, failed, _, _) = expect_individual(outcome);
    assert_eq!((succeeded, failed), (2, 1));
}

#[tokio::test]
async fn duplicates_are_sent_twice() {
    let backend = Arc::new(FakeBackend::new());
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual("hi", numbers(&[ALICE, ALICE])))
        .await;

    let (succeeded, _, _, _) = expect_individual(outcome);
    assert_eq!(succeeded, 2);
    assert_eq!(backend.addressee_sends(), vec![ALICE, ALICE]);
}

// ---------------------------------------------------------------------------
// Input errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_message_is_rejected_without_sends() {
    let backend = Arc::new(FakeBackend::new().with_conversations(&["Work Team"]));
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::group("", numbers(&[ALICE]), "Work"))
        .await;

    assert_eq!(outcome, Err(DeliveryError::MissingMessage));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn invalid_addressee_is_rejected_without_sends() {
    let backend = Arc::new(FakeBackend::new());
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual("hi", numbers(&["invalid-number"])))
        .await;

    assert_eq!(
        outcome,
        Err(DeliveryError::InvalidAddressees {
            offending: numbers(&["invalid-number"]),
        })
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn every_malformed_entry_is_reported() {
    let backend = Arc::new(FakeBackend::new());
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual(
            "hi",
            numbers(&["abc", ALICE, "+0123", BOB, ""]),
        ))
        .await;

    assert_eq!(
        outcome,
        Err(DeliveryError::InvalidAddressees {
            offending: numbers(&["abc", "+0123", ""]),
        })
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn invalid_fallback_list_blocks_group_attempt() {
    let backend = Arc::new(FakeBackend::new().with_conversations(&["Work Team"]));
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::group("hi", numbers(&["nope"]), "Work"))
        .await;

    assert!(matches!(
        outcome,
        Err(DeliveryError::InvalidAddressees { .. })
    ));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn no_hint_and_no_addressees_requires_addressees() {
    let backend = Arc::new(FakeBackend::new());
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::individual("hi", Vec::new()))
        .await;

    assert_eq!(outcome, Err(DeliveryError::AddresseesRequired));
    assert!(backend.calls().is_empty());
}

// ---------------------------------------------------------------------------
// Default addressees
// ---------------------------------------------------------------------------

#[tokio::test]
async fn defaults_used_when_request_has_none() {
    let backend = Arc::new(FakeBackend::new());
    let controller = controller(&backend).with_default_addressees(numbers(&[" +13133650246 "]));

    let outcome = controller
        .deliver(&DeliveryRequest::individual("hi", Vec::new()))
        .await;

    let (succeeded, _, _, _) = expect_individual(outcome);
    assert_eq!(succeeded, 1);
    assert_eq!(backend.addressee_sends(), vec![ALICE]);
}

#[tokio::test]
async fn request_addressees_override_defaults() {
    let backend = Arc::new(FakeBackend::new());
    let controller = controller(&backend).with_default_addressees(numbers(&[ALICE]));

    controller
        .deliver(&DeliveryRequest::individual("hi", numbers(&[BOB])))
        .await
        .expect("delivery should succeed");

    assert_eq!(backend.addressee_sends(), vec![BOB]);
}

#[tokio::test]
async fn malformed_defaults_are_reported() {
    let backend = Arc::new(FakeBackend::new());
    let controller = controller(&backend).with_default_addressees(numbers(&[ALICE, "555-1234"]));

    let outcome = controller
        .deliver(&DeliveryRequest::individual("hi", Vec::new()))
        .await;

    assert_eq!(
        outcome,
        Err(DeliveryError::InvalidAddressees {
            offending: numbers(&["555-1234"]),
        })
    );
}

// ---------------------------------------------------------------------------
// Group delivery and fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn group_delivery_skips_individual_sends() {
    let backend = Arc::new(FakeBackend::new().with_conversations(&["Work Team"]));
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::group("hi", Vec::new(), "Work Team"))
        .await;

    assert_eq!(
        outcome,
        Ok(DeliveryOutcome::GroupDelivered {
            conversation_hint: "Work Team".to_owned(),
        })
    );
    assert_eq!(backend.calls(), vec![Call::Conversation("Work Team".to_owned())]);
}

#[tokio::test]
async fn group_delivery_ignores_available_fallback_list() {
    let backend = Arc::new(FakeBackend::new().with_conversations(&["Family Chat"]));
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::group("hi", numbers(&[ALICE, BOB]), "Family"))
        .await;

    assert_eq!(outcome.map(|o| o.mode()), Ok("group"));
    assert!(backend.addressee_sends().is_empty());
}

#[tokio::test]
async fn missing_group_falls_back_to_addressees() {
    let backend = Arc::new(FakeBackend::new().with_conversations(&["Work Team"]));
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::group("hi", numbers(&[ALICE]), "Ghost Group"))
        .await;

    let (succeeded, failed, _, fallback_from) = expect_individual(outcome);
    assert_eq!((succeeded, failed), (1, 0));
    assert_eq!(fallback_from.as_deref(), Some("Ghost Group"));
    assert_eq!(
        backend.calls(),
        vec![
            Call::Conversation("Ghost Group".to_owned()),
            Call::Addressee(ALICE.to_owned()),
        ]
    );
}

#[tokio::test]
async fn missing_group_falls_back_to_defaults() {
    let backend = Arc::new(FakeBackend::new());
    let controller = controller(&backend).with_default_addressees(numbers(&[ALICE, BOB]));

    let outcome = controller
        .deliver(&DeliveryRequest::group("hi", Vec::new(), "Ghost Group"))
        .await;

    let (succeeded, _, _, _) = expect_individual(outcome);
    assert_eq!(succeeded, 2);
}

#[tokio::test]
async fn missing_group_without_addressees_fails() {
    let backend = Arc::new(FakeBackend::new());
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::group("hi", Vec::new(), "Ghost Group"))
        .await;

    assert_eq!(
        outcome,
        Err(DeliveryError::GroupNotFoundNoFallback {
            conversation_hint: "Ghost Group".to_owned(),
        })
    );
    assert!(backend.addressee_sends().is_empty());
}

#[tokio::test]
async fn fallback_with_every_send_failing_is_an_error() {
    let backend = Arc::new(FakeBackend::new().with_failing(&[ALICE]));
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::group("hi", numbers(&[ALICE]), "Ghost Group"))
        .await;

    assert!(matches!(
        outcome,
        Err(DeliveryError::AllDeliveriesFailed { .. })
    ));
    assert_eq!(backend.conversation_sends().len(), 1);
}

#[tokio::test]
async fn group_match_is_case_sensitive_substring() {
    let backend = Arc::new(FakeBackend::new().with_conversations(&["Weekend Work Team"]));
    let controller = controller(&backend);

    let hit = controller
        .deliver(&DeliveryRequest::group("hi", Vec::new(), "Work"))
        .await;
    assert_eq!(hit.map(|o| o.mode()), Ok("group"));

    let miss = controller
        .deliver(&DeliveryRequest::group("hi", Vec::new(), "work"))
        .await;
    assert!(matches!(
        miss,
        Err(DeliveryError::GroupNotFoundNoFallback { .. })
    ));
}

#[tokio::test]
async fn transport_error_does_not_fall_back_by_default() {
    let backend = Arc::new(FakeBackend::new().with_conversation_transport_error());
    let outcome = controller(&backend)
        .deliver(&DeliveryRequest::group("hi", numbers(&[ALICE]), "Work"))
        .await;

    match outcome {
        Err(DeliveryError::Backend(reason)) => assert!(reason.contains("not running")),
        other => panic!("expected backend error, got {other:?}"),
    }
    assert!(backend.addressee_sends().is_empty());
}

#[tokio::test]
async fn any_error_policy_falls_back_on_transport_error() {
    let backend = Arc::new(FakeBackend::new().with_conversation_transport_error());
    let controller = controller(&backend).with_fallback_policy(FallbackPolicy::AnyError);

    let outcome = controller
        .deliver(&DeliveryRequest::group("hi", numbers(&[ALICE]), "Work"))
        .await;

    let (succeeded, _, _, fallback_from) = expect_individual(outcome);
    assert_eq!(succeeded, 1);
    assert_eq!(fallback_from.as_deref(), Some("Work"));
}

#[test]
fn fallback_policy_parses_from_config_strings() {
    assert_eq!("not_found".parse(), Ok(FallbackPolicy::NotFound));
    assert_eq!("any-error".parse(), Ok(FallbackPolicy::AnyError));
    assert!("sometimes".parse::<FallbackPolicy>().is_err());
}

#[test]
fn client_errors_are_classified() {
    assert!(DeliveryError::MissingMessage.is_client_error());
    assert!(DeliveryError::AddresseesRequired.is_client_error());
    assert!(DeliveryError::EmptyAddresseeList.is_client_error());
    assert!(DeliveryError::InvalidAddressees { offending: vec![] }.is_client_error());
    assert!(!DeliveryError::Backend("boom".to_owned()).is_client_error());
    assert!(!DeliveryError::GroupNotFoundNoFallback {
        conversation_hint: "x".to_owned()
    }
    .is_client_error());
    assert!(!DeliveryError::AllDeliveriesFailed { failures: vec![] }.is_client_error());
}
