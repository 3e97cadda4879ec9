use bluepay::application::expiry_watch::ExpiryWatch;
use bluepay::application::token_lifecycle::{RegenerateOutcome, TokenLifecycleManager, TokenNotice};
use bluepay::application::verification::{TokenVerifier, Verification};
use bluepay::config::TokenPolicy;
use bluepay::domain::money::Amount;
use bluepay::domain::ports::Clock;
use bluepay::domain::token::{Receiver, TimeRemaining};
use bluepay::infrastructure::clock::ManualClock;
use bluepay::infrastructure::in_memory::{Behaviour, InMemoryGateway};
use bluepay::interfaces::json::payload::{PayloadOrigin, decode_payload};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    clock: ManualClock,
    gateway: InMemoryGateway,
    manager: Arc<TokenLifecycleManager>,
}

fn harness(policy: TokenPolicy) -> Harness {
    let clock = ManualClock::default();
    let gateway = InMemoryGateway::with_clock(Arc::new(clock.clone()));
    let manager = Arc::new(TokenLifecycleManager::new(
        Arc::new(gateway.clone()),
        Arc::new(clock.clone()),
        Receiver::new("+250788000000", "Alice"),
        policy,
    ));
    Harness {
        clock,
        gateway,
        manager,
    }
}

#[tokio::test(start_paused = true)]
async fn test_receive_screen_session() {
    let h = harness(TokenPolicy::default());

    let RegenerateOutcome::Applied(first) = h.manager.regenerate().await else {
        panic!("first token was not applied");
    };
    assert!(first.is_verified());
    assert_eq!(first.requested_amount(), None);

    let outcome = h
        .manager
        .set_request(Some(Amount::new(dec!(5000)).unwrap()), Some(" lunch ".into()))
        .await;
    let RegenerateOutcome::Applied(second) = outcome else {
        panic!("edit did not produce a token: {outcome:?}");
    };
    assert_ne!(second.token_id(), first.token_id());
    assert_eq!(second.message(), Some("lunch"));
    assert_eq!(h.gateway.create_token_calls(), 2);

    let payload = decode_payload(&h.manager.export_payload().await.unwrap()).unwrap();
    assert_eq!(payload.origin, PayloadOrigin::Gateway);
    assert_eq!(payload.amount.map(|a| a.value()), Some(dec!(5000)));
    assert_eq!(payload.recipient.display_name, "Alice");

    h.clock.advance(Duration::from_secs(61));
    assert_eq!(
        h.manager.time_remaining(h.clock.now()).await,
        Some(TimeRemaining::Remaining(Duration::from_secs(239)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_outage_and_recovery() {
    let h = harness(TokenPolicy::default());
    let mut notices = h.manager.subscribe();
    h.gateway.set_token_behaviour(Behaviour::Unreachable).await;

    let RegenerateOutcome::Applied(offline) = h.manager.regenerate().await else {
        panic!("fallback was not applied");
    };
    assert!(!offline.is_verified());
    assert!(offline.token_id().as_str().starts_with("local-"));
    assert!(matches!(
        notices.try_recv(),
        Ok(TokenNotice::Unverified { .. })
    ));

    // The expiry watch renews the fallback once the gateway is back.
    h.gateway.set_token_behaviour(Behaviour::Respond).await;
    let watch = ExpiryWatch::spawn(Arc::clone(&h.manager), Duration::from_secs(1));
    h.clock.advance(Duration::from_secs(300));
    tokio::time::sleep(Duration::from_secs(2)).await;

    let renewed = h.manager.current_token().await.unwrap();
    assert!(renewed.is_verified());
    assert!(notices.try_recv().is_err());
    watch.stop();
}

#[tokio::test(start_paused = true)]
async fn test_expiry_storm_costs_one_request() {
    let h = harness(TokenPolicy::default());
    h.manager.regenerate().await;
    h.gateway.set_token_delay(Duration::from_secs(5)).await;

    let watch = ExpiryWatch::spawn(Arc::clone(&h.manager), Duration::from_secs(1));
    h.clock.advance(Duration::from_secs(301));
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(h.manager.snapshot().await.regenerating);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!h.manager.snapshot().await.regenerating);
    assert_eq!(h.gateway.create_token_calls(), 2);
    watch.stop();
}

#[tokio::test(start_paused = true)]
async fn test_scanner_sees_what_receiver_shows() {
    let h = harness(TokenPolicy::default());
    h.manager.regenerate().await;
    let raw = h.manager.export_payload().await.unwrap();

    let verifier = TokenVerifier::new(
        Arc::new(h.gateway.clone()),
        Arc::new(h.clock.clone()),
        Duration::from_secs(10),
    );
    assert!(verifier.verify(&raw).await.unwrap().is_verified());

    h.manager.clear().await;
    assert!(h.manager.export_payload().await.is_err());

    h.clock.advance(Duration::from_secs(300));
    assert!(matches!(
        verifier.verify(&raw).await.unwrap(),
        Verification::Rejected { .. }
    ));
}
