//! Publish: zero or more subscribers, in registration order, fail-fast.

use relay_rust::{CommandProcessor, CommandProcessorBuilder, DispatchError, HandlerError, Lifetime};

use crate::support::{BillingHandler, EmailHandler, OrderPlaced, Probe, ShippingHandler};

fn processor(probe: &std::sync::Arc<Probe>) -> CommandProcessor {
    let (billing, shipping, email) = (probe.clone(), probe.clone(), probe.clone());
    CommandProcessorBuilder::new()
        .with_handler::<OrderPlaced, BillingHandler, _>(Lifetime::Transient, move || {
            BillingHandler { probe: billing.clone() }
        })
        .with_handler::<OrderPlaced, ShippingHandler, _>(Lifetime::Transient, move || {
            ShippingHandler { probe: shipping.clone() }
        })
        .with_handler::<OrderPlaced, EmailHandler, _>(Lifetime::Transient, move || EmailHandler {
            probe: email.clone(),
        })
        .build()
        .unwrap()
}

#[test]
fn publish_reaches_every_subscriber_in_registration_order() {
    let probe = Probe::new();
    processor(&probe).publish(&OrderPlaced::new()).unwrap();

    assert_eq!(probe.log(), vec!["billing", "shipping", "email"]);
    assert_eq!(probe.disposed(), 3);
}

#[test]
fn publish_without_subscribers_succeeds() {
    let processor = CommandProcessor::builder().build().unwrap();
    processor.publish(&OrderPlaced::new()).unwrap();
}

#[test]
fn first_failing_subscriber_stops_the_fan_out() {
    let probe = Probe::new();
    let err = processor(&probe)
        .publish(&OrderPlaced::failing_in("shipping"))
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Handler(HandlerError::Rejected(ref reason)) if reason == "shipping refused"
    ));
    assert_eq!(probe.log(), vec!["billing", "shipping"]);
    // both created handlers are released, the third is never built
    assert_eq!(probe.disposed(), 2);
}

#[test]
fn each_subscriber_gets_its_own_context_copy() {
    let probe = Probe::new();
    let processor = processor(&probe);
    let context = processor.context();
    context.set("tenant", "acme");

    processor.publish_with_context(&OrderPlaced::new(), &context).unwrap();

    assert_eq!(context.get("tenant"), Some(serde_json::json!("acme")));
    // writes made by subscribers stay in their copies
    assert_eq!(context.get("seen_by"), None);
    assert_eq!(probe.handled(), 3);
}
