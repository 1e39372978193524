//! Pipeline assembly through the processor: order, policies, failures.

use std::sync::{Arc, OnceLock};
use std::thread;

use relay_rust::handler::HandlerResolver;
use relay_rust::pipeline::{Middleware, MiddlewareDirective, Next, PipelineBuilder};
use relay_rust::policy::RetryPolicy;
use relay_rust::{
    Command, CommandProcessor, ConfigurationError, Handler, HandlerDescriptor, HandlerError,
    Lifetime, Request, RequestContext,
};

use crate::support::{CreateOrder, CreateOrderHandler, Probe};

#[test]
fn trace_shows_before_handler_after() {
    let probe = Probe::new();
    let mut resolver = HandlerResolver::new();
    resolver.register_transient::<CreateOrder, CreateOrderHandler, _>(move || CreateOrderHandler {
        probe: probe.clone(),
    });

    let pipeline = PipelineBuilder::new(&resolver)
        .build::<CreateOrder>(&HandlerDescriptor::of::<CreateOrder, CreateOrderHandler>())
        .unwrap();

    assert_eq!(
        pipeline.trace().to_string(),
        "Validation | CreateOrderHandler | RequestLogging |"
    );
}

#[test]
fn unknown_middleware_fails_when_building_the_processor() {
    let descriptor = HandlerDescriptor::of::<CreateOrder, CreateOrderHandler>()
        .with_directive(MiddlewareDirective::after(5, "metrics"));
    let probe = Probe::new();

    let result = CommandProcessor::builder()
        .with_descriptor::<CreateOrder, CreateOrderHandler, _>(
            descriptor,
            Lifetime::Transient,
            move || CreateOrderHandler { probe: probe.clone() },
        )
        .build();

    assert!(matches!(
        result,
        Err(ConfigurationError::UnknownMiddleware { ref name, ref handler })
            if name == "metrics" && handler == "CreateOrderHandler"
    ));
}

#[derive(Debug)]
struct ReserveStock {
    id: String,
}

impl Request for ReserveStock {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Command for ReserveStock {}

/// Times out on the first two attempts.
struct FlakyWarehouse {
    probe: Arc<Probe>,
}

impl Handler<ReserveStock> for FlakyWarehouse {
    fn handle(&mut self, _: &ReserveStock, _: &RequestContext) -> Result<(), HandlerError> {
        self.probe.record("attempt");
        if self.probe.handled() < 3 {
            return Err(HandlerError::other("warehouse timed out"));
        }
        Ok(())
    }

    fn directives() -> Vec<MiddlewareDirective> {
        vec![MiddlewareDirective::before(0, "policy").with_param("retry")]
    }
}

#[test]
fn named_policy_retries_the_rest_of_the_pipeline() {
    let probe = Probe::new();
    let factory_probe = probe.clone();
    let processor = CommandProcessor::builder()
        .with_policy("retry", RetryPolicy::new(2))
        .with_handler::<ReserveStock, FlakyWarehouse, _>(Lifetime::Singleton, move || {
            FlakyWarehouse { probe: factory_probe.clone() }
        })
        .build()
        .unwrap();

    processor
        .send(&ReserveStock {
            id: relay_rust::new_id(),
        })
        .unwrap();
    assert_eq!(probe.handled(), 3);
}

#[test]
fn unknown_policy_fails_when_building_the_processor() {
    let probe = Probe::new();
    let factory_probe = probe.clone();
    let result = CommandProcessor::builder()
        .with_handler::<ReserveStock, FlakyWarehouse, _>(Lifetime::Transient, move || {
            FlakyWarehouse {
                probe: factory_probe.clone(),
            }
        })
        .build();

    assert!(matches!(
        result,
        Err(ConfigurationError::UnknownPolicy { ref name }) if name == "retry"
    ));
    assert_eq!(probe.handled(), 0);
}

#[test]
fn bad_init_params_fail_when_building_the_processor() {
    let descriptor = HandlerDescriptor::new::<CreateOrder, CreateOrderHandler>(vec![
        MiddlewareDirective::after(0, "logging").with_param(3),
    ]);
    let probe = Probe::new();

    let result = CommandProcessor::builder()
        .with_descriptor::<CreateOrder, CreateOrderHandler, _>(
            descriptor,
            Lifetime::Transient,
            move || CreateOrderHandler {
                probe: probe.clone(),
            },
        )
        .build();

    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidInitParams { ref middleware, .. }) if middleware == "logging"
    ));
}

/// Records every request it sees. One instance serves all dispatches.
struct Audit {
    probe: Arc<Probe>,
}

impl Middleware for Audit {
    fn handle(&self, next: Next<'_>) -> Result<(), HandlerError> {
        self.probe.record(next.request().id());
        next.proceed()
    }

    fn dispose(&mut self) {
        self.probe.record_dispose();
    }
}

#[derive(Debug)]
struct Checkout {
    id: String,
}

impl Request for Checkout {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Command for Checkout {}

#[derive(Debug)]
struct ChargeCard {
    id: String,
}

impl Request for ChargeCard {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Command for ChargeCard {}

type ProcessorSlot = Arc<OnceLock<Arc<CommandProcessor>>>;

/// Charges the card through the processor while its own pipeline is running.
struct CheckoutHandler {
    processor: ProcessorSlot,
}

impl Handler<Checkout> for CheckoutHandler {
    fn handle(&mut self, checkout: &Checkout, _: &RequestContext) -> Result<(), HandlerError> {
        let processor = self
            .processor
            .get()
            .ok_or_else(|| HandlerError::other("processor not wired"))?;
        processor
            .send(&ChargeCard {
                id: format!("{}-charge", checkout.id),
            })
            .map_err(HandlerError::other)
    }

    fn directives() -> Vec<MiddlewareDirective> {
        vec![MiddlewareDirective::before(0, "audit")]
    }
}

struct ChargeCardHandler {
    probe: Arc<Probe>,
}

impl Handler<ChargeCard> for ChargeCardHandler {
    fn handle(&mut self, charge: &ChargeCard, _: &RequestContext) -> Result<(), HandlerError> {
        self.probe.record(charge.id.clone());
        Ok(())
    }

    fn dispose(&mut self) {
        self.probe.record_dispose();
    }

    fn directives() -> Vec<MiddlewareDirective> {
        vec![MiddlewareDirective::before(0, "audit")]
    }
}

#[test]
fn singleton_middleware_allows_nested_dispatch() {
    let audit = Probe::new();
    let charges = Probe::new();
    let slot: ProcessorSlot = Arc::new(OnceLock::new());
    let handler_slot = Arc::clone(&slot);
    let charge_probe = charges.clone();

    let processor = Arc::new(
        CommandProcessor::builder()
            .with_singleton_middleware("audit", Audit { probe: audit.clone() })
            .with_handler::<Checkout, CheckoutHandler, _>(Lifetime::Transient, move || {
                CheckoutHandler {
                    processor: Arc::clone(&handler_slot),
                }
            })
            .with_handler::<ChargeCard, ChargeCardHandler, _>(Lifetime::Transient, move || {
                ChargeCardHandler {
                    probe: charge_probe.clone(),
                }
            })
            .build()
            .unwrap(),
    );
    assert!(slot.set(Arc::clone(&processor)).is_ok());

    processor
        .send(&Checkout {
            id: "checkout-1".into(),
        })
        .unwrap();

    assert_eq!(charges.log(), vec!["checkout-1-charge"]);
    assert_eq!(audit.log(), vec!["checkout-1", "checkout-1-charge"]);
}

#[test]
fn singleton_middleware_is_never_disposed() {
    let audit = Probe::new();
    let charges = Probe::new();
    let charge_probe = charges.clone();
    let processor = Arc::new(
        CommandProcessor::builder()
            .with_singleton_middleware("audit", Audit { probe: audit.clone() })
            .with_handler::<ChargeCard, ChargeCardHandler, _>(Lifetime::Transient, move || {
                ChargeCardHandler {
                    probe: charge_probe.clone(),
                }
            })
            .build()
            .unwrap(),
    );

    let senders: Vec<_> = (0..4)
        .map(|i| {
            let processor = Arc::clone(&processor);
            thread::spawn(move || {
                processor
                    .send(&ChargeCard {
                        id: format!("charge-{i}"),
                    })
                    .unwrap()
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    assert_eq!(audit.handled(), 4);
    assert_eq!(audit.disposed(), 0);
    assert_eq!(charges.disposed(), 4);
}
