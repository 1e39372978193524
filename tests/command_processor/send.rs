//! Send: exactly one handler per command.

use relay_rust::{CommandProcessor, ConfigurationError, DispatchError, HandlerError, Lifetime};

use crate::support::{AuditOrderHandler, CreateOrder, CreateOrderHandler, Probe};

#[test]
fn send_invokes_the_single_handler_once() {
    let probe = Probe::new();
    let factory_probe = probe.clone();
    let processor = CommandProcessor::builder()
        .with_handler::<CreateOrder, CreateOrderHandler, _>(Lifetime::Transient, move || {
            CreateOrderHandler { probe: factory_probe.clone() }
        })
        .build()
        .unwrap();

    processor.send(&CreateOrder::new("A-1")).unwrap();

    assert_eq!(probe.log(), vec!["create:A-1"]);
    assert_eq!(probe.disposed(), 1);
}

#[test]
fn send_without_handler_is_a_configuration_error() {
    let processor = CommandProcessor::builder().build().unwrap();

    let err = processor.send(&CreateOrder::new("A-1")).unwrap_err();
    assert!(err.is_configuration());
    assert!(matches!(
        err,
        DispatchError::Configuration(ConfigurationError::NoHandler { ref request })
            if request == "CreateOrder"
    ));
}

#[test]
fn ambiguous_send_runs_no_handler() {
    let probe = Probe::new();
    let (create_probe, audit_probe) = (probe.clone(), probe.clone());
    let processor = CommandProcessor::builder()
        .with_handler::<CreateOrder, CreateOrderHandler, _>(Lifetime::Transient, move || {
            CreateOrderHandler { probe: create_probe.clone() }
        })
        .with_handler::<CreateOrder, AuditOrderHandler, _>(Lifetime::Transient, move || {
            AuditOrderHandler { probe: audit_probe.clone() }
        })
        .build()
        .unwrap();

    let err = processor.send(&CreateOrder::new("A-1")).unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Configuration(ConfigurationError::AmbiguousHandler { count: 2, .. })
    ));
    assert_eq!(probe.handled(), 0);
    assert_eq!(probe.disposed(), 0);
}

#[test]
fn invalid_command_stops_before_the_handler() {
    let probe = Probe::new();
    let factory_probe = probe.clone();
    let processor = CommandProcessor::builder()
        .with_handler::<CreateOrder, CreateOrderHandler, _>(Lifetime::Transient, move || {
            CreateOrderHandler { probe: factory_probe.clone() }
        })
        .build()
        .unwrap();

    let err = processor.send(&CreateOrder::new("")).unwrap_err();

    assert!(matches!(err.handler_error(), Some(HandlerError::Validation { .. })));
    assert_eq!(probe.handled(), 0);
    // the transient handler was still created for the pipeline, so it is released
    assert_eq!(probe.disposed(), 1);
}

#[test]
fn singleton_handler_is_reused_and_never_disposed() {
    let probe = Probe::new();
    let factory_probe = probe.clone();
    let processor = CommandProcessor::builder()
        .with_handler::<CreateOrder, CreateOrderHandler, _>(Lifetime::Singleton, move || {
            CreateOrderHandler { probe: factory_probe.clone() }
        })
        .build()
        .unwrap();

    for sku in ["A-1", "A-2", "A-3"] {
        processor.send(&CreateOrder::new(sku)).unwrap();
    }

    assert_eq!(probe.handled(), 3);
    assert_eq!(probe.disposed(), 0);
}

#[test]
fn concurrent_sends_share_one_processor() {
    let probe = Probe::new();
    let factory_probe = probe.clone();
    let processor = std::sync::Arc::new(
        CommandProcessor::builder()
            .with_handler::<CreateOrder, CreateOrderHandler, _>(Lifetime::Transient, move || {
                CreateOrderHandler { probe: factory_probe.clone() }
            })
            .build()
            .unwrap(),
    );

    let threads: Vec<_> = (0..4)
        .map(|i| {
            let processor = processor.clone();
            std::thread::spawn(move || {
                for j in 0..25 {
                    processor.send(&CreateOrder::new(&format!("T{i}-{j}"))).unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(probe.handled(), 100);
    assert_eq!(probe.disposed(), 100);
}
