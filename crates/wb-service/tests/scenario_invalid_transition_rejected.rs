use std::sync::Arc;

use wb_codec::SigningKey;
use wb_location::{LocationConfig, LocationValidator};
use wb_schemas::OrderStatus;
use wb_service::{NewOrder, OrderError, OrderService, ServiceConfig};
use wb_store::MemoryStore;

fn service() -> OrderService<MemoryStore> {
    OrderService::new(
        Arc::new(MemoryStore::new()),
        LocationValidator::new(LocationConfig::default(), SigningKey::from_secret_str("k")),
        ServiceConfig::default(),
    )
}

fn pending_order(svc: &OrderService<MemoryStore>) -> String {
    svc.create_order(NewOrder {
        customer_id: "C1".to_string(),
        product_name: "Widget".to_string(),
        product_id: None,
        quantity: 5,
    })
    .unwrap()
    .order
    .order_id
}

#[test]
fn pending_cannot_jump_to_delivered() {
    let svc = service();
    let id = pending_order(&svc);

    match svc.update_status(&id, OrderStatus::Delivered).unwrap_err() {
        OrderError::InvalidTransition { from, to } => {
            assert_eq!(from, OrderStatus::Pending);
            assert_eq!(to, OrderStatus::Delivered);
        }
        other => panic!("expected InvalidTransition, got {other}"),
    }

    assert_eq!(svc.get_order(&id).unwrap().order.status, OrderStatus::Pending);
    assert_eq!(svc.ledger().history_for(&id).unwrap().len(), 1);
}

#[test]
fn skipping_or_reversing_is_refused() {
    let svc = service();
    let id = pending_order(&svc);
    svc.dispatch(&id, None).unwrap();

    for target in [
        OrderStatus::Pending,
        OrderStatus::Packed,
        OrderStatus::InTransit,
        OrderStatus::OutForDelivery,
    ] {
        let err = svc.update_status(&id, target).unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION", "packed -> {target}");
    }
    assert_eq!(svc.get_order(&id).unwrap().order.status, OrderStatus::Packed);
}

#[test]
fn deliver_requires_out_for_delivery() {
    let svc = service();
    let id = pending_order(&svc);
    svc.dispatch(&id, None).unwrap();
    svc.update_status(&id, OrderStatus::Dispatched).unwrap();

    let err = svc.deliver(&id, Some("proof".to_string())).unwrap_err();
    assert_eq!(err.code(), "INVALID_TRANSITION");
    let order = svc.get_order(&id).unwrap().order;
    assert!(order.delivered_at.is_none());
    assert!(order.delivery_proof.is_none());
}
