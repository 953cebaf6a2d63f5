mod common;

use common::{Fixture, LEASE, charge};
use lease_ledger::application::executor::PaymentRequest;
use lease_ledger::application::planner::ManualAllocation;
use lease_ledger::domain::charge::ChargeType;
use lease_ledger::domain::ids::ChargeId;
use lease_ledger::domain::money::Money;
use lease_ledger::error::AllocationError;
use rust_decimal_macros::dec;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_write_one_allocation_set() {
    let fixture = Fixture::new(vec![
        charge(1, ChargeType::Rent, dec!(1000.00), 1),
        charge(2, ChargeType::LateFee, dec!(50.00), 6),
    ])
    .await;
    let payment = fixture.payment(1).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let executor = fixture.executor.clone();
        handles.push(tokio::spawn(async move {
            executor
                .allocate_payment(PaymentRequest::waterfall(dec!(1030.00), LEASE, payment))
                .await
        }));
    }

    let mut fresh = 0;
    let mut first_allocations = None;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if !outcome.replayed {
            fresh += 1;
        }
        match &first_allocations {
            None => first_allocations = Some(outcome.allocations.clone()),
            Some(expected) => assert_eq!(expected, &outcome.allocations),
        }
    }

    assert_eq!(fresh, 1);
    assert_eq!(fixture.ledger.all_allocations().await.len(), 2);
    assert_eq!(fixture.open_total().await, Money::new(dec!(20)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_never_overdraw() {
    let fixture = Fixture::new(vec![
        charge(1, ChargeType::Rent, dec!(1000.00), 1),
        charge(2, ChargeType::LateFee, dec!(50.00), 6),
    ])
    .await;

    let mut handles = Vec::new();
    for id in 1..=20 {
        let payment = fixture.payment(id).await;
        let executor = fixture.executor.clone();
        handles.push(tokio::spawn(async move {
            executor
                .allocate_payment(PaymentRequest::waterfall(dec!(100.00), LEASE, payment))
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                let total: Money = outcome.allocations.iter().map(|a| a.allocated_amount).sum();
                assert_eq!(total, Money::new(dec!(100)));
                succeeded += 1;
            }
            Err(AllocationError::InsufficientOpenCharges { .. }) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(fixture.open_total().await, Money::new(dec!(50)));
    for charge in fixture.charges().await {
        assert!(!charge.amount_open.is_negative());
        assert!(charge.amount_open <= charge.amount);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_sharing_external_id() {
    let fixture = Fixture::new(vec![charge(1, ChargeType::Rent, dec!(1000.00), 1)]).await;

    let mut handles = Vec::new();
    for id in 1..=8 {
        let payment = fixture.payment(id).await;
        let executor = fixture.executor.clone();
        handles.push(tokio::spawn(async move {
            executor
                .allocate_payment(
                    PaymentRequest::waterfall(dec!(250.00), LEASE, payment)
                        .with_external_id("lockbox-42"),
                )
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rows = fixture.ledger.all_allocations().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].external_id.as_deref(), Some("lockbox-42"));
    assert_eq!(fixture.charge(1).await.amount_open, Money::new(dec!(750)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_manual_and_waterfall_payments_on_one_lease_do_not_deadlock() {
    let fixture = Fixture::new(vec![
        charge(1, ChargeType::Rent, dec!(1000.00), 1),
        charge(2, ChargeType::LateFee, dec!(100.00), 6),
        charge(3, ChargeType::Utility, dec!(80.00), 10),
    ])
    .await;
    let initial = fixture.open_total().await;

    let mut handles = Vec::new();
    for id in 1..=24 {
        let payment = fixture.payment(id).await;
        let executor = fixture.executor.clone();
        let request = if id % 2 == 0 {
            // Charges listed highest id first
            PaymentRequest::manual(
                dec!(15.00),
                LEASE,
                payment,
                vec![
                    ManualAllocation::new(ChargeId(3), Money::new(dec!(5))),
                    ManualAllocation::new(ChargeId(2), Money::new(dec!(5))),
                    ManualAllocation::new(ChargeId(1), Money::new(dec!(5))),
                ],
            )
        } else {
            PaymentRequest::waterfall(dec!(40.00), LEASE, payment)
        };
        handles.push(tokio::spawn(async move { executor.allocate_payment(request).await }));
    }

    let allocated = tokio::time::timeout(Duration::from_secs(10), async {
        let mut allocated = Money::ZERO;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => {
                    allocated += outcome
                        .allocations
                        .iter()
                        .map(|a| a.allocated_amount)
                        .sum::<Money>();
                }
                Err(AllocationError::InsufficientOpenCharges { .. })
                | Err(AllocationError::ManualExceedsBalance { .. }) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        allocated
    })
    .await
    .expect("allocations did not finish");

    assert_eq!(allocated, Money::new(dec!(660)));
    assert_eq!(fixture.open_total().await, initial - allocated);
    for charge in fixture.charges().await {
        assert!(!charge.amount_open.is_negative());
    }
}
