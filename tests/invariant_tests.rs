mod common;

use common::{Fixture, LEASE, charge};
use lease_ledger::application::executor::PaymentRequest;
use lease_ledger::application::planner::ManualAllocation;
use lease_ledger::domain::charge::{Charge, ChargeStatus, ChargeType};
use lease_ledger::domain::ids::ChargeId;
use lease_ledger::domain::money::Money;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;

const TYPES: [ChargeType; 6] = [
    ChargeType::Rent,
    ChargeType::LateFee,
    ChargeType::Utility,
    ChargeType::Deposit,
    ChargeType::Maintenance,
    ChargeType::Other,
];

fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

fn random_charges(rng: &mut StdRng) -> Vec<Charge> {
    (1..=rng.gen_range(1..8))
        .map(|id| {
            let charge_type = *TYPES.choose(rng).unwrap();
            charge(id, charge_type, cents(rng.gen_range(1..200_000)), rng.gen_range(1..28))
        })
        .collect()
}

fn check_status(charge: &Charge) {
    let expected = if !charge.amount_open.is_positive() {
        ChargeStatus::Paid
    } else if charge.amount_open < charge.amount {
        ChargeStatus::Partial
    } else {
        ChargeStatus::Open
    };
    assert_eq!(charge.status, expected, "charge {}", charge.id);
}

fn by_id(charges: Vec<Charge>) -> HashMap<ChargeId, Charge> {
    charges.into_iter().map(|c| (c.id, c)).collect()
}

#[tokio::test]
async fn test_random_waterfall_payments_keep_ledger_consistent() {
    let mut rng = StdRng::seed_from_u64(0x1ea5e);

    for _ in 0..25 {
        let fixture = Fixture::new(random_charges(&mut rng)).await;

        for payment_id in 1..=6 {
            let payment = fixture.payment(payment_id).await;
            let amount = cents(rng.gen_range(1..150_000));
            let before = by_id(fixture.charges().await);

            let result = fixture
                .executor
                .allocate_payment(PaymentRequest::waterfall(amount, LEASE, payment))
                .await;
            let after = by_id(fixture.charges().await);

            match result {
                Ok(outcome) => {
                    let total: Money = outcome.allocations.iter().map(|a| a.allocated_amount).sum();
                    assert_eq!(total, Money::new(amount));
                    for (id, charge) in &after {
                        let prior = &before[id];
                        assert!(!charge.amount_open.is_negative());
                        assert!(charge.amount_open <= prior.amount_open);
                        assert!(charge.amount_open <= charge.amount);
                        check_status(charge);
                    }
                }
                Err(_) => assert_eq!(before, after),
            }
        }
    }
}

#[tokio::test]
async fn test_random_manual_payments_move_exact_amounts() {
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..25 {
        let fixture = Fixture::new(random_charges(&mut rng)).await;
        let payment = fixture.payment(1).await;
        let charges = fixture.charges().await;

        let mut manual = Vec::new();
        let mut total = Money::ZERO;
        for charge in &charges {
            if !rng.gen_bool(0.6) {
                continue;
            }
            let open_cents = (charge.amount_open.value() * Decimal::from(100))
                .to_i64()
                .unwrap();
            let amount = Money::new(cents(rng.gen_range(0..=open_cents)));
            total += amount;
            manual.push(ManualAllocation::new(charge.id, amount));
        }
        if !total.is_positive() {
            continue;
        }

        let outcome = fixture
            .executor
            .allocate_payment(PaymentRequest::manual(total.value(), LEASE, payment, manual.clone()))
            .await
            .unwrap();

        let after = by_id(fixture.charges().await);
        for item in &manual {
            let original = charges.iter().find(|c| c.id == item.charge_id).unwrap();
            let updated = &after[&item.charge_id];
            assert_eq!(updated.amount_open, original.amount_open - item.amount);
            check_status(updated);
        }
        let written: Money = outcome.allocations.iter().map(|a| a.allocated_amount).sum();
        assert_eq!(written, total);
    }
}
