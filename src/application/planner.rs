//! Pure allocation planning.
//!
//! Nothing here touches storage: a plan can be computed speculatively and
//! thrown away.

use crate::domain::charge::Charge;
use crate::domain::ids::ChargeId;
use crate::domain::money::{Amount, Money};
use crate::domain::waterfall::WaterfallOrder;
use crate::error::{AllocationError, Result};
use std::collections::{HashMap, HashSet};

/// Caller-chosen amount for one charge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualAllocation {
    pub charge_id: ChargeId,
    pub amount: Money,
}

impl ManualAllocation {
    pub fn new(charge_id: ChargeId, amount: Money) -> Self {
        Self { charge_id, amount }
    }
}

/// How a payment is spread over the lease's charges.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationStrategy {
    /// Pay charges in waterfall order. `None` uses the engine default.
    Waterfall { order: Option<WaterfallOrder> },
    /// Pay exactly the listed amounts, in the listed order.
    Manual(Vec<ManualAllocation>),
}

impl Default for AllocationStrategy {
    fn default() -> Self {
        AllocationStrategy::Waterfall { order: None }
    }
}

impl AllocationStrategy {
    pub fn waterfall(order: WaterfallOrder) -> Self {
        AllocationStrategy::Waterfall { order: Some(order) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedAllocation {
    pub charge_id: ChargeId,
    pub amount: Money,
}

/// Ordered (charge, amount) pairs whose amounts add up to the payment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllocationPlan {
    items: Vec<PlannedAllocation>,
}

impl AllocationPlan {
    pub fn items(&self) -> &[PlannedAllocation] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.items.iter().map(|item| item.amount).sum()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl IntoIterator for AllocationPlan {
    type Item = PlannedAllocation;
    type IntoIter = std::vec::IntoIter<PlannedAllocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Computes how `payment` is applied to `charges`.
///
/// In waterfall mode `charges` must already be in payment order. In manual
/// mode they are the eligible charges the manual list may reference.
pub fn plan(
    payment: Amount,
    charges: &[Charge],
    strategy: &AllocationStrategy,
) -> Result<AllocationPlan> {
    match strategy {
        AllocationStrategy::Waterfall { .. } => plan_waterfall(payment, charges),
        AllocationStrategy::Manual(items) => plan_manual(payment, charges, items),
    }
}

fn plan_waterfall(payment: Amount, charges: &[Charge]) -> Result<AllocationPlan> {
    let mut remaining = payment.money();
    let mut items = Vec::new();

    for charge in charges {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(charge.amount_open);
        if !take.is_positive() {
            continue;
        }
        items.push(PlannedAllocation {
            charge_id: charge.id,
            amount: take,
        });
        remaining -= take;
    }

    if remaining.is_positive() {
        return Err(AllocationError::InsufficientOpenCharges { remaining });
    }
    Ok(AllocationPlan { items })
}

fn plan_manual(
    payment: Amount,
    charges: &[Charge],
    manual: &[ManualAllocation],
) -> Result<AllocationPlan> {
    let mut seen = HashSet::with_capacity(manual.len());
    for item in manual {
        if item.amount.is_negative() {
            return Err(AllocationError::NegativeManualAmount(item.charge_id));
        }
        if !seen.insert(item.charge_id) {
            return Err(AllocationError::DuplicateManualCharge(item.charge_id));
        }
    }

    let requested = manual
        .iter()
        .try_fold(Money::ZERO, |total, item| total.checked_add(item.amount))
        .ok_or_else(|| {
            AllocationError::InvalidRequest("manual allocation amounts overflow".to_string())
        })?;
    if requested != payment.money() {
        return Err(AllocationError::ManualSumMismatch {
            expected: payment.money(),
            actual: requested,
        });
    }

    let eligible: HashMap<ChargeId, &Charge> = charges
        .iter()
        .filter(|c| c.is_outstanding())
        .map(|c| (c.id, c))
        .collect();
    for item in manual {
        if !eligible.contains_key(&item.charge_id) {
            return Err(AllocationError::ManualChargeNotEligible(item.charge_id));
        }
    }

    for item in manual {
        let Some(charge) = eligible.get(&item.charge_id) else {
            continue;
        };
        let open = charge.amount_open;
        if item.amount > open {
            return Err(AllocationError::ManualExceedsBalance {
                charge: item.charge_id,
                requested: item.amount,
                open,
            });
        }
    }

    // Zero entries are valid but move no money.
    let items = manual
        .iter()
        .filter(|item| item.amount.is_positive())
        .map(|item| PlannedAllocation {
            charge_id: item.charge_id,
            amount: item.amount,
        })
        .collect();
    Ok(AllocationPlan { items })
}
