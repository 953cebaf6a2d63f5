use super::ids::{AllocationId, ChargeId, LeaseId, OrganizationId, PaymentId};
use super::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lease lookup record: only the owning organization matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub organization_id: OrganizationId,
}

/// An incoming payment, created by the payment-intake process.
///
/// `lease_id` is empty when intake has not tied the payment to a lease yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub organization_id: OrganizationId,
    pub lease_id: Option<LeaseId>,
}

/// Ledger row linking a payment to one charge it paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub id: AllocationId,
    pub organization_id: OrganizationId,
    pub payment_id: PaymentId,
    pub charge_id: ChargeId,
    pub allocated_amount: Money,
    /// 0-based position within the payment's allocation set.
    pub allocation_order: u32,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An allocation row before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAllocation {
    pub organization_id: OrganizationId,
    pub payment_id: PaymentId,
    pub charge_id: ChargeId,
    pub allocated_amount: Money,
    pub allocation_order: u32,
    pub external_id: Option<String>,
}

impl NewAllocation {
    pub fn into_allocation(self, id: AllocationId, now: DateTime<Utc>) -> PaymentAllocation {
        PaymentAllocation {
            id,
            organization_id: self.organization_id,
            payment_id: self.payment_id,
            charge_id: self.charge_id,
            allocated_amount: self.allocated_amount,
            allocation_order: self.allocation_order,
            external_id: self.external_id,
            created_at: now,
            updated_at: now,
        }
    }
}
