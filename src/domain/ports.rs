use super::charge::Charge;
use super::ids::{ChargeId, LeaseId, OrganizationId, PaymentId};
use super::payment::{Lease, NewAllocation, Payment, PaymentAllocation};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Transactional ledger store the allocation engine runs against.
///
/// Implementations must make everything staged through a
/// [`LedgerTransaction`] visible atomically on commit, and nothing of it
/// when the transaction is rolled back or dropped.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a unit of work.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>>;

    /// Committed charges of a lease, in no particular order. Takes no locks.
    async fn lease_charges(&self, lease_id: LeaseId) -> Result<Vec<Charge>>;
}

/// A scoped unit of work holding exclusive row locks.
///
/// Locks taken through the `lock_*` methods are held until
/// [`commit`](LedgerTransaction::commit) or
/// [`rollback`](LedgerTransaction::rollback), or until the transaction is
/// dropped, which rolls it back.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn lock_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>>;

    async fn lease(&mut self, lease_id: LeaseId) -> Result<Option<Lease>>;

    /// Serializes transactions carrying the same external correlation id.
    async fn lock_external_id(
        &mut self,
        organization_id: OrganizationId,
        external_id: &str,
    ) -> Result<()>;

    /// Allocation rows of a payment, ordered by `allocation_order`.
    async fn allocations_for_payment(
        &mut self,
        organization_id: OrganizationId,
        payment_id: PaymentId,
    ) -> Result<Vec<PaymentAllocation>>;

    async fn payment_for_external_id(
        &mut self,
        organization_id: OrganizationId,
        external_id: &str,
    ) -> Result<Option<PaymentId>>;

    /// Reads charges without locking them, in the order of `ids`.
    async fn charges(
        &mut self,
        organization_id: OrganizationId,
        ids: &[ChargeId],
    ) -> Result<Vec<Charge>>;

    /// Locks and returns every charge of the lease.
    async fn lock_lease_charges(
        &mut self,
        organization_id: OrganizationId,
        lease_id: LeaseId,
    ) -> Result<Vec<Charge>>;

    /// Locks and returns the listed charges of the lease, in the order of
    /// `ids`. Ids that do not exist or belong elsewhere are skipped.
    async fn lock_charges(
        &mut self,
        organization_id: OrganizationId,
        lease_id: LeaseId,
        ids: &[ChargeId],
    ) -> Result<Vec<Charge>>;

    /// Stages a charge update. The charge must be locked by this transaction.
    async fn update_charge(&mut self, charge: Charge) -> Result<()>;

    async fn insert_allocation(&mut self, allocation: NewAllocation) -> Result<PaymentAllocation>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Write path for the collaborators that own leases, payments and charges
/// (lease administration, payment intake, billing schedule).
#[async_trait]
pub trait LedgerImport: Send + Sync {
    async fn put_lease(&self, lease: Lease) -> Result<()>;
    async fn put_payment(&self, payment: Payment) -> Result<()>;
    async fn put_charge(&self, charge: Charge) -> Result<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
