use super::locks::{LockSet, RowKey, RowLocks};
use crate::domain::charge::Charge;
use crate::domain::ids::{AllocationId, ChargeId, LeaseId, OrganizationId, PaymentId};
use crate::domain::payment::{Lease, NewAllocation, Payment, PaymentAllocation};
use crate::domain::ports::{LedgerImport, LedgerStore, LedgerTransaction};
use crate::error::{AllocationError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    leases: HashMap<LeaseId, Lease>,
    payments: HashMap<PaymentId, Payment>,
    charges: BTreeMap<ChargeId, Charge>,
    allocations: Vec<PaymentAllocation>,
}

impl Tables {
    fn check_unique(&self, allocation: &PaymentAllocation) -> Result<()> {
        for existing in &self.allocations {
            if existing.payment_id == allocation.payment_id {
                return Err(AllocationError::Conflict(format!(
                    "payment {} already has allocations",
                    allocation.payment_id
                )));
            }
            if let Some(external_id) = &allocation.external_id
                && existing.organization_id == allocation.organization_id
                && existing.external_id.as_deref() == Some(external_id.as_str())
            {
                return Err(AllocationError::Conflict(format!(
                    "external id '{external_id}' already used by payment {}",
                    existing.payment_id
                )));
            }
        }
        Ok(())
    }
}

/// A thread-safe in-memory ledger.
///
/// Tables live behind one `Arc<RwLock<..>>`; row locks come from a shared
/// [`RowLocks`] table. Transactions stage their writes privately and apply
/// them under the table write lock on commit, so a dropped transaction
/// leaves no trace. Ideal for tests and one-shot CLI runs.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<RowLocks>,
    next_allocation_id: Arc<AtomicU64>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed allocation row, in insertion order.
    pub async fn all_allocations(&self) -> Vec<PaymentAllocation> {
        self.tables.read().await.allocations.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            next_allocation_id: self.next_allocation_id.clone(),
            locks: LockSet::new(self.locks.clone()),
            staged_charges: BTreeMap::new(),
            staged_allocations: Vec::new(),
        }))
    }

    async fn lease_charges(&self, lease_id: LeaseId) -> Result<Vec<Charge>> {
        let tables = self.tables.read().await;
        Ok(tables
            .charges
            .values()
            .filter(|c| c.lease_id == lease_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerImport for InMemoryLedger {
    async fn put_lease(&self, lease: Lease) -> Result<()> {
        self.tables.write().await.leases.insert(lease.id, lease);
        Ok(())
    }

    async fn put_payment(&self, payment: Payment) -> Result<()> {
        self.tables.write().await.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn put_charge(&self, charge: Charge) -> Result<()> {
        self.tables.write().await.charges.insert(charge.id, charge);
        Ok(())
    }
}

pub struct InMemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    next_allocation_id: Arc<AtomicU64>,
    locks: LockSet,
    staged_charges: BTreeMap<ChargeId, Charge>,
    staged_allocations: Vec<PaymentAllocation>,
}

impl InMemoryTransaction {
    fn visible_charge(&self, tables: &Tables, id: ChargeId) -> Option<Charge> {
        self.staged_charges
            .get(&id)
            .or_else(|| tables.charges.get(&id))
            .cloned()
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn lock_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>> {
        self.locks.lock(RowKey::Payment(payment_id)).await;
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&payment_id).cloned())
    }

    async fn lease(&mut self, lease_id: LeaseId) -> Result<Option<Lease>> {
        let tables = self.tables.read().await;
        Ok(tables.leases.get(&lease_id).cloned())
    }

    async fn lock_external_id(
        &mut self,
        organization_id: OrganizationId,
        external_id: &str,
    ) -> Result<()> {
        self.locks
            .lock(RowKey::ExternalId(organization_id, external_id.to_string()))
            .await;
        Ok(())
    }

    async fn allocations_for_payment(
        &mut self,
        organization_id: OrganizationId,
        payment_id: PaymentId,
    ) -> Result<Vec<PaymentAllocation>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<PaymentAllocation> = tables
            .allocations
            .iter()
            .chain(self.staged_allocations.iter())
            .filter(|a| a.organization_id == organization_id && a.payment_id == payment_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.allocation_order);
        Ok(rows)
    }

    async fn payment_for_external_id(
        &mut self,
        organization_id: OrganizationId,
        external_id: &str,
    ) -> Result<Option<PaymentId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .allocations
            .iter()
            .chain(self.staged_allocations.iter())
            .find(|a| {
                a.organization_id == organization_id
                    && a.external_id.as_deref() == Some(external_id)
            })
            .map(|a| a.payment_id))
    }

    async fn charges(
        &mut self,
        organization_id: OrganizationId,
        ids: &[ChargeId],
    ) -> Result<Vec<Charge>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| self.visible_charge(&tables, *id))
            .filter(|c| c.organization_id == organization_id)
            .collect())
    }

    async fn lock_lease_charges(
        &mut self,
        organization_id: OrganizationId,
        lease_id: LeaseId,
    ) -> Result<Vec<Charge>> {
        let ids: Vec<ChargeId> = {
            let tables = self.tables.read().await;
            tables
                .charges
                .values()
                .filter(|c| c.lease_id == lease_id && c.organization_id == organization_id)
                .map(|c| c.id)
                .collect()
        };
        self.lock_charges(organization_id, lease_id, &ids).await
    }

    async fn lock_charges(
        &mut self,
        organization_id: OrganizationId,
        lease_id: LeaseId,
        ids: &[ChargeId],
    ) -> Result<Vec<Charge>> {
        self.locks
            .lock_all(ids.iter().map(|id| RowKey::Charge(*id)))
            .await;

        let tables = self.tables.read().await;
        let mut seen = Vec::with_capacity(ids.len());
        let mut charges = Vec::with_capacity(ids.len());
        for id in ids {
            if seen.contains(id) {
                continue;
            }
            seen.push(*id);
            if let Some(charge) = self.visible_charge(&tables, *id)
                && charge.lease_id == lease_id
                && charge.organization_id == organization_id
            {
                charges.push(charge);
            }
        }
        Ok(charges)
    }

    async fn update_charge(&mut self, charge: Charge) -> Result<()> {
        if !self.locks.holds(&RowKey::Charge(charge.id)) {
            return Err(AllocationError::Conflict(format!(
                "charge {} is not locked by this transaction",
                charge.id
            )));
        }
        self.staged_charges.insert(charge.id, charge);
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: NewAllocation) -> Result<PaymentAllocation> {
        let id = AllocationId(self.next_allocation_id.fetch_add(1, Ordering::SeqCst) + 1);
        let row = allocation.into_allocation(id, Utc::now());
        self.staged_allocations.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        {
            let mut tables = this.tables.write().await;
            for allocation in &this.staged_allocations {
                tables.check_unique(allocation)?;
            }
            for (id, charge) in std::mem::take(&mut this.staged_charges) {
                tables.charges.insert(id, charge);
            }
            tables
                .allocations
                .extend(std::mem::take(&mut this.staged_allocations));
        }
        this.locks.release_all();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        this.staged_charges.clear();
        this.staged_allocations.clear();
        this.locks.release_all();
        Ok(())
    }
}
