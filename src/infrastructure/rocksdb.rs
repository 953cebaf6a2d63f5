use super::locks::{LockSet, RowKey, RowLocks};
use crate::domain::charge::Charge;
use crate::domain::ids::{AllocationId, ChargeId, LeaseId, OrganizationId, PaymentId};
use crate::domain::payment::{Lease, NewAllocation, Payment, PaymentAllocation};
use crate::domain::ports::{LedgerImport, LedgerStore, LedgerTransaction};
use crate::error::{AllocationError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex as AsyncMutex;

/// Column Family for lease records.
pub const CF_LEASES: &str = "leases";
/// Column Family for payment records.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for charges, keyed by charge id.
pub const CF_CHARGES: &str = "charges";
/// Index Column Family: `lease_id ++ charge_id` with empty values.
pub const CF_LEASE_CHARGES: &str = "lease_charges";
/// Column Family for allocation rows, keyed `payment_id ++ allocation_order`.
pub const CF_ALLOCATIONS: &str = "allocations";
/// Index Column Family: `organization_id ++ external_id` to payment id.
pub const CF_EXTERNAL_IDS: &str = "external_ids";
/// Column Family for counters.
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_LEASES,
    CF_PAYMENTS,
    CF_CHARGES,
    CF_LEASE_CHARGES,
    CF_ALLOCATIONS,
    CF_EXTERNAL_IDS,
    CF_META,
];

const LAST_ALLOCATION_ID: &[u8] = b"last_allocation_id";

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        AllocationError::Internal(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        AllocationError::Internal(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

fn composite_key(prefix: [u8; 8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + suffix.len());
    key.extend_from_slice(&prefix);
    key.extend_from_slice(suffix);
    key
}

fn allocation_key(payment_id: PaymentId, allocation_order: u32) -> Vec<u8> {
    composite_key(payment_id.to_be_bytes(), &allocation_order.to_be_bytes())
}

fn external_id_key(organization_id: OrganizationId, external_id: &str) -> Vec<u8> {
    composite_key(organization_id.to_be_bytes(), external_id.as_bytes())
}

/// Synchronous table access over the column families. Nothing in here
/// awaits, so column family handles and iterators never cross a suspension
/// point.
struct LedgerDb {
    db: DB,
}

impl LedgerDb {
    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            AllocationError::Internal(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key, value));
        }
        Ok(rows)
    }

    fn charge(&self, id: ChargeId) -> Result<Option<Charge>> {
        self.get(CF_CHARGES, &id.to_be_bytes())
    }

    fn charge_ids_for_lease(&self, lease_id: LeaseId) -> Result<Vec<ChargeId>> {
        self.scan_prefix(CF_LEASE_CHARGES, &lease_id.to_be_bytes())?
            .into_iter()
            .map(|(key, _)| {
                let suffix = key
                    .get(8..)
                    .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
                    .ok_or_else(|| AllocationError::internal("malformed lease_charges index key"))?;
                Ok(ChargeId(u64::from_be_bytes(suffix)))
            })
            .collect()
    }

    fn allocations_for_payment(&self, payment_id: PaymentId) -> Result<Vec<PaymentAllocation>> {
        self.scan_prefix(CF_ALLOCATIONS, &payment_id.to_be_bytes())?
            .into_iter()
            .map(|(_, value)| decode(&value))
            .collect()
    }

    fn payment_for_external_id(
        &self,
        organization_id: OrganizationId,
        external_id: &str,
    ) -> Result<Option<PaymentId>> {
        self.get(CF_EXTERNAL_IDS, &external_id_key(organization_id, external_id))
    }

    fn last_allocation_id(&self) -> Result<u64> {
        let cf = self.cf(CF_META)?;
        match self.db.get_cf(cf, LAST_ALLOCATION_ID)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    AllocationError::internal("malformed allocation id counter")
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    fn put_charge(&self, charge: &Charge) -> Result<()> {
        let mut batch = WriteBatch::default();
        if let Some(previous) = self.charge(charge.id)?
            && previous.lease_id != charge.lease_id
        {
            batch.delete_cf(
                self.cf(CF_LEASE_CHARGES)?,
                composite_key(previous.lease_id.to_be_bytes(), &charge.id.to_be_bytes()),
            );
        }
        batch.put_cf(self.cf(CF_CHARGES)?, charge.id.to_be_bytes(), encode(charge)?);
        batch.put_cf(
            self.cf(CF_LEASE_CHARGES)?,
            composite_key(charge.lease_id.to_be_bytes(), &charge.id.to_be_bytes()),
            b"",
        );
        self.db.write(batch)?;
        Ok(())
    }

    fn commit(
        &self,
        charges: &BTreeMap<ChargeId, Charge>,
        allocations: &[PaymentAllocation],
        last_allocation_id: u64,
    ) -> Result<()> {
        for allocation in allocations {
            if allocation.allocation_order == 0
                && !self
                    .scan_prefix(CF_ALLOCATIONS, &allocation.payment_id.to_be_bytes())?
                    .is_empty()
            {
                return Err(AllocationError::Conflict(format!(
                    "payment {} already has allocations",
                    allocation.payment_id
                )));
            }
            if let Some(external_id) = &allocation.external_id
                && let Some(owner) =
                    self.payment_for_external_id(allocation.organization_id, external_id)?
            {
                return Err(AllocationError::Conflict(format!(
                    "external id '{external_id}' already used by payment {owner}"
                )));
            }
        }

        let mut batch = WriteBatch::default();
        let charges_cf = self.cf(CF_CHARGES)?;
        for charge in charges.values() {
            batch.put_cf(charges_cf, charge.id.to_be_bytes(), encode(charge)?);
        }
        let allocations_cf = self.cf(CF_ALLOCATIONS)?;
        let external_ids_cf = self.cf(CF_EXTERNAL_IDS)?;
        for allocation in allocations {
            batch.put_cf(
                allocations_cf,
                allocation_key(allocation.payment_id, allocation.allocation_order),
                encode(allocation)?,
            );
            if let Some(external_id) = &allocation.external_id {
                batch.put_cf(
                    external_ids_cf,
                    external_id_key(allocation.organization_id, external_id),
                    encode(&allocation.payment_id)?,
                );
            }
        }
        batch.put_cf(
            self.cf(CF_META)?,
            LAST_ALLOCATION_ID,
            last_allocation_id.to_be_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }
}

/// A persistent ledger implementation using RocksDB.
///
/// Each table lives in its own Column Family, with two index families for
/// lease-to-charge and external-id lookups. Row locks are held in-process
/// (RocksDB already allows a single process per database directory) and a
/// commit is a single atomic `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBLedger {
    inner: Arc<LedgerDb>,
    locks: Arc<RowLocks>,
    last_allocation_id: Arc<AtomicU64>,
    commit_lock: Arc<AsyncMutex<()>>,
}

impl RocksDBLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that every required column family exists and restores the
    /// allocation id counter.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        let inner = LedgerDb { db };
        let last_allocation_id = inner.last_allocation_id()?;

        Ok(Self {
            inner: Arc::new(inner),
            locks: Arc::new(RowLocks::new()),
            last_allocation_id: Arc::new(AtomicU64::new(last_allocation_id)),
            commit_lock: Arc::new(AsyncMutex::new(())),
        })
    }
}

#[async_trait]
impl LedgerStore for RocksDBLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        Ok(Box::new(RocksDBTransaction {
            inner: self.inner.clone(),
            last_allocation_id: self.last_allocation_id.clone(),
            commit_lock: self.commit_lock.clone(),
            locks: LockSet::new(self.locks.clone()),
            staged_charges: BTreeMap::new(),
            staged_allocations: Vec::new(),
        }))
    }

    async fn lease_charges(&self, lease_id: LeaseId) -> Result<Vec<Charge>> {
        let mut charges = Vec::new();
        for id in self.inner.charge_ids_for_lease(lease_id)? {
            if let Some(charge) = self.inner.charge(id)?
                && charge.lease_id == lease_id
            {
                charges.push(charge);
            }
        }
        Ok(charges)
    }
}

#[async_trait]
impl LedgerImport for RocksDBLedger {
    async fn put_lease(&self, lease: Lease) -> Result<()> {
        let cf = self.inner.cf(CF_LEASES)?;
        self.inner
            .db
            .put_cf(cf, lease.id.to_be_bytes(), encode(&lease)?)?;
        Ok(())
    }

    async fn put_payment(&self, payment: Payment) -> Result<()> {
        let cf = self.inner.cf(CF_PAYMENTS)?;
        self.inner
            .db
            .put_cf(cf, payment.id.to_be_bytes(), encode(&payment)?)?;
        Ok(())
    }

    async fn put_charge(&self, charge: Charge) -> Result<()> {
        self.inner.put_charge(&charge)
    }
}

pub struct RocksDBTransaction {
    inner: Arc<LedgerDb>,
    last_allocation_id: Arc<AtomicU64>,
    commit_lock: Arc<AsyncMutex<()>>,
    locks: LockSet,
    staged_charges: BTreeMap<ChargeId, Charge>,
    staged_allocations: Vec<PaymentAllocation>,
}

impl RocksDBTransaction {
    fn visible_charge(&self, id: ChargeId) -> Result<Option<Charge>> {
        match self.staged_charges.get(&id) {
            Some(charge) => Ok(Some(charge.clone())),
            None => self.inner.charge(id),
        }
    }
}

#[async_trait]
impl LedgerTransaction for RocksDBTransaction {
    async fn lock_payment(&mut self, payment_id: PaymentId) -> Result<Option<Payment>> {
        self.locks.lock(RowKey::Payment(payment_id)).await;
        self.inner.get(CF_PAYMENTS, &payment_id.to_be_bytes())
    }

    async fn lease(&mut self, lease_id: LeaseId) -> Result<Option<Lease>> {
        self.inner.get(CF_LEASES, &lease_id.to_be_bytes())
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
        let mut rows: Vec<PaymentAllocation> = self
            .inner
            .allocations_for_payment(payment_id)?
            .into_iter()
            .chain(self.staged_allocations.iter().cloned())
            .filter(|a| a.organization_id == organization_id && a.payment_id == payment_id)
            .collect();
        rows.sort_by_key(|a| a.allocation_order);
        Ok(rows)
    }

    async fn payment_for_external_id(
        &mut self,
        organization_id: OrganizationId,
        external_id: &str,
    ) -> Result<Option<PaymentId>> {
        let staged = self.staged_allocations.iter().find(|a| {
            a.organization_id == organization_id && a.external_id.as_deref() == Some(external_id)
        });
        match staged {
            Some(allocation) => Ok(Some(allocation.payment_id)),
            None => self.inner.payment_for_external_id(organization_id, external_id),
        }
    }

    async fn charges(
        &mut self,
        organization_id: OrganizationId,
        ids: &[ChargeId],
    ) -> Result<Vec<Charge>> {
        let mut charges = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(charge) = self.visible_charge(*id)?
                && charge.organization_id == organization_id
            {
                charges.push(charge);
            }
        }
        Ok(charges)
    }

    async fn lock_lease_charges(
        &mut self,
        organization_id: OrganizationId,
        lease_id: LeaseId,
    ) -> Result<Vec<Charge>> {
        let ids = self.inner.charge_ids_for_lease(lease_id)?;
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

        let mut seen = Vec::with_capacity(ids.len());
        let mut charges = Vec::with_capacity(ids.len());
        for id in ids {
            if seen.contains(id) {
                continue;
            }
            seen.push(*id);
            if let Some(charge) = self.visible_charge(*id)?
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
        let id = AllocationId(self.last_allocation_id.fetch_add(1, Ordering::SeqCst) + 1);
        let row = allocation.into_allocation(id, Utc::now());
        self.staged_allocations.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        {
            let _serialized = this.commit_lock.lock().await;
            let last_allocation_id = this.last_allocation_id.load(Ordering::SeqCst);
            this.inner
                .commit(&this.staged_charges, &this.staged_allocations, last_allocation_id)?;
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
