use crate::application::planner::AllocationStrategy;
use crate::domain::charge::Charge;
use crate::domain::ids::{LeaseId, OrganizationId};
use crate::domain::ports::{LedgerStoreRef, LedgerTransaction};
use crate::domain::waterfall::WaterfallOrder;
use crate::error::Result;
use tracing::debug;

/// Reads a lease's outstanding charges in payment order.
#[derive(Clone)]
pub struct ChargeRepository {
    store: LedgerStoreRef,
    default_order: WaterfallOrder,
}

impl ChargeRepository {
    pub fn new(store: LedgerStoreRef, default_order: WaterfallOrder) -> Self {
        Self {
            store,
            default_order,
        }
    }

    /// Open and partial charges of the lease, waterfall-sorted. Takes no locks.
    pub async fn outstanding_charges(
        &self,
        lease_id: LeaseId,
        order: Option<&WaterfallOrder>,
    ) -> Result<Vec<Charge>> {
        let order = order.unwrap_or(&self.default_order);
        let charges = self.store.lease_charges(lease_id).await?;
        Ok(order.arrange(charges))
    }

    /// Locks and loads the charges an allocation may touch.
    ///
    /// Waterfall mode returns every outstanding charge of the lease in
    /// waterfall order. Manual mode returns the listed charges that are
    /// still outstanding, in the caller's order.
    pub async fn lock_eligible(
        &self,
        tx: &mut dyn LedgerTransaction,
        organization_id: OrganizationId,
        lease_id: LeaseId,
        strategy: &AllocationStrategy,
    ) -> Result<Vec<Charge>> {
        let charges = match strategy {
            AllocationStrategy::Waterfall { order } => {
                let order = order.as_ref().unwrap_or(&self.default_order);
                let locked = tx.lock_lease_charges(organization_id, lease_id).await?;
                order.arrange(locked)
            }
            AllocationStrategy::Manual(items) => {
                let ids: Vec<_> = items.iter().map(|item| item.charge_id).collect();
                tx.lock_charges(organization_id, lease_id, &ids)
                    .await?
                    .into_iter()
                    .filter(Charge::is_outstanding)
                    .collect()
            }
        };
        debug!(lease = %lease_id, eligible = charges.len(), "locked charges");
        Ok(charges)
    }
}
