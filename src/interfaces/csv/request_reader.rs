use super::reader_for;
use crate::application::executor::PaymentRequest;
use crate::application::planner::{AllocationStrategy, ManualAllocation};
use crate::domain::ids::{ChargeId, LeaseId, PaymentId};
use crate::domain::money::Money;
use crate::domain::waterfall::WaterfallOrder;
use crate::error::{AllocationError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

/// One allocation request row.
///
/// `order` is a `|`-separated waterfall (`rent|late_fee`). `manual` lists
/// `charge:amount` pairs separated by `|`. At most one of them may be set.
#[derive(Debug, Deserialize)]
pub struct RequestRecord {
    pub payment: u64,
    pub lease: u64,
    pub amount: Decimal,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub manual: Option<String>,
}

impl TryFrom<RequestRecord> for PaymentRequest {
    type Error = AllocationError;

    fn try_from(record: RequestRecord) -> Result<Self> {
        let strategy = match (record.order.as_deref(), record.manual.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(AllocationError::InvalidRequest(
                    "order and manual cannot both be set".to_string(),
                ));
            }
            (Some(order), None) => AllocationStrategy::waterfall(WaterfallOrder::from_str(order)?),
            (None, Some(manual)) => AllocationStrategy::Manual(parse_manual(manual)?),
            (None, None) => AllocationStrategy::default(),
        };

        Ok(PaymentRequest {
            payment_amount: record.amount,
            lease_id: LeaseId(record.lease),
            payment_id: PaymentId(record.payment),
            strategy,
            external_id: record.external_id.filter(|id| !id.is_empty()),
        })
    }
}

fn parse_manual(source: &str) -> Result<Vec<ManualAllocation>> {
    source
        .split('|')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (charge, amount) = entry.split_once(':').ok_or_else(|| {
                AllocationError::InvalidRequest(format!("manual entry '{entry}' is not charge:amount"))
            })?;
            let charge = charge.trim().parse::<u64>().map_err(|e| {
                AllocationError::InvalidRequest(format!("manual charge id '{charge}': {e}"))
            })?;
            let amount = Decimal::from_str(amount.trim()).map_err(|e| {
                AllocationError::InvalidRequest(format!("manual amount '{amount}': {e}"))
            })?;
            Ok(ManualAllocation::new(ChargeId(charge), Money::new(amount)))
        })
        .collect()
}

/// Streams allocation requests from CSV.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: reader_for(source),
        }
    }

    pub fn requests(self) -> impl Iterator<Item = Result<PaymentRequest>> {
        self.reader.into_deserialize::<RequestRecord>().map(|row| {
            row.map_err(AllocationError::from)
                .and_then(PaymentRequest::try_from)
        })
    }
}
