use super::reader_for;
use crate::domain::charge::{Charge, ChargeType};
use crate::domain::ids::{ChargeId, LeaseId, OrganizationId, PaymentId};
use crate::domain::money::Money;
use crate::domain::payment::{Lease, Payment};
use crate::error::{AllocationError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::Read;

/// A CSV row that maps onto a domain value.
pub trait LedgerRecord: DeserializeOwned {
    type Output;

    fn into_domain(self) -> Result<Self::Output>;
}

/// `id,organization`
#[derive(Debug, Deserialize)]
pub struct LeaseRecord {
    pub id: u64,
    pub organization: u64,
}

impl LedgerRecord for LeaseRecord {
    type Output = Lease;

    fn into_domain(self) -> Result<Lease> {
        Ok(Lease {
            id: LeaseId(self.id),
            organization_id: OrganizationId(self.organization),
        })
    }
}

/// `id,organization,lease`; an empty lease means the payment is unbound.
#[derive(Debug, Deserialize)]
pub struct PaymentRecord {
    pub id: u64,
    pub organization: u64,
    #[serde(default)]
    pub lease: Option<u64>,
}

impl LedgerRecord for PaymentRecord {
    type Output = Payment;

    fn into_domain(self) -> Result<Payment> {
        Ok(Payment {
            id: PaymentId(self.id),
            organization_id: OrganizationId(self.organization),
            lease_id: self.lease.map(LeaseId),
        })
    }
}

/// `id,organization,lease,type,amount,amount_open,due_date,created_at`
#[derive(Debug, Deserialize)]
pub struct ChargeRecord {
    pub id: u64,
    pub organization: u64,
    pub lease: u64,
    #[serde(rename = "type")]
    pub charge_type: ChargeType,
    pub amount: Decimal,
    #[serde(default)]
    pub amount_open: Option<Decimal>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl LedgerRecord for ChargeRecord {
    type Output = Charge;

    fn into_domain(self) -> Result<Charge> {
        let created_at = match self.created_at {
            Some(at) => at,
            None => self
                .due_date
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc())
                .ok_or_else(|| AllocationError::InvalidCharge(format!("charge {}", self.id)))?,
        };
        let charge = Charge::new(
            ChargeId(self.id),
            OrganizationId(self.organization),
            LeaseId(self.lease),
            self.charge_type,
            Money::new(self.amount),
            self.due_date,
            created_at,
        )?;
        match self.amount_open {
            Some(open) => charge.with_open_balance(Money::new(open)),
            None => Ok(charge),
        }
    }
}

/// Streams seed rows (leases, payments, charges) from CSV.
pub struct LedgerReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> LedgerReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: reader_for(source),
        }
    }

    /// Lazily deserializes and converts every row. A bad row yields an
    /// error item and does not stop the stream.
    pub fn records<T: LedgerRecord>(self) -> impl Iterator<Item = Result<T::Output>> {
        self.reader
            .into_deserialize::<T>()
            .map(|row| row.map_err(AllocationError::from).and_then(T::into_domain))
    }

    pub fn leases(self) -> impl Iterator<Item = Result<Lease>> {
        self.records::<LeaseRecord>()
    }

    pub fn payments(self) -> impl Iterator<Item = Result<Payment>> {
        self.records::<PaymentRecord>()
    }

    pub fn charges(self) -> impl Iterator<Item = Result<Charge>> {
        self.records::<ChargeRecord>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charge::ChargeStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reads_payments_with_optional_lease() {
        let data = "id, organization, lease\n1, 10, 100\n2, 10,\n";
        let payments: Vec<Payment> = LedgerReader::new(data.as_bytes())
            .payments()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(payments[0].lease_id, Some(LeaseId(100)));
        assert_eq!(payments[1].lease_id, None);
    }

    #[test]
    fn test_reads_charges_with_partial_balance() {
        let data = "id,organization,lease,type,amount,amount_open,due_date,created_at\n\
                    1,10,100,rent,1000.00,,2026-03-01,2026-02-20T09:00:00Z\n\
                    2,10,100,late_fee,50,20,2026-03-05,\n";
        let charges: Vec<Charge> = LedgerReader::new(data.as_bytes())
            .charges()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(charges[0].status, ChargeStatus::Open);
        assert_eq!(charges[0].amount_open, Money::new(dec!(1000)));
        assert_eq!(charges[1].charge_type, ChargeType::LateFee);
        assert_eq!(charges[1].status, ChargeStatus::Partial);
        assert_eq!(charges[1].amount_open, Money::new(dec!(20)));
        assert_eq!(
            charges[1].created_at.date_naive(),
            NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()
        );
    }

    #[test]
    fn test_bad_rows_do_not_stop_the_stream() {
        let data = "id,organization,lease,type,amount,amount_open,due_date\n\
                    1,10,100,parking,10,,2026-03-01\n\
                    2,10,100,rent,10,15,2026-03-01\n\
                    3,10,100,rent,10,,2026-03-01\n";
        let results: Vec<Result<Charge>> = LedgerReader::new(data.as_bytes()).charges().collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_err());
        assert!(matches!(results[1], Err(AllocationError::InvalidCharge(_))));
        assert_eq!(results[2].as_ref().unwrap().id, ChargeId(3));
    }
}
