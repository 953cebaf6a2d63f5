use crate::application::executor::AllocationOutcome;
use crate::domain::charge::{Charge, ChargeStatus, ChargeType};
use crate::domain::money::Money;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct AllocationRow<'a> {
    payment: u64,
    charge: u64,
    amount: Money,
    order: u32,
    external_id: Option<&'a str>,
    replayed: bool,
}

/// Writes one CSV row per allocation:
/// `payment,charge,amount,order,external_id,replayed`.
pub struct AllocationWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AllocationWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcome(&mut self, outcome: &AllocationOutcome) -> Result<()> {
        for allocation in &outcome.allocations {
            self.writer.serialize(AllocationRow {
                payment: allocation.payment_id.0,
                charge: allocation.charge_id.0,
                amount: allocation.allocated_amount,
                order: allocation.allocation_order,
                external_id: allocation.external_id.as_deref(),
                replayed: outcome.replayed,
            })?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ChargeRow {
    id: u64,
    lease: u64,
    #[serde(rename = "type")]
    charge_type: ChargeType,
    amount: Money,
    amount_open: Money,
    status: ChargeStatus,
    due_date: NaiveDate,
}

/// Writes charges as `id,lease,type,amount,amount_open,status,due_date`.
pub struct ChargeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ChargeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_charges<'a>(&mut self, charges: impl IntoIterator<Item = &'a Charge>) -> Result<()> {
        for charge in charges {
            self.writer.serialize(ChargeRow {
                id: charge.id.0,
                lease: charge.lease_id.0,
                charge_type: charge.charge_type,
                amount: charge.amount,
                amount_open: charge.amount_open,
                status: charge.status,
                due_date: charge.due_date,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{AllocationId, ChargeId, LeaseId, OrganizationId, PaymentId};
    use crate::domain::payment::PaymentAllocation;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn allocation(charge: u64, amount: Money, order: u32, external_id: Option<&str>) -> PaymentAllocation {
        PaymentAllocation {
            id: AllocationId(u64::from(order) + 1),
            organization_id: OrganizationId(1),
            payment_id: PaymentId(7),
            charge_id: ChargeId(charge),
            allocated_amount: amount,
            allocation_order: order,
            external_id: external_id.map(str::to_string),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_allocation_rows() {
        let outcome = AllocationOutcome {
            allocations: vec![
                allocation(1, Money::new(dec!(1000)), 0, Some("ach-1")),
                allocation(2, Money::new(dec!(30)), 1, None),
            ],
            charges: Vec::new(),
            replayed: false,
        };
        let mut buffer = Vec::new();
        {
            let mut writer = AllocationWriter::new(&mut buffer);
            writer.write_outcome(&outcome).unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "payment,charge,amount,order,external_id,replayed\n\
             7,1,1000.00,0,ach-1,false\n\
             7,2,30.00,1,,false\n"
        );
    }

    #[test]
    fn test_charge_rows() {
        let charge = Charge::new(
            ChargeId(2),
            OrganizationId(1),
            LeaseId(100),
            ChargeType::LateFee,
            Money::new(dec!(50)),
            NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            DateTime::<Utc>::UNIX_EPOCH,
        )
        .unwrap()
        .with_open_balance(Money::new(dec!(20)))
        .unwrap();

        let mut buffer = Vec::new();
        ChargeWriter::new(&mut buffer)
            .write_charges([&charge])
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "id,lease,type,amount,amount_open,status,due_date\n\
             2,100,late_fee,50.00,20.00,partial,2026-03-05\n"
        );
    }
}
