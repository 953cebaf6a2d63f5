#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, Utc};
use lease_ledger::application::executor::AllocationExecutor;
use lease_ledger::config::EngineConfig;
use lease_ledger::domain::charge::{Charge, ChargeType};
use lease_ledger::domain::ids::{ChargeId, LeaseId, OrganizationId, PaymentId};
use lease_ledger::domain::money::Money;
use lease_ledger::domain::payment::{Lease, Payment};
use lease_ledger::domain::ports::{LedgerImport, LedgerStore};
use lease_ledger::infrastructure::in_memory::InMemoryLedger;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const ORG: OrganizationId = OrganizationId(1);
pub const LEASE: LeaseId = LeaseId(100);

pub fn due(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

pub fn charge(id: u64, charge_type: ChargeType, amount: Decimal, due_day: u32) -> Charge {
    Charge::new(
        ChargeId(id),
        ORG,
        LEASE,
        charge_type,
        Money::new(amount),
        due(due_day),
        DateTime::<Utc>::UNIX_EPOCH,
    )
    .unwrap()
}

/// An in-memory ledger holding one lease plus an executor over it.
pub struct Fixture {
    pub ledger: Arc<InMemoryLedger>,
    pub executor: AllocationExecutor,
}

impl Fixture {
    pub async fn new(charges: Vec<Charge>) -> Self {
        Self::with_config(charges, EngineConfig::default()).await
    }

    pub async fn with_config(charges: Vec<Charge>, config: EngineConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .put_lease(Lease {
                id: LEASE,
                organization_id: ORG,
            })
            .await
            .unwrap();
        for charge in charges {
            ledger.put_charge(charge).await.unwrap();
        }
        let executor = AllocationExecutor::new(ledger.clone(), config);
        Self { ledger, executor }
    }

    pub async fn payment(&self, id: u64) -> PaymentId {
        self.ledger
            .put_payment(Payment {
                id: PaymentId(id),
                organization_id: ORG,
                lease_id: Some(LEASE),
            })
            .await
            .unwrap();
        PaymentId(id)
    }

    pub async fn charges(&self) -> Vec<Charge> {
        self.ledger.lease_charges(LEASE).await.unwrap()
    }

    pub async fn charge(&self, id: u64) -> Charge {
        self.charges()
            .await
            .into_iter()
            .find(|c| c.id == ChargeId(id))
            .unwrap()
    }

    pub async fn open_total(&self) -> Money {
        self.charges().await.iter().map(|c| c.amount_open).sum()
    }
}

/// Seed and request files for a generated ledger.
pub struct SeedFiles {
    pub leases: PathBuf,
    pub payments: PathBuf,
    pub charges: PathBuf,
    pub requests: PathBuf,
}

/// Writes a ledger of `leases` leases, each with a 1000.00 rent and a
/// 50.00 late fee, and one request per lease paying 1030.00.
pub fn generate_ledger(dir: &Path, leases: usize) -> Result<SeedFiles, Error> {
    let files = SeedFiles {
        leases: dir.join("leases.csv"),
        payments: dir.join("payments.csv"),
        charges: dir.join("charges.csv"),
        requests: dir.join("requests.csv"),
    };

    let mut lease_wtr = csv::Writer::from_writer(File::create(&files.leases)?);
    let mut payment_wtr = csv::Writer::from_writer(File::create(&files.payments)?);
    let mut charge_wtr = csv::Writer::from_writer(File::create(&files.charges)?);
    let mut request_wtr = csv::Writer::from_writer(File::create(&files.requests)?);

    lease_wtr.write_record(["id", "organization"])?;
    payment_wtr.write_record(["id", "organization", "lease"])?;
    charge_wtr.write_record([
        "id",
        "organization",
        "lease",
        "type",
        "amount",
        "amount_open",
        "due_date",
        "created_at",
    ])?;
    request_wtr.write_record(["payment", "lease", "amount", "external_id", "order", "manual"])?;

    for i in 1..=leases {
        let lease = i.to_string();
        lease_wtr.write_record([lease.as_str(), "1"])?;
        payment_wtr.write_record([lease.as_str(), "1", lease.as_str()])?;
        charge_wtr.write_record([
            (i * 2 - 1).to_string().as_str(),
            "1",
            lease.as_str(),
            "rent",
            "1000.00",
            "",
            "2026-03-01",
            "2026-02-20T00:00:00Z",
        ])?;
        charge_wtr.write_record([
            (i * 2).to_string().as_str(),
            "1",
            lease.as_str(),
            "late_fee",
            "50.00",
            "",
            "2026-03-06",
            "2026-03-06T00:00:00Z",
        ])?;
        let external_id = format!("ach-{i}");
        request_wtr.write_record([
            lease.as_str(),
            lease.as_str(),
            "1030.00",
            external_id.as_str(),
            "",
            "",
        ])?;
    }

    lease_wtr.flush()?;
    payment_wtr.flush()?;
    charge_wtr.flush()?;
    request_wtr.flush()?;
    Ok(files)
}
