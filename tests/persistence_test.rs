#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: seed the ledger and pay part of the rent
    let mut requests1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(requests1, "payment, lease, amount, external_id").unwrap();
    writeln!(requests1, "1, 100, 600.00, ach-1").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("lease-ledger"));
    cmd1.arg("--db-path")
        .arg(&db_path)
        .arg("--leases")
        .arg("tests/fixtures/leases.csv")
        .arg("--payments")
        .arg("tests/fixtures/payments.csv")
        .arg("--charges")
        .arg("tests/fixtures/charges.csv")
        .arg("allocate")
        .arg(requests1.path());

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("1,1,600.00,0,ach-1,false"));

    // 2. Second run, no seed files: the retry replays and a new payment
    // continues from the stored balances
    let mut requests2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(requests2, "payment, lease, amount, external_id").unwrap();
    writeln!(requests2, "1, 100, 600.00, ach-1").unwrap();
    writeln!(requests2, "2, 100, 420.00, ach-2").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("lease-ledger"));
    cmd2.arg("--db-path")
        .arg(&db_path)
        .arg("allocate")
        .arg(requests2.path());

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains("1,1,600.00,0,ach-1,true"));
    assert!(stdout2.contains("2,1,400.00,0,ach-2,false"));
    assert!(stdout2.contains("2,2,20.00,1,,false"));

    // 3. Third run: the late fee is partially paid
    let mut cmd3 = Command::new(cargo_bin!("lease-ledger"));
    cmd3.arg("--db-path").arg(&db_path).arg("outstanding").arg("100");

    let output3 = cmd3.output().expect("Failed to execute command");
    assert!(output3.status.success());
    let stdout3 = String::from_utf8_lossy(&output3.stdout);
    assert!(stdout3.contains("2,100,late_fee,50.00,30.00,partial,2026-03-06"));
    assert!(!stdout3.contains("rent"));
}
