use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

// Nothing listens on the discard port, so every gateway call fails fast.
const DEAD_GATEWAY: &str = "http://127.0.0.1:9";

fn bluepay() -> Command {
    let mut cmd = Command::new(cargo_bin!("bluepay"));
    cmd.env_remove("RUST_LOG")
        .env_remove("BLUEPAY_AUTH_TOKEN")
        .env_remove("BLUEPAY_PIN")
        .args(["--gateway-url", DEAD_GATEWAY, "--timeout-secs", "2"]);
    cmd
}

#[test]
fn test_send_rejects_zero_amount() {
    bluepay()
        .args(["send", "--phone", "+250788000000", "--amount", "0", "--pin", "1234"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please enter a valid amount"));
}

#[test]
fn test_send_requires_bank_details() {
    bluepay()
        .args([
            "send",
            "--channel",
            "bank",
            "--bank-name",
            "KCB Bank",
            "--amount",
            "100",
            "--pin",
            "1234",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please fill in bank details"));
}

#[test]
fn test_send_reports_unreachable_gateway() {
    bluepay()
        .args(["send", "--phone", "+250788000000", "--amount", "5000", "--pin", "1234"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("SUBMISSION_FAILED"))
        .stderr(predicate::str::contains("Payment failed. Please try again."));
}

#[test]
fn test_qr_falls_back_when_gateway_is_down() {
    bluepay()
        .args([
            "qr",
            "--phone",
            "+250788000000",
            "--name",
            "Alice",
            "--amount",
            "5000",
            "--message",
            "lunch",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"origin\":\"fallback\""))
        .stdout(predicate::str::contains("\"type\":\"bluepay\""))
        .stdout(predicate::str::contains("\"message\":\"lunch\""))
        .stderr(predicate::str::contains("unsigned"));
}

#[test]
fn test_verify_offline_code_is_unverified() -> Result<(), Box<dyn std::error::Error>> {
    let output = bluepay()
        .args(["qr", "--phone", "+250788000000", "--name", "Alice"])
        .output()?;
    assert!(output.status.success());
    let payload = String::from_utf8(output.stdout)?;

    bluepay()
        .args(["verify", payload.trim()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"verdict\": \"unverified\""));

    Ok(())
}

#[test]
fn test_verify_rejects_garbage() {
    bluepay()
        .args(["verify", "hello"])
        .assert()
        .failure();
}

#[test]
fn test_pay_refuses_offline_code() -> Result<(), Box<dyn std::error::Error>> {
    let output = bluepay()
        .args(["qr", "--phone", "+250788000000", "--name", "Alice", "--amount", "5000"])
        .output()?;
    assert!(output.status.success());
    let payload = String::from_utf8(output.stdout)?;

    bluepay()
        .args(["pay", payload.trim(), "--pin", "1234"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("could not be verified"));

    Ok(())
}

#[test]
fn test_pay_open_code_needs_an_amount() -> Result<(), Box<dyn std::error::Error>> {
    let output = bluepay()
        .args(["qr", "--phone", "+250788000000", "--name", "Alice"])
        .output()?;
    let payload = String::from_utf8(output.stdout)?;

    bluepay()
        .args(["pay", payload.trim(), "--pin", "1234"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please enter a valid amount"));

    Ok(())
}

#[test]
fn test_lists_banks() {
    bluepay()
        .arg("banks")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bank of Kigali"))
        .stdout(predicate::str::contains("Cogebanque"));
}

#[test]
fn test_warns_about_unlisted_bank() {
    bluepay()
        .args([
            "send",
            "--channel",
            "bank",
            "--bank-name",
            "Moon Bank",
            "--account-number",
            "000123456",
            "--amount",
            "100",
            "--pin",
            "1234",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Moon Bank is not one of the listed banks"));
}

#[test]
fn test_rejects_non_http_gateway() {
    Command::new(cargo_bin!("bluepay"))
        .args(["--gateway-url", "ftp://example.com", "balance"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("gateway url must be http(s)"));
}
