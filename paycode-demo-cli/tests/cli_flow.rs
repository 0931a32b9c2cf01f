//! Workflow tests for paycode-demo
//!
//! These run the built binary against a temporary storage directory.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const LEGACY_CODE: &str = "PM8TJSBiQmNQDwTogMAbyqJe2PE2kQXjtgh88MRTxsrnHC8zpEtJ8j7Aj628oUFk";
const CHALLENGE: &str = r#"BIP47-SSO:{"challenge":"c-1","serviceName":"Example Exchange","serviceUrl":"https://login.example.com","timestamp":1704067200000,"nonce":"n-1"}"#;

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_paycode-demo"))
        .arg("--storage-dir")
        .arg(dir)
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute paycode-demo")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Value of the first "  <key>: <value>" line
fn field(output: &Output, key: &str) -> String {
    let prefix = format!("{}: ", key);
    stdout(output)
        .lines()
        .find_map(|l| l.trim().strip_prefix(&prefix).map(str::to_string))
        .unwrap_or_else(|| panic!("no {} in output:\n{}", key, stdout(output)))
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    for command in ["create", "import", "derive", "notify", "scan", "revoke", "verify"] {
        assert!(help.contains(command), "help should mention '{}'", command);
    }
}

#[test]
fn test_list_empty() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No payment codes found"));
}

#[test]
fn test_import_twice_fails() {
    let dir = TempDir::new().unwrap();
    let first = run(dir.path(), &["import", LEGACY_CODE, "Wallet A"]);
    assert!(first.status.success(), "{}", stdout(&first));
    assert!(stdout(&first).contains("Compact legacy code"));

    let second = run(dir.path(), &["import", LEGACY_CODE, "Wallet A"]);
    assert!(!second.status.success());
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));
}

#[test]
fn test_chain_and_sign_in_workflow() {
    let dir = TempDir::new().unwrap();

    let alice = run(dir.path(), &["create", "Alice"]);
    assert!(alice.status.success(), "{}", stdout(&alice));
    let alice_id = field(&alice, "ID");
    let bob = run(dir.path(), &["create", "Bob"]);
    assert!(bob.status.success(), "{}", stdout(&bob));
    let bob_code = field(&bob, "Code");

    let derived = run(
        dir.path(),
        &["derive", &alice_id, &bob_code, "Bob", "--count", "3"],
    );
    assert!(derived.status.success(), "{}", stdout(&derived));
    assert!(stdout(&derived).contains("Derived 3 address(es)"));
    let chain_id = field(&derived, "Chain");

    let extended = run(dir.path(), &["extend", &chain_id, "--count", "2"]);
    assert!(extended.status.success(), "{}", stdout(&extended));
    assert!(stdout(&extended).contains("Chain now holds 5 address(es)"));

    let notified = run(dir.path(), &["notify", &chain_id]);
    assert!(notified.status.success(), "{}", stdout(&notified));
    let reference = field(&notified, "Reference");
    assert_eq!(reference.len(), 64);
    let nonce = field(&notified, "Nonce");

    let again = run(dir.path(), &["notify", &chain_id]);
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));

    let chains = run(dir.path(), &["chains"]);
    assert_eq!(field(&chains, "Notification"), reference);
    assert_eq!(field(&chains, "Nonce"), nonce);

    let signed = run(dir.path(), &["scan", CHALLENGE, "--code", &alice_id, "--pure"]);
    assert!(signed.status.success(), "{}", stdout(&signed));
    let session_id = field(&signed, "Session");
    let text = stdout(&signed);
    let begin = text.find("-----BEGIN").expect("bundle in output");
    let end_marker = text.find("-----END").expect("bundle end");
    let end = end_marker + 8 + text[end_marker + 8..].find("-----").unwrap() + 5;
    let bundle = &text[begin..end];

    let replay = run(dir.path(), &["scan", CHALLENGE, "--code", &alice_id, "--pure"]);
    assert!(!replay.status.success());

    let bundle_file = dir.path().join("bundle.txt");
    std::fs::write(&bundle_file, bundle).unwrap();
    let verified = run(
        dir.path(),
        &["verify", bundle_file.to_str().unwrap(), CHALLENGE],
    );
    assert!(verified.status.success(), "{}", stdout(&verified));
    assert!(stdout(&verified).contains("Signature verified"));

    let sessions = run(dir.path(), &["sessions", "--active"]);
    assert!(stdout(&sessions).contains("Example Exchange"));

    let shown = run(dir.path(), &["show", &alice_id]);
    assert!(shown.status.success(), "{}", stdout(&shown));
    assert_eq!(field(&shown, "Owned"), "yes");
    assert_eq!(field(&shown, "Chains"), "1");
    assert_eq!(field(&shown, "Sessions"), "1");

    let revoked = run(dir.path(), &["revoke", &session_id]);
    assert!(revoked.status.success(), "{}", stdout(&revoked));
    assert!(stdout(&revoked).contains("revoked"));
    let revoked_again = run(dir.path(), &["revoke", &session_id]);
    assert!(!revoked_again.status.success());
    assert!(String::from_utf8_lossy(&revoked_again.stderr).contains("already revoked"));
    let sessions = run(dir.path(), &["sessions", "--active"]);
    assert!(stdout(&sessions).contains("No sessions found"));

    let delete = run(dir.path(), &["delete", &alice_id, "--yes"]);
    assert!(!delete.status.success());
    assert!(String::from_utf8_lossy(&delete.stderr).contains("referenced by"));
}

#[test]
fn test_legacy_code_cannot_receive() {
    let dir = TempDir::new().unwrap();
    let alice = run(dir.path(), &["create", "Alice"]);
    assert!(alice.status.success(), "{}", stdout(&alice));
    let alice_id = field(&alice, "ID");
    let legacy = run(dir.path(), &["import", LEGACY_CODE, "Legacy"]);
    let legacy_id = field(&legacy, "ID");

    let derived = run(dir.path(), &["derive", &alice_id, LEGACY_CODE, "Legacy"]);
    assert!(!derived.status.success());

    let shown = run(dir.path(), &["show", &legacy_id]);
    assert_eq!(field(&shown, "Owned"), "no");
    let canonical = field(&shown, "Canonical form");
    let derived = run(dir.path(), &["derive", &alice_id, &canonical, "Legacy"]);
    assert!(!derived.status.success());
    assert!(String::from_utf8_lossy(&derived.stderr).contains("compact legacy"));

    let chains = run(dir.path(), &["chains"]);
    assert!(stdout(&chains).contains("No payment chains found"));
}
