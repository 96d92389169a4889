//! CLI refusals that must trigger before any database connection is opened.
//!
//! LDK_DATABASE_URL is removed from the child env: reaching the connect step
//! would fail with a different message than the one asserted.

use assert_cmd::Command;
use predicates::prelude::*;

fn ldk() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("ldk").expect("ldk binary");
    cmd.env_remove("LDK_DATABASE_URL").env_remove("LDK_CONFIG");
    cmd
}

#[test]
fn delete_without_yes_is_refused() {
    ldk()
        .args(["order", "delete", "--id", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("REFUSING DELETE"))
        .stderr(predicate::str::contains("ldk order delete --id 7 --yes"));
}

#[test]
fn create_with_unparseable_states_is_rejected() {
    ldk()
        .args([
            "order",
            "create",
            "--order-number",
            "ORD-1",
            "--states",
            "Florida,Texas",
            "--quantity",
            "5",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid states format"));
}

#[test]
fn create_with_zero_quantity_is_rejected() {
    ldk()
        .args([
            "order",
            "create",
            "--order-number",
            "ORD-1",
            "--states",
            "FL",
            "--quantity",
            "0",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Missing required fields or invalid quantity",
        ));
}

#[test]
fn valid_create_needs_a_database_url() {
    ldk()
        .args([
            "order",
            "create",
            "--order-number",
            "ORD-1",
            "--states",
            "FL",
            "--quantity",
            "3",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing env var LDK_DATABASE_URL"));
}
