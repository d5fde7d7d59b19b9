#![cfg(feature = "cli")]

use assert_cmd::Command;
use predicates::str::contains as str_contains;
use tempfile::tempdir;

#[allow(deprecated)]
fn run_cli(script: &str) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("cli").expect("cli binary");
    cmd.env_remove("DISPATCH_TOOL_DB")
        .env("DISPATCH_TOOL_COMMIT_DELAY_MS", "0")
        .env("DISPATCH_TOOL_LOG", "off")
        .write_stdin(script.to_string())
        .assert()
}

#[test]
fn cli_seeds_the_default_catalog() {
    run_cli("seed\nstats\nquit\n")
        .success()
        .stdout(str_contains("Seeded 12 types and 40 resources (0 skipped)."))
        .stdout(str_contains("Total          : 40"));
}

#[test]
fn cli_assigns_nearest_ambulance() {
    run_cli("seed\nassign-near 22.253 84.908 conv-cli VEHICLE ambulance 1 15\nquit\n")
        .success()
        .stdout(str_contains("Assigned 1 resource(s)"))
        .stdout(str_contains("AMB-002"));
}

#[test]
fn cli_reports_shortfall_for_unmet_requirement() {
    run_cli("seed\nassign-near 22.253 84.908 conv-cli VEHICLE ambulance 3 15\nquit\n")
        .success()
        .stdout(str_contains("Unavailable: VEHICLE ambulance (3 needed, 2 available)"));
}

#[test]
fn cli_assign_and_release_round_trip() {
    run_cli("seed\nassign 8 conv-cli\nshow 8\nrelease conv-cli 8\nhistory 8\nquit\n")
        .success()
        .stdout(str_contains("Assigned AMB-001 (#8) to conv-cli."))
        .stdout(str_contains("Status     : ASSIGNED"))
        .stdout(str_contains("Released 1 resource(s), 1 assignment(s) completed."))
        .stdout(str_contains("COMPLETED"));
}

#[test]
fn cli_refuses_double_assignment() {
    run_cli("seed\nassign 8 conv-a\nassign 8 conv-b\nquit\n")
        .success()
        .stdout(str_contains("Error: resource 8 is not available"));
}

#[test]
fn cli_save_and_load_csv_round_trip() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("catalog.csv");
    let path = path.to_string_lossy();
    let script = format!("seed\nsave csv {path}\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("Catalog saved to"));

    let script = format!("load csv {path}\nlist VEHICLE\nquit\n");
    run_cli(&script)
        .success()
        .stdout(str_contains("(12 types, 40 resources, 0 skipped)"))
        .stdout(str_contains("FIRE-001"));
}
