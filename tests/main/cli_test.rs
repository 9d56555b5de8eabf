//! CLI contract tests.

use assert_cmd::Command;

fn dealwatch() -> Command {
    Command::cargo_bin("dealwatch").expect("binary should build")
}

#[test]
fn help_lists_all_subcommands() {
    let assert = dealwatch().arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(output.contains("report"));
    assert!(output.contains("alerts"));
    assert!(output.contains("spotlight"));
}

#[test]
fn report_help_documents_preview_flag() {
    let assert = dealwatch().args(["report", "--help"]).assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(output.contains("--preview"));
}

#[test]
fn spotlight_requires_stage_argument() {
    dealwatch().arg("spotlight").assert().failure();
}

#[test]
fn unknown_subcommand_fails() {
    dealwatch().arg("bogus").assert().failure();
}

#[test]
fn alerts_fails_fast_without_credentials() {
    // No CRM token anywhere: the run must fail during validation, before any
    // network call, and name the missing setting.
    let assert = dealwatch()
        .arg("alerts")
        .env_remove("DEALWATCH_CRM_TOKEN")
        .env("DEALWATCH_CONFIG_PATH", "/nonexistent/dealwatch.toml")
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("DEALWATCH_CRM_TOKEN"));
}
