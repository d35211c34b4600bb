mod common;

use namada_core::steps::hardening;
use namada_core::{Config, SetupError};
use namada_hal::FakeHal;

#[test]
fn all_with_yes_provisions_and_verifies() {
    let config = common::config();
    let hal = common::provisionable_host(&config);
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, out) = common::run_cli(&hal, &["namada-setup", "--yes", "--config", &path, "all"], false, false);
    result.unwrap();
    assert!(out.contains("Workflow 'all'"), "{out}");
    assert!(out.contains("Result: succeeded"), "{out}");
    assert!(out.contains("Verification"), "{out}");
    assert!(hal.host().unit("namada").active);

    let (result, out) = common::run_cli(&hal, &["namada-setup", "--yes", "--config", &path, "all"], false, false);
    result.unwrap();
    assert!(out.contains("(0 applied,"), "{out}");
}

#[test]
fn declined_prompt_leaves_the_host_alone() {
    let hal = FakeHal::ubuntu();
    hal.with_host(|h| h.add_executable("/usr/bin/tar"));
    let before = hal.host();
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, out) = common::run_cli(&hal, &["namada-setup", "--config", &path, "operator"], true, false);
    result.unwrap();
    assert_eq!(out.trim(), SetupError::Aborted.to_string());
    assert!(out.contains("aborted by operator"));
    assert_eq!(hal.host(), before);
    assert_eq!(hal.operation_count(), 0);
}

#[test]
fn mutating_command_without_terminal_needs_yes() {
    let hal = FakeHal::ubuntu();
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, _) = common::run_cli(&hal, &["namada-setup", "--config", &path, "operator"], false, true);
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SetupError>(),
        Some(SetupError::NoTerminal(_))
    ));
    assert!(hal.host().users.get("operator").is_none());
}

#[test]
fn dry_run_json_reports_a_plan() {
    let config = common::config();
    let hal = common::provisionable_host(&config);
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, out) = common::run_cli(
        &hal,
        &["namada-setup", "--dry-run", "--json", "--config", &path, "all"],
        false,
        false,
    );
    result.unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["workflow"]["dry_run"], true);
    assert_eq!(value["workflow"]["status"], "succeeded");
    assert!(value.get("verify").is_none());
    let steps = value["workflow"]["steps"].as_array().unwrap();
    assert!(steps.iter().all(|s| s["status"] != "applied"));
    assert!(hal.host().users.get("operator").is_none());
}

#[test]
fn failed_step_is_an_error_naming_the_step() {
    let config = common::config();
    let hal = common::provisionable_host(&config);
    hal.set_offline(true);
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, out) = common::run_cli(&hal, &["namada-setup", "-y", "--config", &path, "harden"], false, false);
    let err = result.unwrap_err();
    match err.downcast_ref::<SetupError>() {
        Some(SetupError::WorkflowFailed { workflow, step }) => {
            assert_eq!(workflow, "harden");
            assert_eq!(step, hardening::PACKAGES);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(out.contains("Result: FAILED"), "{out}");
    assert!(!out.contains("Verification"));
}

#[test]
fn preflight_rejects_other_distributions() {
    let hal = FakeHal::ubuntu();
    hal.with_host(|h| h.os_release.id = Some("fedora".to_string()));
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, _) = common::run_cli(&hal, &["namada-setup", "--config", &path, "preflight"], false, false);
    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SetupError>(),
        Some(SetupError::UnsupportedOs(_))
    ));
}

#[test]
fn verify_is_advisory_unless_strict() {
    let hal = FakeHal::ubuntu();
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, out) = common::run_cli(&hal, &["namada-setup", "--config", &path, "verify"], false, false);
    result.unwrap();
    assert!(out.contains("checks passed"), "{out}");

    let (result, _) = common::run_cli(&hal, &["namada-setup", "--config", &path, "verify", "--strict"], false, false);
    assert!(result.is_err());
    assert_eq!(hal.operation_count(), 0);
}

#[test]
fn service_commands_need_the_installed_unit() {
    let hal = FakeHal::ubuntu();
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, _) = common::run_cli(&hal, &["namada-setup", "--config", &path, "service", "status"], false, false);
    assert!(result.unwrap_err().to_string().contains("namada-setup node"));

    hal.with_host(|h| {
        h.add_file("/etc/systemd/system/namada.service", "[Unit]\n", 0o644);
        h.add_unit("namada", true, false);
    });
    let (result, _) = common::run_cli(&hal, &["namada-setup", "--config", &path, "service", "start"], false, false);
    result.unwrap();
    assert!(hal.host().unit("namada").active);

    let (result, out) = common::run_cli(&hal, &["namada-setup", "--config", &path, "service", "status"], false, false);
    result.unwrap();
    assert!(out.contains("namada.service"), "{out}");
}

#[test]
fn show_config_prints_the_effective_configuration() {
    let hal = FakeHal::ubuntu();
    let file = common::config_file();
    let path = common::config_arg(&file);

    let (result, out) = common::run_cli(&hal, &["namada-setup", "--config", &path, "show-config"], false, false);
    result.unwrap();
    let shown = Config::from_toml(&out).unwrap();
    assert_eq!(shown, common::config());
    assert!(!shown.operator.set_password);
}

#[test]
fn invalid_config_is_rejected_before_anything_runs() {
    let hal = FakeHal::ubuntu();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"[operator]\nname = \"root\"\n").unwrap();
    let path = common::config_arg(&file);

    let (result, _) = common::run_cli(&hal, &["namada-setup", "-y", "--config", &path, "operator"], false, false);
    assert!(result.is_err());
    assert_eq!(hal.operation_count(), 0);
}
