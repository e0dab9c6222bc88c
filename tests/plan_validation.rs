//! Plan and Config Loading Integration Tests
//!
//! Loads real YAML through temp files, exercising validation edge cases
//! and default preservation. Complements unit tests in
//! `src/config/loader.rs` and `src/config/plan.rs`.

use std::io::Write;
use std::path::Path;

use testflow::config::{load_config, load_plan, Config, Plan, StepKind};
use testflow::error::FlowError;

fn load_config_yaml(yaml: &str) -> Result<Config, FlowError> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    load_config(file.path())
}

fn load_plan_yaml(yaml: &str) -> Result<Plan, FlowError> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    load_plan(file.path())
}

// ============== Config Defaults ==============

#[test]
fn test_config_defaults_preserved() {
    let config = load_config_yaml(
        r"
systems:
  db:
    hostname: db01.lab
    user: oper
    auth:
      type: password
      password: hunter2
",
    )
    .unwrap();

    let system = &config.systems["db"];
    assert_eq!(system.identity.port, 22);
    assert_eq!(system.identity.max_channels, 5);
    assert_eq!(system.identity.connect_attempts, 3);
    assert!(system.routing_prefix.is_none());
    assert!(system.stage_dir.is_none());

    assert_eq!(config.limits.command_timeout_seconds, 300);
    assert_eq!(config.limits.transfer_attempts, 3);
    assert_eq!(config.limits.display_tail_lines, 50);
    assert!(config.completion.reject_template.contains("{sentinel}"));
}

#[test]
fn test_config_key_auth_and_routing() {
    let config = load_config_yaml(
        r"
systems:
  app:
    hostname: app01.lab
    port: 2022
    user: deploy
    max_channels: 2
    routing_prefix: ssh hop01
    stage_dir: /var/stage
    auth:
      type: key
      path: ~/.ssh/id_ed25519
",
    )
    .unwrap();

    let system = &config.systems["app"];
    assert_eq!(system.identity.port, 2022);
    assert_eq!(system.identity.max_channels, 2);
    assert_eq!(system.routing_prefix.as_deref(), Some("ssh hop01"));
    assert_eq!(system.stage_dir.as_deref(), Some("/var/stage"));
}

#[test]
fn test_config_missing_file() {
    let result = load_config(Path::new("/nonexistent/path/config.yaml"));
    assert!(matches!(result, Err(FlowError::Config(_))));
}

#[test]
fn test_config_invalid_yaml() {
    assert!(load_config_yaml("[unclosed bracket").is_err());
}

#[test]
fn test_config_reject_template_without_placeholder() {
    let result = load_config_yaml(
        r"
completion:
  reject_template: '^prompt>'
",
    );
    assert!(matches!(result, Err(FlowError::Config(_))));
}

// ============== Plan Structure ==============

#[test]
fn test_plan_full_shape() {
    let plan = load_plan_yaml(
        r"
processes:
  - name: restart-app
    system: app
    command: systemctl restart myapp
    timeout_seconds: 120
    prerequisites:
      - kind: shell
        text: df -h /opt
    validations:
      - kind: query
        text: select count(*) from jobs where state = 'stuck'
        marker:
          fail: ['^[1-9]']
    switches:
      - name: trace
        true_action: export TRACE=1
    marker:
      fail: ['(?i)failed']
      warn: ['(?i)warning']
      pass: ['(?i)started']
      fail_when_no_pass: true
    extract_files: 'wrote (\S+)'
  - name: check-logs
    system: app
    command: tail -n 200 /var/log/myapp.log
    input_ref: check_logs
compounds:
  - name: deploy-check
    steps: [restart-app, check-logs]
  - name: loose-check
    stop_on_fail: false
    steps: [check-logs]
",
    )
    .unwrap();

    let process = plan.process("restart-app").unwrap();
    assert_eq!(process.timeout_seconds, Some(120));
    assert_eq!(process.prerequisites[0].kind, StepKind::Shell);
    assert_eq!(process.validations[0].kind, StepKind::Query);
    assert!(process.marker.fail_when_no_pass);
    assert!(process.extract_files.is_some());

    assert!(plan.compound("deploy-check").unwrap().stop_on_fail);
    assert!(!plan.compound("loose-check").unwrap().stop_on_fail);
}

#[test]
fn test_plan_unknown_step_reference() {
    let result = load_plan_yaml(
        r"
processes:
  - name: one
    system: app
    command: uptime
compounds:
  - name: bad
    steps: [one, missing]
",
    );
    assert!(matches!(result, Err(FlowError::Config(_))));
}

#[test]
fn test_plan_bad_extract_regex() {
    let result = load_plan_yaml(
        r"
processes:
  - name: one
    system: app
    command: uptime
    extract_files: '[unclosed'
",
    );
    assert!(matches!(result, Err(FlowError::InvalidMarker { .. })));
}

#[test]
fn test_plan_bad_validation_marker() {
    let result = load_plan_yaml(
        r"
processes:
  - name: one
    system: app
    command: uptime
    validations:
      - kind: shell
        text: echo done
        marker:
          fail: ['(?P<broken']
",
    );
    assert!(matches!(result, Err(FlowError::InvalidMarker { .. })));
}

#[test]
fn test_plan_missing_file() {
    let result = load_plan(Path::new("/nonexistent/plan.yaml"));
    assert!(matches!(result, Err(FlowError::PlanNotFound { .. })));
}
