use std::env;
use std::sync::{Mutex, OnceLock};

use deskflow_cli::commands::{migrate, seed, workflow};
use serde_json::Value;
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn with_env(vars: &[(&str, &str)], body: impl FnOnce()) {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env lock is poisoned");

    for (key, value) in vars {
        env::set_var(key, value);
    }
    body();
    for (key, _) in vars {
        env::remove_var(key);
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be JSON")
}

fn message_json(payload: &Value) -> Value {
    let message = payload["message"].as_str().expect("message should be a string");
    serde_json::from_str(message).expect("message should carry a JSON payload")
}

fn temp_database() -> (TempDir, String) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("deskflow.db").display());
    (dir, url)
}

#[test]
fn migrate_and_seed_succeed_against_a_fresh_database() {
    let (_dir, url) = temp_database();
    with_env(&[("DESKFLOW_DATABASE_URL", &url)], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "migrate output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");

        let result = seed::run();
        assert_eq!(result.exit_code, 0, "seed output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"]
            .as_str()
            .unwrap_or("")
            .contains("3 categories, 6 users, 3 tickets"));
    });
}

#[test]
fn migrate_reports_config_validation_failure() {
    with_env(&[("DESKFLOW_DATABASE_URL", "postgres://localhost/deskflow")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn line_manager_flow_round_trips_through_commands() {
    let (_dir, url) = temp_database();
    with_env(&[("DESKFLOW_DATABASE_URL", &url)], || {
        assert_eq!(migrate::run().exit_code, 0);
        assert_eq!(seed::run().exit_code, 0);

        // Hardware needs no approval at all.
        let result = workflow::initiate("tkt-demo-001".to_string());
        assert_eq!(result.exit_code, 0, "initiate output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "no approval required; ticket remains actionable");

        // Software needs the requester's line manager.
        let result = workflow::initiate("tkt-demo-002".to_string());
        assert_eq!(result.exit_code, 0, "initiate output: {}", result.output);
        let gate = message_json(&parse_payload(&result.output));
        assert_eq!(gate["level"], "line_manager");
        assert_eq!(gate["approver"]["kind"], "specific");
        assert_eq!(gate["approver"]["user_id"], "bob");
        let record_id = gate["id"].as_str().expect("gate id").to_string();

        let result = workflow::pending("bob".to_string());
        assert_eq!(result.exit_code, 0);
        let queue = message_json(&parse_payload(&result.output));
        assert_eq!(queue.as_array().map(Vec::len), Some(1));

        // An unrelated user cannot decide bob's gate.
        let result = workflow::approve(record_id.clone(), "mallory".to_string(), None, None);
        assert_eq!(result.exit_code, 5, "approve output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "forbidden");

        let result = workflow::approve(record_id.clone(), "bob".to_string(), None, None);
        assert_eq!(result.exit_code, 0, "approve output: {}", result.output);
        let decided = message_json(&parse_payload(&result.output));
        assert_eq!(decided["status"], "approved");

        // Deciding the same record again is a conflict.
        let result = workflow::approve(record_id, "bob".to_string(), None, None);
        assert_eq!(result.exit_code, 5);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "conflict");

        let result = workflow::show("tkt-demo-002".to_string());
        assert_eq!(result.exit_code, 0);
        let view = message_json(&parse_payload(&result.output));
        assert_eq!(view["ticket"]["status"], "open");
        assert!(view["current_approval"].is_null());
    });
}

#[test]
fn rejection_and_resubmission_flow_round_trips_through_commands() {
    let (_dir, url) = temp_database();
    with_env(&[("DESKFLOW_DATABASE_URL", &url)], || {
        assert_eq!(migrate::run().exit_code, 0);
        assert_eq!(seed::run().exit_code, 0);

        // Procurement at 2500.00 needs line manager then head of department.
        let result = workflow::initiate("tkt-demo-003".to_string());
        assert_eq!(result.exit_code, 0, "initiate output: {}", result.output);
        let lm_gate = message_json(&parse_payload(&result.output));
        assert_eq!(lm_gate["level"], "line_manager");
        let lm_id = lm_gate["id"].as_str().expect("gate id").to_string();

        let result = workflow::approve(lm_id, "bob".to_string(), None, None);
        assert_eq!(result.exit_code, 0, "approve output: {}", result.output);

        let result = workflow::pending("carol".to_string());
        assert_eq!(result.exit_code, 0);
        let queue = message_json(&parse_payload(&result.output));
        let hod_gate = &queue[0];
        assert_eq!(hod_gate["level"], "head_of_department");
        let hod_id = hod_gate["id"].as_str().expect("gate id").to_string();

        // Blank comments are refused before anything is written.
        let result = workflow::reject(hod_id.clone(), "carol".to_string(), "  ".to_string());
        assert_eq!(result.exit_code, 5);
        assert_eq!(parse_payload(&result.output)["error_class"], "unprocessable");

        let result = workflow::reject(hod_id, "carol".to_string(), "over budget".to_string());
        assert_eq!(result.exit_code, 0, "reject output: {}", result.output);

        let result = workflow::show("tkt-demo-003".to_string());
        assert_eq!(result.exit_code, 0);
        let view = message_json(&parse_payload(&result.output));
        assert_eq!(view["ticket"]["status"], "cancelled");
        assert_eq!(view["rejected_approval"]["comments"], "over budget");

        let result = workflow::resubmit("tkt-demo-003".to_string(), "alice".to_string());
        assert_eq!(result.exit_code, 0, "resubmit output: {}", result.output);
        let reopened = message_json(&parse_payload(&result.output));
        assert_eq!(reopened["status"], "pending_approval");

        let result = workflow::pending("bob".to_string());
        assert_eq!(result.exit_code, 0);
        let queue = message_json(&parse_payload(&result.output));
        assert_eq!(queue[0]["pass"], 2);
        assert_eq!(queue[0]["sequence"], 1);
    });
}

#[test]
fn show_reports_not_found_for_unknown_tickets() {
    let (_dir, url) = temp_database();
    with_env(&[("DESKFLOW_DATABASE_URL", &url)], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = workflow::show("tkt-missing".to_string());
        assert_eq!(result.exit_code, 5);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "not_found");
    });
}
