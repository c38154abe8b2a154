use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

fn submon(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("submon").expect("binary");
    cmd.env("SUBMON_DATA_DIR", data_dir)
        .env("SUBMON_TZ", "UTC")
        .env("SUBMON_LOG", "off")
        .env_remove("SUBMON_LOG_DIR");
    cmd
}

fn stdout_line(output: std::process::Output) -> String {
    assert!(output.status.success(), "command failed: {output:?}");
    String::from_utf8(output.stdout)
        .expect("utf8")
        .trim()
        .to_string()
}

#[test]
fn add_and_list_clients_round_trip() {
    let dir = tempdir().unwrap();

    let category_id = stdout_line(
        submon(dir.path())
            .args(["category", "add", "--name", "Hosting"])
            .output()
            .unwrap(),
    );
    assert!(!category_id.is_empty());

    let client_id = stdout_line(
        submon(dir.path())
            .args([
                "client", "add", "--name", "Acme", "--category", &category_id, "--duration",
                "week", "--start", "2020-01-01", "--amount", "12.5",
            ])
            .output()
            .unwrap(),
    );

    let listing = submon(dir.path())
        .args(["client", "list", "--json"])
        .output()
        .unwrap();
    assert!(listing.status.success());
    let rows: Value = serde_json::from_slice(&listing.stdout).unwrap();
    let row = &rows.as_array().unwrap()[0];
    assert_eq!(row["client"]["id"], client_id.as_str());
    assert_eq!(row["client"]["subscriptionDuration"], "ONE_WEEK");
    assert_eq!(row["client"]["subscriptionStartDate"], 1_577_836_800_000_i64);
    assert_eq!(row["expiresAt"], 1_578_441_600_000_i64);
    assert_eq!(row["categoryName"], "Hosting");
    assert_eq!(row["expired"], true);
    assert_eq!(row["label"], "Expired");
    assert_eq!(row["level"], "expired");
}

#[test]
fn client_without_categories_is_rejected() {
    let dir = tempdir().unwrap();
    let output = submon(dir.path())
        .args([
            "client", "add", "--name", "Acme", "--category", "missing", "--duration", "month",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("VALIDATION/NO_CATEGORIES"), "{stderr}");
}

#[test]
fn deleting_unknown_ids_exits_nonzero() {
    let dir = tempdir().unwrap();
    let output = submon(dir.path())
        .args(["client", "delete", "ghost"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No client with id ghost"), "{stderr}");
}

#[test]
fn data_dir_flag_overrides_environment() {
    let env_dir = tempdir().unwrap();
    let flag_dir = tempdir().unwrap();
    submon(env_dir.path())
        .args(["category", "add", "--name", "Gym", "--data-dir"])
        .arg(flag_dir.path())
        .assert()
        .success();
    assert!(flag_dir
        .path()
        .join("subscription_monitor_categories.json")
        .exists());
    assert!(!env_dir
        .path()
        .join("subscription_monitor_categories.json")
        .exists());
}
