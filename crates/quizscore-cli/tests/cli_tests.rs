//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TRUST_QUIZ: &str = "../../quizzes/trust.toml";
const ANSWERS_DIR: &str = "../../quizzes/answers";
const TRUSTING_ANSWERS: &str =
    "../../quizzes/answers/3f1c2a9e-4b7d-4e55-9a0c-2d8f6b1e7a10.json";
const TRUSTING_SESSION: &str = "3f1c2a9e-4b7d-4e55-9a0c-2d8f6b1e7a10";
const WARY_SESSION: &str = "8a6e0c4d-2f3b-4c1a-b9e7-5d4f3a2b1c0e";

fn quizscore() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("quizscore").unwrap()
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn validate_valid_quiz() {
    quizscore()
        .arg("validate")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Test: trust-quiz v1 (3 questions, 2 scales, 3 rules)",
        ))
        .stdout(predicate::str::contains("All test definitions valid"));
}

#[test]
fn validate_broken_quiz_fails() {
    quizscore()
        .arg("validate")
        .arg("--test")
        .arg("../../quizzes/broken/broken.toml")
        .assert()
        .failure()
        .stdout(predicate::str::contains("question has no options"))
        .stdout(predicate::str::contains("min 10 is greater than max 0"))
        .stdout(predicate::str::contains("unknown variable: ghost"))
        .stdout(predicate::str::contains("WARNING: no default result"))
        .stderr(predicate::str::contains("definition error(s)"));
}

#[test]
fn validate_directory_reports_every_quiz() {
    quizscore()
        .arg("validate")
        .arg("--test")
        .arg("../../quizzes")
        .assert()
        .failure()
        .stdout(predicate::str::contains("trust-quiz"))
        .stdout(predicate::str::contains("broken-quiz"));
}

#[test]
fn validate_nonexistent_file() {
    quizscore()
        .arg("validate")
        .arg("--test")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn score_text_output() {
    quizscore()
        .arg("score")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers")
        .arg(TRUSTING_ANSWERS)
        .assert()
        .success()
        .stdout(predicate::str::contains("Result: trusting (rule 'trusting')"))
        .stdout(predicate::str::contains("You give people the benefit of the doubt."))
        .stdout(predicate::str::contains(TRUSTING_SESSION))
        .stdout(predicate::str::contains("You trust readily."));
}

#[test]
fn score_json_output() {
    let output = quizscore()
        .arg("score")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers")
        .arg(TRUSTING_ANSWERS)
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let record = stdout_json(&output);
    assert_eq!(record["sessionId"], TRUSTING_SESSION);
    assert_eq!(record["testId"], "trust-quiz");
    assert_eq!(record["result"]["summaryType"], "trusting");
    assert_eq!(record["result"]["scales"][0]["key"], "trust");
    assert_eq!(record["result"]["scales"][0]["raw"], 8.0);
    assert_eq!(record["result"]["scales"][0]["band"]["label"], "high");
    assert_eq!(record["result"]["scales"][1]["band"]["label"], "calm");
    assert_eq!(record["result"]["details"]["habits"][1], "secrets");
}

#[test]
fn score_markdown_output() {
    quizscore()
        .arg("score")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers")
        .arg("../../quizzes/answers/guarded.toml")
        .arg("--format")
        .arg("markdown")
        .assert()
        .success()
        .stdout(predicate::str::contains("## guarded"))
        .stdout(predicate::str::contains("| Trust | 2 | 2 | low |"));
}

#[test]
fn score_invalid_answers_fails() {
    quizscore()
        .arg("score")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers")
        .arg("../../quizzes/answers/invalid.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "invalid option 'maybe' for question 'door'",
        ));
}

#[test]
fn score_unknown_format_fails() {
    quizscore()
        .arg("score")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers")
        .arg(TRUSTING_ANSWERS)
        .arg("--format")
        .arg("yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format 'yaml'"));
}

#[test]
fn score_with_store_then_show() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("records");
    let session = "00000000-0000-4000-8000-000000000001";

    quizscore()
        .arg("score")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers")
        .arg("../../quizzes/answers/worried.json")
        .arg("--store")
        .arg(&store)
        .arg("--session")
        .arg(session)
        .assert()
        .success()
        .stdout(predicate::str::contains("Result: wary"));

    assert!(store.join(format!("{session}.json")).exists());

    let output = quizscore()
        .arg("show")
        .arg("--store")
        .arg(&store)
        .arg("--session")
        .arg(session)
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let record = stdout_json(&output);
    assert_eq!(record["sessionId"], session);
    assert_eq!(record["result"]["summaryType"], "wary");
    assert_eq!(record["result"]["matchedRule"]["id"], "wary");
}

#[test]
fn show_missing_session_fails() {
    let dir = TempDir::new().unwrap();
    quizscore()
        .arg("show")
        .arg("--store")
        .arg(dir.path())
        .arg("--session")
        .arg(TRUSTING_SESSION)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no record for session"));
}

#[test]
fn batch_scores_directory() {
    let dir = TempDir::new().unwrap();
    let output_dir = dir.path().join("out");
    let store = dir.path().join("records");

    quizscore()
        .arg("batch")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers-dir")
        .arg(ANSWERS_DIR)
        .arg("--output")
        .arg(&output_dir)
        .arg("--store")
        .arg(&store)
        .arg("--parallelism")
        .arg("2")
        .assert()
        .success()
        .stderr(predicate::str::contains("3/4 scored, 1 failed"));

    let report_path = std::fs::read_dir(&output_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|ext| ext == "json"))
        .expect("batch report written");
    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();

    assert_eq!(report["testId"], "trust-quiz");
    assert_eq!(report["records"].as_array().unwrap().len(), 3);
    assert_eq!(report["failures"][0]["kind"], "validation");
    assert_eq!(report["stats"]["classifications"]["trusting"], 1);
    assert_eq!(report["stats"]["classifications"]["wary"], 1);
    assert_eq!(report["stats"]["classifications"]["guarded"], 1);
    assert_eq!(report["stats"]["defaulted"], 1);

    quizscore()
        .arg("show")
        .arg("--store")
        .arg(&store)
        .arg("--session")
        .arg(WARY_SESSION)
        .assert()
        .success()
        .stdout(predicate::str::contains("Result: wary (rule 'wary')"));
}

#[test]
fn batch_rejects_zero_parallelism() {
    let dir = TempDir::new().unwrap();
    quizscore()
        .arg("batch")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers-dir")
        .arg(ANSWERS_DIR)
        .arg("--output")
        .arg(dir.path())
        .arg("--parallelism")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("parallelism must be at least 1"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    quizscore()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created quizscore.toml"))
        .stdout(predicate::str::contains("Created quizzes/example.toml"));

    assert!(dir.path().join("quizscore.toml").exists());
    assert!(dir.path().join("quizzes/example.toml").exists());

    quizscore()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--test")
        .arg("quizzes/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All test definitions valid"));

    quizscore()
        .current_dir(dir.path())
        .arg("score")
        .arg("--test")
        .arg("quizzes/example.toml")
        .arg("--answers")
        .arg("quizzes/answers/example.json")
        .assert()
        .success()
        .stdout(predicate::str::contains("Result: extrovert"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    quizscore()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    quizscore()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn explicit_config_limits_apply() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("strict.toml");
    std::fs::write(&config, "[scoring]\nrequire_complete = true\n").unwrap();
    let answers = dir.path().join("partial.json");
    std::fs::write(&answers, r#"{"door": "no"}"#).unwrap();

    quizscore()
        .arg("score")
        .arg("--test")
        .arg(TRUST_QUIZ)
        .arg("--answers")
        .arg(&answers)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unanswered questions: habits, worry"));
}
