//! End-to-end tests for the compile, check and answer-key endpoints.
//!
//! The server runs on an ephemeral port with `fake-arduino-cli.sh` standing
//! in for the real compiler, so no Arduino toolchain is needed.

mod common;

use std::collections::HashMap;

use serde_json::{json, Value};
use tinker_answerkey::{AnswerKeyDraft, Overrides, SourceGenerator};
use tinker_blanks::{check_all, infer, AnswerRule};
use tinker_sandbox::{CompileDiagnostic, Compiler, UNRECOGNIZED_FORMAT};
use tinker_server::{CheckResponse, CompileResponse, Config, Lesson};

use common::{fixtures, start_server, test_config};

async fn post(base: &str, path: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}{path}"))
        .json(body)
        .send()
        .await
        .expect("Request failed")
}

fn sandboxes_left(root: &std::path::Path) -> usize {
    std::fs::read_dir(root).expect("Sandbox root exists").count()
}

// ============================================================================
// Compile
// ============================================================================

/// A clean sketch with a stubbed library compiles and reports memory usage.
#[tokio::test]
async fn test_compile_with_stubbed_library() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let code = "#include <Servo.h>\n\nServo arm;\n\nvoid setup() { arm.attach(9); }\nvoid loop() {}\n";
    let response = post(&base, "/api/compile", &json!({ "code": code })).await;

    assert_eq!(response.status(), 200);
    let body: CompileResponse = response.json().await.unwrap();
    assert!(body.ok, "{body:?}");
    assert!(body.errors.is_empty());
    let notices = body.notices.unwrap_or_default();
    assert!(notices[0].starts_with("Sketch uses 924 bytes"));
    assert_eq!(sandboxes_left(root.path()), 0);
}

/// Compiler errors come back with accurate line and column.
#[tokio::test]
async fn test_compile_reports_line_accurate_errors() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let code = "void setup() {\n  pinMode(13, OUTPUT);\n}\n\nvoid loop() {\n    digitalWrit(13, HIGH);\n}\n";
    let response = post(&base, "/api/compile", &json!({ "code": code })).await;

    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "ok": false,
            "errors": [{
                "line": 6,
                "column": 5,
                "message": "digitalWrit was not declared in this scope"
            }]
        })
    );
    assert_eq!(sandboxes_left(root.path()), 0);
}

/// An unknown library and a syntax error still yield at least one diagnostic.
#[tokio::test]
async fn test_compile_unknown_include() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let code = "#include <Arduino.h>\n#include <FancyRadio.h>\nvoid setup( {}\n";
    let body: CompileResponse = post(&base, "/api/compile", &json!({ "code": code }))
        .await
        .json()
        .await
        .unwrap();

    assert!(!body.ok);
    assert_eq!(body.errors.len(), 1);
    assert_eq!((body.errors[0].line, body.errors[0].column), (2, 10));
    assert_eq!(
        body.errors[0].message,
        "FancyRadio.h: No such file or directory"
    );
}

/// Output the parser cannot read falls back to a single generic diagnostic.
#[tokio::test]
async fn test_compile_unrecognized_output() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let body: CompileResponse = post(&base, "/api/compile", &json!({ "code": "// GARBLED\n" }))
        .await
        .json()
        .await
        .unwrap();

    assert!(!body.ok);
    assert_eq!(body.errors, vec![CompileDiagnostic::unrecognized()]);
    assert_eq!(body.errors[0].message, UNRECOGNIZED_FORMAT);
}

/// The compiler can be driven directly with the same settings the server uses.
#[tokio::test]
async fn test_compiler_from_config_settings() {
    let root = tempfile::tempdir().unwrap();
    let compiler = Compiler::new(test_config(root.path()).compiler.to_settings());

    let result = compiler.compile("void loop() { digitalWrit(1, 1); }\n").await;

    assert!(!result.is_success());
    assert_eq!(
        result.diagnostics(),
        &[CompileDiagnostic::new(1, 15, "digitalWrit was not declared in this scope")]
    );
    assert_eq!(sandboxes_left(root.path()), 0);
}

/// A hung compiler is killed at the timeout and its sandbox removed.
#[tokio::test]
async fn test_compile_timeout() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.compiler.timeout_seconds = 1;
    let base = start_server(config).await;

    let started = std::time::Instant::now();
    let body: CompileResponse = post(&base, "/api/compile", &json!({ "code": "// SLOW\n" }))
        .await
        .json()
        .await
        .unwrap();

    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert!(!body.ok);
    assert_eq!(body.errors[0].message, "Compilation timed out after 1 seconds.");
    assert_eq!(sandboxes_left(root.path()), 0);
}

/// Concurrent compiles do not see each other's sketches.
#[tokio::test]
async fn test_concurrent_compiles() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let good = json!({ "code": "void setup() {}\nvoid loop() {}\n" });
    let bad = json!({ "code": "void loop() { digitalWrit(1, 1); }\n" });
    let (a, b) = tokio::join!(post(&base, "/api/compile", &good), post(&base, "/api/compile", &bad));

    let a: CompileResponse = a.json().await.unwrap();
    let b: CompileResponse = b.json().await.unwrap();
    assert!(a.ok);
    assert!(!b.ok);
    assert_eq!(sandboxes_left(root.path()), 0);
}

#[tokio::test]
async fn test_compile_missing_code() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let response = post(&base, "/api/compile", &json!({})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"ok": false, "error": "Missing 'code'."}));
}

// ============================================================================
// Lessons
// ============================================================================

#[tokio::test]
async fn test_lesson_check_with_bound_identifier() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let values = json!({"LED": "statusLed", "PIN": "13", "USE": "statusLed", "MS": "0x3e8"});
    let body: CheckResponse = post(&base, "/api/lessons/blink/check", &json!({ "values": values, "step": 1 }))
        .await
        .json()
        .await
        .unwrap();
    assert!(body.ok, "{body:?}");

    let values = json!({"LED": "statusLed", "PIN": "13", "USE": "led", "MS": "500"});
    let body: CheckResponse = post(&base, "/api/lessons/blink/check", &json!({ "values": values }))
        .await
        .json()
        .await
        .unwrap();
    let wrong: Vec<_> = body
        .results
        .iter()
        .filter(|v| !v.correct)
        .map(|v| v.blank.as_str())
        .collect();
    assert_eq!(wrong, vec!["MS", "USE"]);
}

#[tokio::test]
async fn test_lesson_not_found() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let response = post(&base, "/api/lessons/does-not-exist/check", &json!({"values": {}})).await;
    assert_eq!(response.status(), 404);
}

/// Filling the lesson template with its own answers compiles cleanly.
#[tokio::test]
async fn test_lesson_template_filled_with_answers_compiles() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let lesson = Lesson::load(fixtures().join("lessons/blink.json")).unwrap();
    let template = tinker_blanks::Template::parse(&lesson.template);
    let values: HashMap<String, String> = [("LED", "LED"), ("PIN", "13"), ("USE", "LED"), ("MS", "1000")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let code = template.substitute(&values);
    assert!(!code.contains("__BLANK["));

    let body: CompileResponse = post(&base, "/api/compile", &json!({ "code": code }))
        .await
        .json()
        .await
        .unwrap();
    assert!(body.ok);
    assert!(lesson.check(&values).iter().all(|v| v.correct));
}

// ============================================================================
// Answer keys
// ============================================================================

/// Drafting a key from the servo fixture and checking the solved values
/// against it accepts them all.
#[tokio::test]
async fn test_answer_key_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let base = start_server(test_config(root.path())).await;

    let template = std::fs::read_to_string(fixtures().join("sketches/servo_template.ino")).unwrap();
    let solved = std::fs::read_to_string(fixtures().join("sketches/servo_solved.ino")).unwrap();

    let response = post(
        &base,
        "/api/answer-key",
        &json!({
            "template": template,
            "solved": solved,
            "bind": {"ATTACH": "SERVO", "SERVO_USE": "SERVO"}
        }),
    )
    .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["rules"]["SERVO"], json!({"type": "equals", "value": "arm"}));
    assert_eq!(body["rules"]["ATTACH"], json!({"type": "bound_identifier", "source": "SERVO"}));
    assert_eq!(body["rules"]["BAUD"], json!({"type": "one_of", "values": ["9600", "0x2580"]}));
    assert_eq!(body["rules"]["MSG"], json!({"type": "equals", "value": "\"moved\""}));
    assert_eq!(body["rules"]["ANGLE"]["type"], "matches");
    assert_eq!(body["unresolved"], json!([]));

    let values: HashMap<String, String> = body["blanks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| {
            (
                b["name"].as_str().unwrap().to_string(),
                b["value"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    let check: CheckResponse = post(&base, "/api/check", &json!({ "rules": body["rules"], "values": values }))
        .await
        .json()
        .await
        .unwrap();
    assert!(check.ok, "{check:?}");
    assert_eq!(check.results.len(), 7);
}

/// The library pipeline agrees with the endpoint.
#[test]
fn test_answer_key_pipeline_without_server() {
    let template = std::fs::read_to_string(fixtures().join("sketches/servo_template.ino")).unwrap();
    let solved = std::fs::read_to_string(fixtures().join("sketches/servo_solved.ino")).unwrap();

    let inferred = infer(&template, &solved);
    assert!(inferred.iter().all(|b| b.ok && b.warning.is_none()));
    assert_eq!(inferred[0].value, "arm");

    let overrides = Overrides::default()
        .with_bind("ATTACH", "SERVO")
        .with_bind("SERVO_USE", "SERVO");
    let draft = AnswerKeyDraft::build(&inferred, &overrides);
    let key = draft.answer_key();
    assert_eq!(key.get("SERVO_USE"), Some(&AnswerRule::bound("SERVO")));

    let values: HashMap<String, String> = inferred
        .iter()
        .map(|b| (b.name.clone(), b.value.clone()))
        .collect();
    assert!(check_all(&key, &values).iter().all(|v| v.correct));

    let snippet = SourceGenerator::new(&draft).generate();
    assert!(snippet.contains(r#"PIN: { type: "one_of", values: ["9", "0x9"] }, // number"#));
}

#[test]
fn test_sample_config_loads() {
    let config = Config::load_from_file(&fixtures().join("tinker.json")).unwrap();
    assert_eq!(config.compiler.timeout_seconds, 30);
    assert_eq!(config.explain.max_code_chars, 2000);
    assert_eq!(config.explain.max_diagnostics, 3);
    assert_eq!(config.explain.context_before, 3);
    assert!(config.validate().is_ok());
}
