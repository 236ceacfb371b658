#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// A project directory plus a registry kept outside it, so registry files
/// never show up in detection or rule globs.
struct Project {
    dir: TempDir,
    registry: TempDir,
}

impl Project {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            registry: TempDir::new().unwrap(),
        }
    }

    fn seeded() -> Self {
        let p = Self::new();
        p.phase().args(["registry", "seed"]).assert().success();
        p
    }

    fn phase(&self) -> Command {
        let mut cmd = Command::cargo_bin("phase").unwrap();
        cmd.current_dir(self.dir.path())
            .env("PHASE_ROOT", self.dir.path())
            .env("PHASE_REGISTRY", self.registry.path())
            .env_remove("RUST_LOG");
        cmd
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, rel: &str, content: &str) {
        let p = self.path().join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, content).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path().join(rel)).unwrap()
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let out = self.phase().arg("--json").args(args).output().unwrap();
        assert!(
            out.status.success(),
            "phase {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        serde_json::from_slice(&out.stdout).unwrap()
    }
}

const PLAN: &str = "\
stack: python-fastapi
phases:
  - title: Skeleton
    deliverables: [\"app/main.py\"]
  - title: Users module
    deliverables: [\"app/modules/users/**\"]
";

// ---------------------------------------------------------------------------
// phase registry / stack
// ---------------------------------------------------------------------------

#[test]
fn seed_installs_builtin_stacks() {
    let p = Project::seeded();
    p.phase()
        .args(["stack", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("python-fastapi"))
        .stdout(predicate::str::contains("terraform"));

    p.phase()
        .args(["registry", "seed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:    go-gin"));
}

#[test]
fn stack_show_prints_context_and_rules() {
    let p = Project::seeded();
    p.phase()
        .args(["stack", "show", "python-fastapi"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## Tech Stack"))
        .stdout(predicate::str::contains("400-api [app/api/**/*.py]"));
}

#[test]
fn unknown_stack_suggests_closest() {
    let p = Project::seeded();
    p.phase()
        .args(["setup", "python-fastapy"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("did you mean 'python-fastapi'"));
    assert!(!p.path().join(".phase/context.md").exists());
}

// ---------------------------------------------------------------------------
// phase setup / resolve-rules
// ---------------------------------------------------------------------------

#[test]
fn setup_materializes_context_and_matching_rules() {
    let p = Project::seeded();
    p.write("app/main.py", "from fastapi import FastAPI\n");
    p.write("app/api/users.py", "from fastapi import APIRouter\n");

    p.phase().args(["setup", "python-fastapi"]).assert().success();

    let ctx = p.read(".phase/context.md");
    assert!(ctx.contains("## Tech Stack"));
    assert!(ctx.contains("- Stack: python-fastapi"));
    assert!(ctx.contains("## Strictness: Medium"));
    assert!(ctx.contains("## Active Phase"));
    for rule in ["100-style", "200-testing", "300-architecture", "400-api"] {
        assert!(
            p.path().join(format!(".phase/rules/{rule}.md")).exists(),
            "{rule} missing"
        );
    }
    assert!(p.path().join(".phase/config.yaml").exists());
    assert!(p.read(".gitignore").contains(".phase/context.md.lock"));
}

#[test]
fn glob_rule_without_matching_file_is_skipped() {
    let p = Project::seeded();
    p.write("app/main.py", "app = None\n");
    p.phase().args(["setup", "python-fastapi"]).assert().success();

    let out = p.json(&["resolve-rules"]);
    let ids: Vec<&str> = out["resolved"]["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["100-style", "200-testing", "300-architecture"]);
    assert!(!p.path().join(".phase/rules/400-api.md").exists());
}

#[test]
fn setup_and_resolve_are_idempotent() {
    let p = Project::seeded();
    p.write("app/main.py", "app = None\n");
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    let first = p.read(".phase/context.md");
    let rule = p.read(".phase/rules/100-style.md");

    p.phase().args(["setup", "python-fastapi"]).assert().success();
    p.phase().arg("resolve-rules").assert().success();
    assert_eq!(p.read(".phase/context.md"), first);
    assert_eq!(p.read(".phase/rules/100-style.md"), rule);

    let out = p.json(&["resolve-rules"]);
    assert!(out["written"].as_array().unwrap().is_empty());
    assert!(out["resolved"].get("overrides").is_none());
}

#[test]
fn legacy_rule_overrides_stack_rule() {
    let p = Project::seeded();
    p.write(
        ".cursor/rules/100-style.md",
        "---\nid: 100-style\nalwaysApply: true\n---\n# House style\n\n- tabs, sorry\n",
    );
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    assert!(p.read(".phase/rules/100-style.md").contains("tabs, sorry"));
}

fn resolved_rule<'a>(out: &'a serde_json::Value, id: &str) -> &'a serde_json::Value {
    out["resolved"]["rules"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == id)
        .unwrap_or_else(|| panic!("{id} not resolved"))
}

#[test]
fn switching_stacks_replaces_materialized_rules() {
    let p = Project::seeded();
    p.write("app/api/users.py", "from fastapi import APIRouter\n");
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    assert!(p.path().join(".phase/rules/400-api.md").exists());

    p.phase().args(["setup", "node-express"]).assert().success();
    let out = p.json(&["resolve-rules"]);
    let style = resolved_rule(&out, "100-style");
    assert!(style["body"].as_str().unwrap().contains("strict mode"));
    assert_eq!(style["source"]["type"], "stack");
    assert_eq!(style["source"]["from"], "node-express");
    assert!(out["resolved"].get("overrides").is_none());

    assert!(p.read(".phase/rules/100-style.md").contains("strict mode"));
    assert!(!p.path().join(".phase/rules/400-api.md").exists());
}

#[test]
fn registry_edits_reach_a_materialized_project() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();

    let stack_rule = p.registry.path().join("python-fastapi/rules/100-style.md");
    let mut content = std::fs::read_to_string(&stack_rule).unwrap();
    content.push_str("- Docstrings on public functions.\n");
    std::fs::write(&stack_rule, content).unwrap();

    let out = p.json(&["resolve-rules"]);
    let style = resolved_rule(&out, "100-style");
    assert!(style["body"].as_str().unwrap().contains("Docstrings on public functions"));
    assert_eq!(style["source"]["type"], "stack");
    assert!(p.read(".phase/rules/100-style.md").contains("Docstrings on public functions"));
}

#[test]
fn hand_written_project_rule_still_wins() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    p.write(".phase/rules/100-style.md", "# Style\n\n- Team rules only.\n");

    let out = p.json(&["resolve-rules"]);
    let style = resolved_rule(&out, "100-style");
    assert_eq!(style["source"]["type"], "project");
    assert_eq!(out["resolved"]["overrides"][0]["id"], "100-style");
    assert_eq!(p.read(".phase/rules/100-style.md"), "# Style\n\n- Team rules only.\n");
}

#[test]
fn glob_rules_see_files_beyond_the_detection_cap() {
    let p = Project::seeded();
    p.write(".phase/config.yaml", "detection:\n  max_walk_entries: 2\n");
    for i in 0..5 {
        p.write(&format!("aaa/f{i}.py"), "x = 1\n");
    }
    p.write("app/api/users.py", "from fastapi import APIRouter\n");

    p.phase().args(["setup", "python-fastapi"]).assert().success();
    assert!(p.path().join(".phase/rules/400-api.md").exists());
}

#[test]
fn setup_from_plan_records_phases() {
    let p = Project::seeded();
    p.write("plan.yaml", PLAN);
    p.phase()
        .args(["setup", "--from-plan", "plan.yaml"])
        .assert()
        .success();
    let ctx = p.read(".phase/context.md");
    assert!(ctx.contains("## Phase Plan"));
    assert!(ctx.contains("Users module"));
    assert!(ctx.contains("- Deliverable: app/modules/users/**"));
}

#[test]
fn setup_detect_picks_express() {
    let p = Project::seeded();
    p.write("package.json", r#"{"dependencies":{"express":"^4.19.0"}}"#);
    p.write("tests/app.spec.ts", "import request from 'supertest';\n");

    p.phase().args(["setup", "--detect"]).assert().success();
    let ctx = p.read(".phase/context.md");
    assert!(ctx.contains("- Stack: node-express"));
    assert!(ctx.contains("## Detected Signals"));
}

#[test]
fn setup_detect_without_match_fails() {
    let p = Project::seeded();
    p.write("README.md", "# nothing to see\n");
    p.phase()
        .args(["setup", "--detect"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no stack matched"));
}

#[test]
fn setup_detect_create_registers_observed_stack() {
    let p = Project::seeded();
    p.write(
        "src/lib.rs",
        "pub fn parse_header(input: &str) -> usize {\n    input.len()\n}\n",
    );
    p.phase()
        .args(["setup", "--detect", "--create", "house-rust"])
        .assert()
        .success();
    assert!(p.registry.path().join("house-rust/context.md").exists());
    assert!(p.read(".phase/context.md").contains("- Stack: house-rust"));
    assert!(p.path().join(".phase/rules/100-conventions.md").exists());
}

// ---------------------------------------------------------------------------
// phase detect
// ---------------------------------------------------------------------------

#[test]
fn detect_express_project_with_typescript_tests() {
    let p = Project::seeded();
    p.write("package.json", r#"{"dependencies":{"express":"^4.19.0"}}"#);
    p.write(
        "tests/users.spec.ts",
        "import request from 'supertest';\n\nconst userList = [];\n",
    );

    let report = p.json(&["detect"]);
    assert_eq!(report["observed_language"], "typescript");
    assert_eq!(report["observed_framework"], "express");
    assert_eq!(report["matched_stack"], "node-express");
    assert!(report["confidence"].as_f64().unwrap() >= 0.66);
}

#[test]
fn detect_empty_directory_has_zero_confidence() {
    let p = Project::seeded();
    let report = p.json(&["detect"]);
    assert!(report["matched_stack"].is_null());
    assert_eq!(report["confidence"].as_f64().unwrap(), 0.0);
}

// ---------------------------------------------------------------------------
// Phases and sessions
// ---------------------------------------------------------------------------

#[test]
fn commands_before_setup_are_not_initialized() {
    let p = Project::new();
    p.phase()
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn skipping_a_phase_is_refused() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    p.phase()
        .args(["start-session", "--phase", "2"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid transition"));
}

#[test]
fn record_without_session_fails() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    p.phase()
        .args(["record", "app/main.py"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no open session"));
}

#[test]
fn failing_tests_keep_phase_in_progress() {
    let p = Project::seeded();
    p.write("plan.yaml", PLAN);
    p.phase().args(["setup", "--from-plan", "plan.yaml"]).assert().success();

    p.phase().arg("start-session").assert().success();
    p.phase().args(["record", "app/main.py"]).assert().success();
    p.phase()
        .args(["complete-session", "--status", "passing", "--summary", "skeleton runs"])
        .assert()
        .success();
    p.phase().arg("complete-phase").assert().success();

    p.phase().args(["start-session", "--phase", "1"]).assert().success();
    p.phase()
        .args(["record", "--tests", "failing", "app/modules/users/router.py"])
        .assert()
        .success();
    p.phase()
        .args(["complete-session", "--status", "failing", "--summary", "half done"])
        .assert()
        .success();
    p.phase()
        .args(["complete-phase", "--phase", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot complete implementation-1"))
        .stderr(predicate::str::contains("failing"));

    let status = p.json(&["status"]);
    assert_eq!(status["context"]["active_phase"]["index"], 1);
    assert_eq!(status["context"]["active_phase"]["status"], "in_progress");
}

#[test]
fn recorded_paths_are_normalized_against_the_project() {
    let p = Project::seeded();
    p.write("plan.yaml", PLAN);
    p.write("app/main.py", "app = None\n");
    p.phase().args(["setup", "--from-plan", "plan.yaml"]).assert().success();

    p.phase().arg("start-session").assert().success();
    p.phase().args(["record", "./app/main.py"]).assert().success();
    p.phase()
        .args(["complete-session", "--status", "passing", "--summary", "ok", "--advance"])
        .assert()
        .success();

    p.phase().arg("start-session").assert().success();
    p.write("app/modules/users/router.py", "router = None\n");
    p.phase()
        .current_dir(p.path().join("app/modules"))
        .args(["record", "./users/router.py"])
        .assert()
        .success();
    let status = p.json(&["status"]);
    assert_eq!(
        status["open_session"]["files_touched"][0],
        "app/modules/users/router.py"
    );
}

#[test]
fn complete_session_with_advance_walks_the_plan() {
    let p = Project::seeded();
    p.write("plan.yaml", PLAN);
    p.phase().args(["setup", "--from-plan", "plan.yaml"]).assert().success();

    for (files, summary) in [
        ("app/main.py", "skeleton"),
        ("app/modules/users/service.py", "users"),
    ] {
        p.phase().arg("start-session").assert().success();
        p.phase().args(["record", files]).assert().success();
        p.phase()
            .args(["complete-session", "--status", "passing", "--summary", summary, "--advance"])
            .assert()
            .success();
    }

    let status = p.json(&["status"]);
    assert_eq!(status["context"]["active_phase"]["status"], "complete");
    assert_eq!(status["latest_session"]["number"], 2);
    assert!(p.path().join(".phase/sessions/0001-skeleton.yaml").exists());
    assert!(p.path().join(".phase/sessions/0002-implementation-1.yaml").exists());
}

#[test]
fn strictness_override_rewrites_heading() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    p.phase().args(["strictness", "high"]).assert().success();
    let ctx = p.read(".phase/context.md");
    assert!(ctx.contains("## Strictness: High"));
    assert!(!ctx.contains("## Strictness: Medium"));

    p.phase().args(["strictness", "extreme"]).assert().code(1);
}

#[test]
fn invalid_argument_values_are_user_errors() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    p.phase()
        .args(["strictness", "extreme"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid value 'extreme'"));
    p.phase()
        .args(["complete-session", "--status", "green", "--summary", "x"])
        .assert()
        .code(1);
    p.phase().arg("--help").assert().success();
    p.phase().arg("--version").assert().success();
}

#[test]
fn out_of_range_config_is_refused() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    p.write(".phase/config.yaml", "detection:\n  min_confidence: 1.5\n");
    p.phase()
        .arg("detect")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("outside [0, 1]"));
}

#[test]
fn payload_contains_context_rules_and_goal() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();
    let payload = p.json(&["payload", "--goal", "add a health endpoint"]);
    assert_eq!(payload["goal"], "add a health endpoint");
    assert_eq!(payload["context"]["active_stack"], "python-fastapi");
    assert!(!payload["rules"]["rules"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Concurrent writers
// ---------------------------------------------------------------------------

#[test]
fn concurrent_updates_never_tear_the_context() {
    let p = Project::seeded();
    p.phase().args(["setup", "python-fastapi"]).assert().success();

    let bin = assert_cmd::cargo::cargo_bin("phase");
    let spawn = |level: &str| {
        std::process::Command::new(&bin)
            .args(["strictness", level])
            .env("PHASE_ROOT", p.path())
            .env("PHASE_REGISTRY", p.registry.path())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .unwrap()
    };
    let children: Vec<_> = ["high", "low", "high", "low"].into_iter().map(spawn).collect();
    for mut child in children {
        let code = child.wait().unwrap().code();
        // Either it got the lock or it gave up with the locking exit code.
        assert!(matches!(code, Some(0) | Some(2)), "unexpected exit {code:?}");
    }

    let status = p.json(&["status"]);
    let level = status["context"]["strictness"].as_str().unwrap();
    assert!(level == "high" || level == "low");
}
