use assert_cmd::Command;
use predicates::str::contains;

fn event(extra: &str) -> String {
    format!(r#"{{"session_id":"test-session","cwd":"/tmp"{extra}}}"#)
}

#[test]
fn pre_tool_use_denies_rm_rf_root() {
    let input = format!(
        r#"{{"session_id":"s1","cwd":"/tmp","hook_event_name":"PreToolUse",
            "tool_name":"Bash","tool_input":{{"command":"rm -rf /"}}}}"#
    );
    let mut cmd = Command::cargo_bin("loopguard-pre-tool-use").unwrap();
    cmd.write_stdin(input)
        .assert()
        .success()
        .stderr(contains("blocked"));
}

#[test]
fn pre_tool_use_passes_through_benign_read() {
    let input = format!(
        r#"{{"session_id":"s1","cwd":"/tmp","hook_event_name":"PreToolUse",
            "tool_name":"Read","tool_input":{{"file_path":"src/lib.rs"}}}}"#
    );
    let mut cmd = Command::cargo_bin("loopguard-pre-tool-use").unwrap();
    cmd.write_stdin(input).assert().success();
}

#[test]
fn pre_tool_use_with_empty_stdin_does_not_crash() {
    let mut cmd = Command::cargo_bin("loopguard-pre-tool-use").unwrap();
    cmd.write_stdin("").assert().success();
}

#[test]
fn stop_with_no_autonomous_state_passes_through() {
    let input = event(r#","hook_event_name":"Stop""#);
    let mut cmd = Command::cargo_bin("loopguard-stop").unwrap();
    cmd.write_stdin(input).assert().success();
}

#[test]
fn session_start_with_empty_project_does_not_crash() {
    let dir = tempfile::tempdir().unwrap();
    let input = format!(
        r#"{{"session_id":"s1","cwd":"{}","hook_event_name":"SessionStart"}}"#,
        dir.path().display()
    );
    let mut cmd = Command::cargo_bin("loopguard-session-start").unwrap();
    cmd.write_stdin(input).assert().success();
}

#[test]
fn user_prompt_submit_with_no_prompt_passes_through() {
    let input = r#"{"session_id":"s1","cwd":"/tmp","hook_event_name":"UserPromptSubmit"}"#;
    let mut cmd = Command::cargo_bin("loopguard-user-prompt-submit").unwrap();
    cmd.write_stdin(input).assert().success();
}

#[test]
fn post_tool_use_on_non_exploration_tool_passes_through() {
    let input = r#"{"session_id":"s1","cwd":"/tmp","hook_event_name":"PostToolUse",
        "tool_name":"Bash","tool_input":{"command":"echo hi"}}"#;
    let mut cmd = Command::cargo_bin("loopguard-post-tool-use").unwrap();
    cmd.write_stdin(input).assert().success();
}

#[test]
fn pre_compact_with_no_autonomous_state_passes_through() {
    let input = r#"{"session_id":"s1","cwd":"/tmp","hook_event_name":"PreCompact"}"#;
    let mut cmd = Command::cargo_bin("loopguard-pre-compact").unwrap();
    cmd.write_stdin(input).assert().success();
}
