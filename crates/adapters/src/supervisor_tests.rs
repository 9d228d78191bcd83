use super::*;
use std::time::Duration;

fn sh(script: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[tokio::test]
async fn captures_successful_output() {
    let config = SupervisorConfig::new(Duration::from_secs(5), Duration::from_secs(5));
    let out = run(sh("echo hello"), vec!["echo".into()], config)
        .await
        .unwrap();
    assert_eq!(out.status, Some(0));
    assert!(out.tail.contains("hello"));
}

#[tokio::test]
async fn nonzero_exit_is_command_failed() {
    let config = SupervisorConfig::new(Duration::from_secs(5), Duration::from_secs(5));
    let err = run(sh("echo oops; exit 3"), vec!["false".into()], config)
        .await
        .unwrap_err();
    match err {
        SupervisorError::CommandFailed { status, tail, .. } => {
            assert_eq!(status, Some(3));
            assert!(tail.contains("oops"));
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn hard_timeout_kills_stuck_child() {
    let config = SupervisorConfig::new(Duration::from_secs(1), Duration::from_secs(5));
    let err = run(sh("sleep 30"), vec!["sleep".into()], config)
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Timeout { .. }));
}

#[tokio::test]
async fn short_return_bounds_the_ring() {
    let config = SupervisorConfig::new(Duration::from_secs(5), Duration::from_secs(5)).short_return();
    let script = (0..50)
        .map(|i| format!("echo line{i}"))
        .collect::<Vec<_>>()
        .join("; ");
    let out = run(sh(&script), vec!["loop".into()], config)
        .await
        .unwrap();
    assert!(out.tail.lines().count() <= SHORT_RETURN_LINES);
    assert!(out.tail.contains("line49"));
    assert!(!out.tail.contains("line0\n"));
}
