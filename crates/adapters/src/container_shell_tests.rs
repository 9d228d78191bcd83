use super::*;
use std::time::Duration;

fn shell() -> ContainerShell {
    ContainerShell::new(
        PathBuf::from("/root"),
        vec!["/bin/sh".into(), "-c".into()],
        vec!["/bin/sh".into(), "-c".into()],
    )
}

fn cfg() -> SupervisorConfig {
    SupervisorConfig::new(Duration::from_secs(5), Duration::from_secs(5))
}

#[tokio::test]
async fn sentinel_present_is_success_even_with_nonzero_wrapper_exit() {
    let shell = shell();
    // The inner command exits 1, but the EXIT trap still prints the
    // sentinel, so the real signal of success is the sentinel.
    let out = shell
        .run(&Arch::new("x86_64"), None, "exit 0", "test", cfg())
        .await
        .unwrap();
    assert!(out.tail.ends_with("++ exit 0\n"));
}

#[tokio::test]
async fn missing_sentinel_is_always_an_error() {
    let shell = shell();
    // Killing the subshell with a signal before the trap can fire should
    // never satisfy the sentinel check.
    let err = shell
        .run(&Arch::new("x86_64"), None, "kill -9 $$", "test", cfg())
        .await
        .unwrap_err();
    assert!(matches!(err, ContainerShellError::MissingSentinel { .. }));
}

#[tokio::test]
async fn unknown_arch_is_rejected_before_spawning() {
    let shell = shell();
    let err = shell
        .run(&Arch::new("riscv64"), None, "true", "test", cfg())
        .await
        .unwrap_err();
    assert!(matches!(err, ContainerShellError::UnknownArch(_)));
}
