use super::*;

// `vercmp` itself is an external Arch Linux tool and may not be present in
// every test environment, so these exercise the shim via a stand-in script
// that speaks the same `-1`/`0`/`1` protocol rather than requiring the real
// binary on PATH.

fn fake_vercmp(dir: &std::path::Path) -> ExternalVercmp {
    let path = dir.join("vercmp");
    std::fs::write(
        &path,
        "#!/bin/sh\nif [ \"$1\" = \"$2\" ]; then echo 0; elif [ \"$1\" \\> \"$2\" ]; then echo 1; else echo -1; fi\n",
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    ExternalVercmp::with_binary(path.to_string_lossy().to_string())
}

#[tokio::test]
async fn reports_equal_versions() {
    let dir = tempfile::tempdir().unwrap();
    let cmp = fake_vercmp(dir.path());
    let ord = cmp
        .compare(&Version::new("1.0-1"), &Version::new("1.0-1"))
        .await
        .unwrap();
    assert_eq!(ord, Ordering::Equal);
}

#[tokio::test]
async fn reports_greater_and_less() {
    let dir = tempfile::tempdir().unwrap();
    let cmp = fake_vercmp(dir.path());
    assert_eq!(
        cmp.compare(&Version::new("2.0-1"), &Version::new("1.0-1"))
            .await
            .unwrap(),
        Ordering::Greater
    );
    assert_eq!(
        cmp.compare(&Version::new("1.0-1"), &Version::new("2.0-1"))
            .await
            .unwrap(),
        Ordering::Less
    );
}

#[tokio::test]
async fn missing_binary_is_command_failed() {
    let cmp = ExternalVercmp::with_binary("/nonexistent/vercmp-binary");
    let err = cmp
        .compare(&Version::new("1.0-1"), &Version::new("2.0-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, VersionCompareError::CommandFailed(_)));
}
