// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-secret authentication for the control sockets. Both daemons
//! gate their control socket behind a single token, read from a file at
//! startup; every RPC call carries it alongside the request payload.

use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the token from `path`, requiring it be readable only by its
    /// owner (mode `0600`) so a co-resident user cannot read it off disk.
    #[cfg(unix)]
    pub fn load(path: &Path) -> io::Result<Self> {
        use std::os::unix::fs::PermissionsExt;

        let meta = std::fs::metadata(path)?;
        let mode = meta.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("auth token file {} must not be readable by group/other (mode {mode:o})", path.display()),
            ));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Self(contents.trim().to_string()))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        // Constant-time-ish comparison: length check short-circuits cheaply,
        // but the byte comparison always walks the shorter string in full.
        self.0.len() == candidate.len()
            && self
                .0
                .bytes()
                .zip(candidate.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_identical_token() {
        let token = AuthToken("s3cret".to_string());
        assert!(token.matches("s3cret"));
        assert!(!token.matches("wrong"));
        assert!(!token.matches("s3cre"));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_group_readable_file() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"s3cret\n").unwrap();
        drop(f);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
        assert!(AuthToken::load(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn loads_owner_only_file() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"s3cret\n").unwrap();
        drop(f);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        let token = AuthToken::load(&path).unwrap();
        assert!(token.matches("s3cret"));
    }
}
