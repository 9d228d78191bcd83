// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The internal command the control-server listener hands to the single
//! build loop. Mirrors `BuilderRequest` one-to-one but carries a
//! `oneshot::Sender` reply channel instead of living on the wire, so the
//! listener and the loop never touch shared state directly — mutation
//! stays serialized through the type system rather than lock discipline.

use packhouse_protocol::{BuilderRequest, BuilderResponse};
use tokio::sync::oneshot;

pub enum Command {
    Info {
        human: bool,
        reply: oneshot::Sender<BuilderResponse>,
    },
    RebuildPackage {
        dirname: String,
        clean: bool,
        reply: oneshot::Sender<BuilderResponse>,
    },
    Clean {
        dirname: String,
        reply: oneshot::Sender<BuilderResponse>,
    },
    CleanAll {
        reply: oneshot::Sender<BuilderResponse>,
    },
    ForceUpload {
        dirname: String,
        overwrite: bool,
        reply: oneshot::Sender<BuilderResponse>,
    },
    Getup {
        reply: oneshot::Sender<BuilderResponse>,
    },
    Extras {
        action: String,
        pkgname: Option<String>,
        reply: oneshot::Sender<BuilderResponse>,
    },
}

impl Command {
    pub fn from_request(request: BuilderRequest, reply: oneshot::Sender<BuilderResponse>) -> Self {
        match request {
            BuilderRequest::Info { human } => Command::Info { human, reply },
            BuilderRequest::RebuildPackage { dirname, clean } => Command::RebuildPackage { dirname, clean, reply },
            BuilderRequest::Clean { dirname } => Command::Clean { dirname, reply },
            BuilderRequest::CleanAll => Command::CleanAll { reply },
            BuilderRequest::ForceUpload { dirname, overwrite } => {
                Command::ForceUpload { dirname, overwrite, reply }
            }
            BuilderRequest::Getup => Command::Getup { reply },
            BuilderRequest::Extras { action, pkgname } => Command::Extras { action, pkgname, reply },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_package_request_carries_its_fields_through() {
        let (reply, _rx) = oneshot::channel();
        let command = Command::from_request(
            BuilderRequest::RebuildPackage { dirname: "foo".to_string(), clean: true },
            reply,
        );
        match command {
            Command::RebuildPackage { dirname, clean, .. } => {
                assert_eq!(dirname, "foo");
                assert!(clean);
            }
            _ => panic!("wrong command variant"),
        }
    }

    #[test]
    fn extras_request_carries_optional_pkgname() {
        let (reply, _rx) = oneshot::channel();
        let command = Command::from_request(
            BuilderRequest::Extras { action: "clear".to_string(), pkgname: Some("bar".to_string()) },
            reply,
        );
        match command {
            Command::Extras { action, pkgname, .. } => {
                assert_eq!(action, "clear");
                assert_eq!(pkgname.as_deref(), Some("bar"));
            }
            _ => panic!("wrong command variant"),
        }
    }
}
