// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The internal command the control-server listener hands to the single
//! integration loop. Mirrors `RepoRequest` one-to-one but carries a
//! `oneshot::Sender` reply channel instead of living on the wire.

use packhouse_protocol::{RepoRequest, RepoResponse};
use tokio::sync::oneshot;

pub enum Command {
    Clean {
        reply: oneshot::Sender<RepoResponse>,
    },
    Regenerate {
        archs: Option<Vec<String>>,
        reply: oneshot::Sender<RepoResponse>,
    },
    Remove {
        names: Vec<String>,
        archs: Option<Vec<String>>,
        reply: oneshot::Sender<RepoResponse>,
    },
    Update {
        overwrite: bool,
        reply: oneshot::Sender<RepoResponse>,
    },
    PushStart {
        filenames: Vec<String>,
        sizes: Vec<u64>,
        reply: oneshot::Sender<RepoResponse>,
    },
    PushAddTime {
        name: String,
        extra: f64,
        reply: oneshot::Sender<RepoResponse>,
    },
    PushDone {
        filenames: Vec<String>,
        overwrite: bool,
        reply: oneshot::Sender<RepoResponse>,
    },
    PushFail {
        name: String,
        reply: oneshot::Sender<RepoResponse>,
    },
}

impl Command {
    pub fn from_request(request: RepoRequest, reply: oneshot::Sender<RepoResponse>) -> Self {
        match request {
            RepoRequest::Clean => Command::Clean { reply },
            RepoRequest::Regenerate { archs } => Command::Regenerate { archs, reply },
            RepoRequest::Remove { names, archs } => Command::Remove { names, archs, reply },
            RepoRequest::Update { overwrite } => Command::Update { overwrite, reply },
            RepoRequest::PushStart { filenames, sizes } => Command::PushStart { filenames, sizes, reply },
            RepoRequest::PushAddTime { name, extra } => Command::PushAddTime { name, extra, reply },
            RepoRequest::PushDone { filenames, overwrite } => Command::PushDone { filenames, overwrite, reply },
            RepoRequest::PushFail { name } => Command::PushFail { name, reply },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_start_request_carries_filenames_and_sizes_through() {
        let (reply, _rx) = oneshot::channel();
        let command = Command::from_request(
            RepoRequest::PushStart {
                filenames: vec!["a.pkg".to_string(), "a.pkg.sig".to_string()],
                sizes: vec![100, 1],
            },
            reply,
        );
        match command {
            Command::PushStart { filenames, sizes, .. } => {
                assert_eq!(filenames, vec!["a.pkg".to_string(), "a.pkg.sig".to_string()]);
                assert_eq!(sizes, vec![100, 1]);
            }
            _ => panic!("wrong command variant"),
        }
    }

    #[test]
    fn remove_request_carries_optional_archs() {
        let (reply, _rx) = oneshot::channel();
        let command = Command::from_request(
            RepoRequest::Remove { names: vec!["foo".to_string()], archs: None },
            reply,
        );
        match command {
            Command::Remove { names, archs, .. } => {
                assert_eq!(names, vec!["foo".to_string()]);
                assert!(archs.is_none());
            }
            _ => panic!("wrong command variant"),
        }
    }
}
