//! In-memory collaborators and archive builders shared by unit tests.

use crate::error::{Error, Result};
use crate::github::ReleaseClient;
use crate::privilege::Escalator;
use crate::prompt::Confirm;
use crate::tool_id::RepoId;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io::{Cursor, Write};
use std::path::Path;
use std::rc::Rc;

pub fn release_url(repo: &str, tag: &str, asset: &str) -> String {
    format!("https://example.com/{}/releases/download/{}/{}", repo, tag, asset)
}

#[derive(Default)]
pub struct FakeClient {
    releases: RefCell<HashMap<String, Value>>,
    archives: RefCell<HashMap<String, Vec<u8>>>,
    api_calls: Cell<usize>,
    download_calls: Cell<usize>,
}

impl FakeClient {
    pub fn set_release(&self, repo: &str, tag: &str, assets: &[&str]) {
        let assets: Vec<Value> = assets
            .iter()
            .map(|name| json!({"name": name, "browser_download_url": release_url(repo, tag, name)}))
            .collect();
        self.releases
            .borrow_mut()
            .insert(repo.to_string(), json!({"tag_name": tag, "assets": assets}));
    }

    pub fn set_archive(&self, url: &str, bytes: Vec<u8>) {
        self.archives.borrow_mut().insert(url.to_string(), bytes);
    }

    /// Publish a release with a single asset served with `bytes`.
    pub fn publish(&self, repo: &str, tag: &str, asset: &str, bytes: Vec<u8>) {
        self.set_release(repo, tag, &[asset]);
        self.set_archive(&release_url(repo, tag, asset), bytes);
    }

    pub fn api_calls(&self) -> usize {
        self.api_calls.get()
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.get()
    }
}

impl ReleaseClient for FakeClient {
    async fn latest_release(&self, repo: &RepoId) -> Result<Value> {
        self.api_calls.set(self.api_calls.get() + 1);
        self.releases
            .borrow()
            .get(&repo.full_repo())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no releases found for {}", repo)))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.download_calls.set(self.download_calls.get() + 1);
        let bytes = self
            .archives
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::network(url, "404 Not Found"))?;
        std::fs::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// Records every escalated command instead of running it.
#[derive(Default)]
pub struct RecordingEscalator {
    commands: RefCell<Vec<Vec<String>>>,
    fail: bool,
}

impl RecordingEscalator {
    pub fn failing() -> Self {
        Self {
            commands: RefCell::default(),
            fail: true,
        }
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.borrow().clone()
    }
}

impl Escalator for RecordingEscalator {
    fn run(&self, argv: &[OsString]) -> Result<()> {
        self.commands.borrow_mut().push(
            argv.iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        );
        if self.fail {
            return Err(Error::Permission("escalation refused".to_string()));
        }
        Ok(())
    }

    fn probe(&self) -> bool {
        !self.fail
    }
}

/// Answers confirmations from a script, then with `fallback`.
pub struct ScriptedConfirm {
    answers: RefCell<VecDeque<bool>>,
    fallback: bool,
    questions: RefCell<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool], fallback: bool) -> Self {
        Self {
            answers: RefCell::new(answers.iter().copied().collect()),
            fallback,
            questions: RefCell::default(),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, question: &str) -> bool {
        self.questions.borrow_mut().push(question.to_string());
        self.answers.borrow_mut().pop_front().unwrap_or(self.fallback)
    }
}

impl Confirm for Rc<ScriptedConfirm> {
    fn confirm(&self, question: &str) -> bool {
        self.as_ref().confirm(question)
    }
}

/// Gzip-compressed tar holding executable regular files.
pub fn tar_gz_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Zip holding executable regular files. Names are stored verbatim.
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default().unix_permissions(0o755);
    for (path, content) in files {
        writer.start_file(*path, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
