use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use refresher_core::{CatalogId, MetadataPair, MetadataSnapshot, RunSummary};
use refresher_engine::{
    Catalog, CatalogError, FetchError, FetchTranscript, MailError, MailSource, Plugin,
    PluginError, PluginHost, Refresher, RetryLedger, StoryFetcher,
};
use serde_json::json;
use tempfile::TempDir;

const ORIGINAL_CONTENT: &str = "chapters 1-3";
const MERGED_SUFFIX: &str = " + chapter 4";

struct Record {
    id: CatalogId,
    title: String,
    export_fails: bool,
}

#[derive(Default)]
struct FakeCatalog {
    records: HashMap<String, Record>,
    lookups: RefCell<Vec<String>>,
    writes: RefCell<Vec<(CatalogId, String)>>,
}

impl FakeCatalog {
    fn with_story(mut self, url: &str, id: CatalogId, title: &str) -> Self {
        self.records.insert(
            url.to_string(),
            Record {
                id,
                title: title.to_string(),
                export_fails: false,
            },
        );
        self
    }

    fn with_unexportable_story(mut self, url: &str, id: CatalogId) -> Self {
        self.records.insert(
            url.to_string(),
            Record {
                id,
                title: "Broken".to_string(),
                export_fails: true,
            },
        );
        self
    }

    fn record(&self, id: CatalogId) -> Option<&Record> {
        self.records.values().find(|record| record.id == id)
    }
}

impl Catalog for FakeCatalog {
    fn find_by_url(&self, url: &str) -> Result<Option<CatalogId>, CatalogError> {
        self.lookups.borrow_mut().push(url.to_string());
        Ok(self.records.get(url).map(|record| record.id))
    }

    fn metadata(&self, id: CatalogId) -> Result<MetadataSnapshot, CatalogError> {
        let record = self.record(id).ok_or(CatalogError::NoSuchRecord(id))?;
        let written = self.writes.borrow().iter().filter(|(w, _)| *w == id).count();
        let fields = json!({
            "id": id,
            "title": record.title,
            "authors": "Some Author",
            "size": 100 + written,
        });
        Ok(MetadataSnapshot::from_fields(
            fields.as_object().cloned().unwrap_or_default(),
        ))
    }

    fn export_content(&self, id: CatalogId, scratch_dir: &Path) -> Result<PathBuf, CatalogError> {
        let record = self.record(id).ok_or(CatalogError::NoSuchRecord(id))?;
        if record.export_fails {
            return Err(CatalogError::FormatMissing { id, format: "epub" });
        }
        let path = scratch_dir.join(format!("{id}.epub"));
        fs::write(&path, ORIGINAL_CONTENT)?;
        Ok(path)
    }

    fn replace_content(&self, id: CatalogId, content: &Path) -> Result<(), CatalogError> {
        let text = fs::read_to_string(content)?;
        self.writes.borrow_mut().push((id, text));
        Ok(())
    }
}

/// Replies per exported file name; unlisted files get a clean, marker-free run.
#[derive(Default)]
struct FakeFetcher {
    replies: HashMap<String, String>,
}

impl FakeFetcher {
    fn replying(mut self, file_name: &str, text: &str) -> Self {
        self.replies.insert(file_name.to_string(), text.to_string());
        self
    }
}

impl StoryFetcher for FakeFetcher {
    fn update_in_place(&self, content: &Path) -> Result<FetchTranscript, FetchError> {
        let name = content
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(text) = self.replies.get(&name) {
            return Ok(FetchTranscript {
                text: text.clone(),
                exit_ok: true,
            });
        }
        let mut merged = fs::read_to_string(content).map_err(|source| FetchError::Spawn {
            program: "fake".into(),
            source,
        })?;
        merged.push_str(MERGED_SUFFIX);
        fs::write(content, merged).map_err(|source| FetchError::Spawn {
            program: "fake".into(),
            source,
        })?;
        Ok(FetchTranscript {
            text: "Do update - epub(4) vs source(4)\nSuccessfully updated".to_string(),
            exit_ok: true,
        })
    }
}

struct FakeMail {
    urls: Option<Vec<String>>,
}

impl FakeMail {
    fn with(urls: &[&str]) -> Self {
        Self {
            urls: Some(urls.iter().map(|u| u.to_string()).collect()),
        }
    }

    fn failing() -> Self {
        Self { urls: None }
    }
}

impl MailSource for FakeMail {
    fn updated_story_urls(&mut self) -> Result<Vec<String>, MailError> {
        match &self.urls {
            Some(urls) => Ok(urls.clone()),
            None => Err(MailError::Imap(imap::error::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mail server down",
            )))),
        }
    }
}

type CallLog = Rc<RefCell<Vec<Vec<MetadataPair>>>>;

struct RecordingPlugin {
    calls: CallLog,
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        "recording"
    }

    fn post_add_hook(&mut self, updates: &[MetadataPair]) -> Result<(), PluginError> {
        self.calls.borrow_mut().push(updates.to_vec());
        Ok(())
    }
}

struct FailingPlugin;

impl Plugin for FailingPlugin {
    fn name(&self) -> &str {
        "failing"
    }

    fn post_add_hook(&mut self, _updates: &[MetadataPair]) -> Result<(), PluginError> {
        Err(PluginError::Hook {
            name: "failing".into(),
            message: "refused".into(),
        })
    }
}

struct PanickingPlugin;

impl Plugin for PanickingPlugin {
    fn name(&self) -> &str {
        "panicking"
    }

    fn post_add_hook(&mut self, _updates: &[MetadataPair]) -> Result<(), PluginError> {
        panic!("plugin bug");
    }
}

struct Harness {
    _temp: TempDir,
    scratch: PathBuf,
    ledger: RetryLedger,
}

impl Harness {
    fn new() -> Self {
        refresher_logging::initialize_for_tests();
        let temp = TempDir::new().unwrap();
        let scratch = temp.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        let ledger = RetryLedger::new(temp.path().join("retry.txt"));
        Self {
            _temp: temp,
            scratch,
            ledger,
        }
    }

    fn run(
        &self,
        catalog: &FakeCatalog,
        fetcher: &FakeFetcher,
        plugins: PluginHost,
        mail: &mut FakeMail,
    ) -> RunSummary {
        Refresher::new(catalog, fetcher, &self.ledger, &self.scratch)
            .with_plugins(plugins)
            .run(mail)
    }

    fn ledger_contents(&self) -> Option<String> {
        fs::read_to_string(self.ledger.path()).ok()
    }
}

fn recording_host() -> (PluginHost, CallLog) {
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut host = PluginHost::new();
    host.add(Box::new(RecordingPlugin {
        calls: calls.clone(),
    }));
    (host, calls)
}

#[test]
fn empty_runs_are_idempotent() {
    let harness = Harness::new();
    let catalog = FakeCatalog::default().with_story("https://site/s/1", 1, "One");
    let fetcher = FakeFetcher::default();

    for _ in 0..2 {
        let (host, calls) = recording_host();
        let summary = harness.run(&catalog, &fetcher, host, &mut FakeMail::with(&[]));
        assert_eq!((summary.succeeded, summary.attempted), (0, 0));
        assert_eq!(summary.to_string(), "0/0");
        assert!(calls.borrow().is_empty());
    }
    assert!(catalog.lookups.borrow().is_empty());
    assert!(catalog.writes.borrow().is_empty());
    assert_eq!(harness.ledger_contents(), None);
}

#[test]
fn story_missing_from_catalog_is_skipped() {
    let harness = Harness::new();
    let catalog = FakeCatalog::default();
    let fetcher = FakeFetcher::default();
    let (host, calls) = recording_host();

    let summary = harness.run(
        &catalog,
        &fetcher,
        host,
        &mut FakeMail::with(&["https://site/s/404/2/"]),
    );

    assert_eq!(summary.to_string(), "0/1");
    assert_eq!(*catalog.lookups.borrow(), vec!["https://site/s/404".to_string()]);
    assert_eq!(harness.ledger_contents(), None);
    assert!(calls.borrow().is_empty());
}

#[test]
fn story_without_new_chapters_is_deferred() {
    let harness = Harness::new();
    let catalog = FakeCatalog::default().with_story("https://site/s/5", 5, "Five");
    let fetcher = FakeFetcher::default().replying("5.epub", "5.epub already contains 3 chapters.");
    let (host, calls) = recording_host();

    let summary = harness.run(
        &catalog,
        &fetcher,
        host,
        &mut FakeMail::with(&["https://site/s/5/3/"]),
    );

    assert_eq!(summary.to_string(), "0/1");
    assert_eq!(summary.deferred, 1);
    assert_eq!(
        harness.ledger_contents().as_deref(),
        Some("https://site/s/5\n")
    );
    assert!(catalog.writes.borrow().is_empty());
    assert!(calls.borrow().is_empty());
}

#[test]
fn clean_fetch_writes_back_and_runs_hooks_once() {
    let harness = Harness::new();
    let catalog = FakeCatalog::default().with_story("https://site/s/8", 8, "Eight");
    let fetcher = FakeFetcher::default();
    let (host, calls) = recording_host();

    let summary = harness.run(
        &catalog,
        &fetcher,
        host,
        &mut FakeMail::with(&["https://site/s/8/4/Eight"]),
    );

    assert_eq!(summary.to_string(), "1/1");
    assert_eq!(
        *catalog.writes.borrow(),
        vec![(8, format!("{ORIGINAL_CONTENT}{MERGED_SUFFIX}"))]
    );

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    let pair = &calls[0][0];
    assert_eq!(pair.old.title(), "Eight");
    assert_eq!(pair.new.title(), "Eight");
    assert_eq!(pair.changed_fields(), vec!["size".to_string()]);
    assert_eq!(harness.ledger_contents(), None);
}

#[test]
fn retry_entries_run_before_mail_and_are_not_requeued_once_resolved() {
    let harness = Harness::new();
    harness.ledger.append("https://site/s/1").unwrap();
    let catalog = FakeCatalog::default()
        .with_story("https://site/s/1", 1, "One")
        .with_story("https://site/s/2", 2, "Two");
    let fetcher = FakeFetcher::default();
    let (host, calls) = recording_host();

    let summary = harness.run(
        &catalog,
        &fetcher,
        host,
        &mut FakeMail::with(&["https://site/s/2/9/"]),
    );

    assert_eq!(summary.to_string(), "2/2");
    assert_eq!(
        *catalog.lookups.borrow(),
        vec!["https://site/s/1".to_string(), "https://site/s/2".to_string()]
    );
    assert_eq!(harness.ledger_contents(), None);
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(calls.borrow()[0].len(), 2);
}

#[test]
fn mail_failure_still_drains_the_ledger() {
    let harness = Harness::new();
    harness.ledger.append("https://site/s/3").unwrap();
    let catalog = FakeCatalog::default().with_story("https://site/s/3", 3, "Three");
    let fetcher = FakeFetcher::default().replying("3.epub", "already contains 7 chapters");

    let summary = harness.run(&catalog, &fetcher, PluginHost::new(), &mut FakeMail::failing());

    assert_eq!(summary.to_string(), "0/1");
    // Deferred again, so it is the only entry for the next run.
    assert_eq!(
        harness.ledger_contents().as_deref(),
        Some("https://site/s/3\n")
    );
}

#[test]
fn export_failure_skips_only_that_story() {
    let harness = Harness::new();
    let catalog = FakeCatalog::default()
        .with_unexportable_story("https://site/s/6", 6)
        .with_story("https://site/s/7", 7, "Seven");
    let fetcher = FakeFetcher::default();

    let summary = harness.run(
        &catalog,
        &fetcher,
        PluginHost::new(),
        &mut FakeMail::with(&["https://site/s/6/1", "https://site/s/7/1"]),
    );

    assert_eq!(summary.to_string(), "1/2");
    assert_eq!(catalog.writes.borrow().len(), 1);
    assert_eq!(catalog.writes.borrow()[0].0, 7);
}

#[test]
fn warning_outcomes_skip_without_requeue() {
    let harness = Harness::new();
    let catalog = FakeCatalog::default()
        .with_story("https://site/s/1", 1, "One")
        .with_story("https://site/s/2", 2, "Two");
    let fetcher = FakeFetcher::default()
        .replying("1.epub", "1.epub has 9 chapters, more than source: 8")
        .replying("2.epub", "No story url found in epub to update.");

    let summary = harness.run(
        &catalog,
        &fetcher,
        PluginHost::new(),
        &mut FakeMail::with(&["https://site/s/1", "https://site/s/2"]),
    );

    assert_eq!(summary.to_string(), "0/2");
    assert_eq!(summary.deferred, 0);
    assert!(catalog.writes.borrow().is_empty());
    assert_eq!(harness.ledger_contents(), None);
}

#[test]
fn failing_plugins_do_not_stop_the_others() {
    let harness = Harness::new();
    let catalog = FakeCatalog::default().with_story("https://site/s/8", 8, "Eight");
    let fetcher = FakeFetcher::default();
    let calls: CallLog = Rc::new(RefCell::new(Vec::new()));
    let mut host = PluginHost::new();
    host.add(Box::new(FailingPlugin));
    host.add(Box::new(PanickingPlugin));
    host.add(Box::new(RecordingPlugin {
        calls: calls.clone(),
    }));

    let summary = harness.run(
        &catalog,
        &fetcher,
        host,
        &mut FakeMail::with(&["https://site/s/8"]),
    );

    assert_eq!(summary.to_string(), "1/1");
    assert_eq!(summary.hook_failures, 2);
    assert_eq!(calls.borrow().len(), 1);
}

#[test]
fn scratch_directory_is_emptied_after_each_story() {
    let harness = Harness::new();
    let catalog = FakeCatalog::default()
        .with_story("https://site/s/1", 1, "One")
        .with_story("https://site/s/2", 2, "Two");
    let fetcher = FakeFetcher::default().replying("2.epub", "already contains");

    harness.run(
        &catalog,
        &fetcher,
        PluginHost::new(),
        &mut FakeMail::with(&["https://site/s/1", "https://site/s/2"]),
    );

    assert_eq!(fs::read_dir(&harness.scratch).unwrap().count(), 0);
}
