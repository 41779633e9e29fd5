use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::app::config::{self, LauncherSettings};
use crate::app::events::NoticeSender;
use crate::app::models::{ListType, MainFile};

pub fn internal_main_file_path() -> PathBuf {
    config::config_dir().join("mainFile.json")
}

/// Damped move-toward-front: repeated raises promote an entry gradually
/// instead of jumping it straight to the top. The arithmetic is kept exactly
/// as shipped for on-disk order compatibility.
pub fn raised_index(index: usize) -> usize {
    index * 2 / 3
}

fn raise_in_place(list: &mut Vec<String>, package: &str) -> bool {
    let Some(old_index) = list.iter().position(|entry| entry == package) else {
        return false;
    };
    if old_index == 0 {
        // Already first; signal the no-op so the caller skips the rewrite.
        return false;
    }
    list.retain(|entry| entry != package);
    list.insert(raised_index(old_index), package.to_string());
    true
}

/// The package document on disk. All mutations are whole-file
/// read-modify-rewrite; a failed write leaves the previous content intact.
/// Concurrent external writers are last-writer-wins by design; in-process
/// callers serialize through the scheduler's document lock.
pub struct Datasource {
    path: PathBuf,
    internal: bool,
    notices: NoticeSender,
}

impl Datasource {
    pub fn from_settings(settings: &LauncherSettings, notices: NoticeSender) -> Self {
        if settings.uses_internal_file() {
            Self::internal_at(internal_main_file_path(), notices)
        } else {
            Self::external_at(PathBuf::from(settings.launchable_apps_file.trim()), notices)
        }
    }

    /// App-private document, created lazily on first read.
    pub fn internal_at(path: PathBuf, notices: NoticeSender) -> Self {
        Self {
            path,
            internal: true,
            notices,
        }
    }

    /// User-chosen document; must already exist.
    pub fn external_at(path: PathBuf, notices: NoticeSender) -> Self {
        Self {
            path,
            internal: false,
            notices,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Soft read: any failure surfaces as a notice and an empty list.
    pub fn load(&self, list_type: ListType, trace_id: &str) -> Vec<String> {
        match self.read_document(trace_id) {
            Some(doc) => doc.list(list_type).to_vec(),
            None => {
                self.notices.error(trace_id, "Couldn't load the app list");
                Vec::new()
            }
        }
    }

    /// Append in input order, duplicates and all.
    pub fn add_packages(&self, list_type: ListType, packages: &[String], trace_id: &str) -> bool {
        let Some(mut doc) = self.read_document(trace_id) else {
            return false;
        };
        doc.list_mut(list_type).extend(packages.iter().cloned());
        self.write_document(&doc, trace_id)
    }

    /// Remove every occurrence of `package`; false (and no write) when it is
    /// not present.
    pub fn remove_package(&self, list_type: ListType, package: &str, trace_id: &str) -> bool {
        let Some(mut doc) = self.read_document(trace_id) else {
            return false;
        };
        if !doc.list(list_type).iter().any(|entry| entry == package) {
            return false;
        }
        doc.list_mut(list_type).retain(|entry| entry != package);
        self.write_document(&doc, trace_id)
    }

    /// Bubble `package` toward the front. False when absent or already
    /// first, leaving the document untouched.
    pub fn raise_package(&self, list_type: ListType, package: &str, trace_id: &str) -> bool {
        let Some(mut doc) = self.read_document(trace_id) else {
            return false;
        };
        if !raise_in_place(doc.list_mut(list_type), package) {
            return false;
        }
        self.write_document(&doc, trace_id)
    }

    fn read_document(&self, trace_id: &str) -> Option<MainFile> {
        if self.internal && !self.path.exists() {
            debug!(trace_id = %trace_id, path = %self.path.display(), "creating internal document");
            if !self.write_document(&MainFile::empty(), trace_id) {
                return None;
            }
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(trace_id = %trace_id, path = %self.path.display(), error = %err, "document read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(trace_id = %trace_id, path = %self.path.display(), error = %err, "document parse failed");
                None
            }
        }
    }

    fn write_document(&self, doc: &MainFile, trace_id: &str) -> bool {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let payload = match serde_json::to_string_pretty(doc) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "document serialize failed");
                return false;
            }
        };
        match fs::write(&self.path, payload) {
            Ok(()) => true,
            Err(err) => {
                warn!(trace_id = %trace_id, path = %self.path.display(), error = %err, "document write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::{notice_channel, Severity};

    fn store_with(doc: &MainFile) -> (Datasource, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mainFile.json");
        fs::write(&path, serde_json::to_string_pretty(doc).expect("serialize")).expect("seed");
        let (notices, _rx) = notice_channel();
        (Datasource::external_at(path, notices), dir)
    }

    fn doc_of(names: &[&str]) -> MainFile {
        MainFile {
            packages: names.iter().map(|name| name.to_string()).collect(),
            long_term_packages: None,
        }
    }

    #[test]
    fn raise_uses_damped_promotion() {
        // i=3 -> floor(3*2/3)=2: [a,b,c,d] raise d -> [a,b,d,c]
        let (store, _dir) = store_with(&doc_of(&["a.a", "b.b", "c.c", "d.d"]));
        assert!(store.raise_package(ListType::Main, "d.d", "t"));
        assert_eq!(
            store.load(ListType::Main, "t"),
            ["a.a", "b.b", "d.d", "c.c"]
        );
    }

    #[test]
    fn raise_from_low_indexes() {
        // i=1 -> 0 and i=2 -> 1.
        let (store, _dir) = store_with(&doc_of(&["a.a", "b.b", "c.c"]));
        assert!(store.raise_package(ListType::Main, "b.b", "t"));
        assert_eq!(store.load(ListType::Main, "t"), ["b.b", "a.a", "c.c"]);

        let (store, _dir) = store_with(&doc_of(&["a.a", "b.b", "c.c"]));
        assert!(store.raise_package(ListType::Main, "c.c", "t"));
        assert_eq!(store.load(ListType::Main, "t"), ["a.a", "c.c", "b.b"]);
    }

    #[test]
    fn raise_of_first_or_absent_is_a_noop() {
        let (store, _dir) = store_with(&doc_of(&["a.a", "b.b"]));
        let before = fs::read(store.path()).expect("read");

        assert!(!store.raise_package(ListType::Main, "a.a", "t"));
        assert!(!store.raise_package(ListType::Main, "ghost.app", "t"));

        let after = fs::read(store.path()).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn remove_absent_is_a_noop() {
        let (store, _dir) = store_with(&doc_of(&["a.a", "b.b"]));
        let before = fs::read(store.path()).expect("read");
        assert!(!store.remove_package(ListType::Main, "ghost.app", "t"));
        assert_eq!(before, fs::read(store.path()).expect("read"));
    }

    #[test]
    fn remove_present_drops_exactly_that_entry() {
        let (store, _dir) = store_with(&doc_of(&["a.a", "b.b", "c.c"]));
        assert!(store.remove_package(ListType::Main, "b.b", "t"));
        assert_eq!(store.load(ListType::Main, "t"), ["a.a", "c.c"]);
    }

    #[test]
    fn add_appends_in_input_order_without_dedup() {
        let (store, _dir) = store_with(&doc_of(&["a.a"]));
        assert!(store.add_packages(
            ListType::Main,
            &["b.b".to_string(), "a.a".to_string()],
            "t"
        ));
        assert_eq!(store.load(ListType::Main, "t"), ["a.a", "b.b", "a.a"]);
    }

    #[test]
    fn long_term_mutations_keep_primary_list_untouched() {
        let mut doc = doc_of(&["a.a"]);
        doc.long_term_packages = Some(vec!["x.x".to_string(), "y.y".to_string()]);
        let (store, _dir) = store_with(&doc);

        assert!(store.add_packages(ListType::LongTerm, &["z.z".to_string()], "t"));
        assert!(store.raise_package(ListType::LongTerm, "y.y", "t"));

        assert_eq!(store.load(ListType::Main, "t"), ["a.a"]);
        assert_eq!(store.load(ListType::LongTerm, "t"), ["y.y", "x.x", "z.z"]);
    }

    #[test]
    fn null_long_term_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mainFile.json");
        fs::write(&path, r#"{"packages":["a.a"],"longTermPackages":null}"#).expect("seed");
        let (notices, _rx) = notice_channel();
        let store = Datasource::external_at(path, notices);
        assert!(store.load(ListType::LongTerm, "t").is_empty());
    }

    #[test]
    fn internal_document_is_created_lazily() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("mainFile.json");
        let (notices, _rx) = notice_channel();
        let store = Datasource::internal_at(path.clone(), notices);

        assert!(store.load(ListType::Main, "t").is_empty());
        assert!(path.exists());

        let doc: MainFile =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(doc, MainFile::empty());
    }

    #[test]
    fn unreadable_document_loads_empty_with_error_notice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mainFile.json");
        fs::write(&path, "not json at all").expect("seed");
        let (notices, rx) = notice_channel();
        let store = Datasource::external_at(path, notices);

        assert!(store.load(ListType::Main, "trace-bad").is_empty());
        let notice = rx.try_recv().expect("notice");
        assert_eq!(notice.severity, Severity::Error);
        assert_eq!(notice.trace_id, "trace-bad");
    }

    #[test]
    fn missing_external_document_is_not_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mainFile.json");
        let (notices, _rx) = notice_channel();
        let store = Datasource::external_at(path.clone(), notices);

        assert!(!store.add_packages(ListType::Main, &["a.a".to_string()], "t"));
        assert!(!path.exists());
    }

    #[test]
    fn round_trip_preserves_document() {
        let mut doc = doc_of(&["a.a", "b.b"]);
        doc.long_term_packages = Some(vec!["x.x".to_string()]);
        let (store, _dir) = store_with(&doc);

        let raw = fs::read_to_string(store.path()).expect("read");
        let reread: MainFile = serde_json::from_str(&raw).expect("parse");
        assert_eq!(reread, doc);
    }
}
