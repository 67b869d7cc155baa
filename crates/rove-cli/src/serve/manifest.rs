//! In-memory snapshot of a build's output directory.

use axum::body::Bytes;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// One served file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub bytes: Bytes,
    pub content_type: &'static str,
    /// Hex blake3 digest prefix, unquoted
    pub etag: String,
}

impl OutputFile {
    pub fn new(path: &str, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let etag = blake3::hash(&bytes).to_hex()[..16].to_string();
        Self {
            content_type: content_type_for(path),
            bytes,
            etag,
        }
    }
}

/// Output files keyed by URL path (`/assets/app.js`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    files: BTreeMap<String, OutputFile>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Bytes>) {
        let path = path.into();
        let file = OutputFile::new(&path, bytes);
        self.files.insert(path, file);
    }

    pub fn get(&self, path: &str) -> Option<&OutputFile> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Total size of all files in bytes.
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.bytes.len() as u64).sum()
    }

    /// Paths that differ between `previous` and `self`.
    pub fn diff(&self, previous: &Manifest) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for (path, file) in &self.files {
            match previous.files.get(path) {
                None => changes.added.push(path.clone()),
                Some(old) if old.etag != file.etag => changes.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in previous.files.keys() {
            if !self.files.contains_key(path) {
                changes.removed.push(path.clone());
            }
        }

        changes
    }

    /// Read every file below `dir`.
    ///
    /// Blocking; call from `spawn_blocking` on the runtime.
    pub fn read_dir(dir: &Path) -> io::Result<Manifest> {
        let mut manifest = Manifest::new();

        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(dir)
                .map_err(io::Error::other)?;
            let url_path = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .fold(String::new(), |mut acc, part| {
                    acc.push('/');
                    acc.push_str(&part);
                    acc
                });

            let bytes = std::fs::read(entry.path())?;
            manifest.insert(url_path, bytes);
        }

        Ok(manifest)
    }
}

/// Output paths that changed between two manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Added and modified paths, the ones a client would fetch again.
    pub fn updated(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(String::as_str)
    }
}

/// Determine content type from file extension.
pub fn content_type_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" | "mjs" | "cjs" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_dir_uses_url_paths() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("assets")).unwrap();
        fs::write(temp.path().join("index.html"), "<html></html>").unwrap();
        fs::write(temp.path().join("assets/app.js"), "console.log(1)").unwrap();

        let manifest = Manifest::read_dir(temp.path()).unwrap();

        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains("/index.html"));
        let app = manifest.get("/assets/app.js").unwrap();
        assert_eq!(app.content_type, "text/javascript; charset=utf-8");
        assert_eq!(&app.bytes[..], b"console.log(1)");
    }

    #[test]
    fn test_etag_tracks_content() {
        let a = OutputFile::new("/a.js", "one");
        let b = OutputFile::new("/b.js", "one");
        let c = OutputFile::new("/a.js", "two");
        assert_eq!(a.etag, b.etag);
        assert_ne!(a.etag, c.etag);
    }

    #[test]
    fn test_diff() {
        let mut old = Manifest::new();
        old.insert("/index.html", "a");
        old.insert("/app.js", "a");
        old.insert("/old.css", "a");

        let mut new = Manifest::new();
        new.insert("/index.html", "a");
        new.insert("/app.js", "b");
        new.insert("/new.css", "a");

        let changes = new.diff(&old);
        assert_eq!(changes.added, vec!["/new.css"]);
        assert_eq!(changes.modified, vec!["/app.js"]);
        assert_eq!(changes.removed, vec!["/old.css"]);
        assert_eq!(changes.len(), 3);
        assert_eq!(changes.updated().collect::<Vec<_>>(), vec!["/new.css", "/app.js"]);
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let mut manifest = Manifest::new();
        manifest.insert("/index.html", "a");
        assert!(manifest.diff(&manifest.clone()).is_empty());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("/index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("/app.mjs"), "text/javascript; charset=utf-8");
        assert_eq!(content_type_for("/app.js.map"), "application/json");
        assert_eq!(content_type_for("/blob"), "application/octet-stream");
    }
}
