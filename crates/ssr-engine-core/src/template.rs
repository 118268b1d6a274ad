//! Shell template loading.
//!
//! [`TemplateLoader`] reads each template path once through a
//! [`TemplateSource`] and keeps the text for the lifetime of the loader.
//! Entries are never evicted or invalidated: a file changed on disk after
//! its first load keeps being served from the cache.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use ssr_engine_common::RenderError;

/// Where template text comes from.
pub trait TemplateSource: Send + Sync {
    /// Read the full template at `path`.
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Reads templates from the file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTemplateSource;

impl TemplateSource for FsTemplateSource {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Memoizing template loader, shared by every render of an engine.
pub struct TemplateLoader {
    cache: DashMap<PathBuf, Arc<str>>,
    source: Arc<dyn TemplateSource>,
}

impl TemplateLoader {
    /// Loader reading from the file system.
    pub fn new() -> Self {
        Self::with_source(FsTemplateSource)
    }

    /// Loader reading through a custom source.
    pub fn with_source(source: impl TemplateSource + 'static) -> Self {
        Self {
            cache: DashMap::new(),
            source: Arc::new(source),
        }
    }

    /// Return the template at `path`, reading it on first use.
    ///
    /// The read is synchronous. When two callers race on the first load of
    /// a path, the first inserted text wins and both receive it.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TemplateRead`] if the source cannot read the
    /// file. Failed reads are not cached.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<str>, RenderError> {
        let path = path.as_ref();

        if let Some(cached) = self.cache.get(path) {
            return Ok(Arc::clone(cached.value()));
        }

        let text: Arc<str> = self
            .source
            .read(path)
            .map_err(|e| RenderError::template_read(path.display().to_string(), e))?
            .into();

        debug!(path = %path.display(), bytes = text.len(), "Template loaded");

        let entry = self.cache.entry(path.to_path_buf()).or_insert(text);
        Ok(Arc::clone(entry.value()))
    }

    /// Check whether `path` has been loaded.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.cache.contains_key(path.as_ref())
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for TemplateLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateLoader")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        reads: Arc<AtomicUsize>,
    }

    impl TemplateSource for CountingSource {
        fn read(&self, path: &Path) -> io::Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("<!-- {} --><app-root></app-root>", path.display()))
        }
    }

    #[test]
    fn test_reads_each_path_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let loader = TemplateLoader::with_source(CountingSource {
            reads: Arc::clone(&reads),
        });

        let first = loader.load("/shell.html").unwrap();
        let second = loader.load("/shell.html").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        loader.load("/other.html").unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(loader.len(), 2);
    }

    #[test]
    fn test_file_changes_are_not_seen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<app-root></app-root>").unwrap();

        let loader = TemplateLoader::new();
        assert_eq!(&*loader.load(&path).unwrap(), "<app-root></app-root>");

        std::fs::write(&path, "<changed></changed>").unwrap();
        assert_eq!(&*loader.load(&path).unwrap(), "<app-root></app-root>");
    }

    #[test]
    fn test_missing_file() {
        let loader = TemplateLoader::new();
        let err = loader.load("/nonexistent/index.html").unwrap_err();

        assert!(err.is_template_not_found());
        assert!(!loader.contains("/nonexistent/index.html"));
        assert!(loader.is_empty());
    }
}
