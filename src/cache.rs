//! Resource cache for template sources.
//!
//! An identifier is either a path to a markup file or the markup itself. File
//! reads happen at most once per identifier for the lifetime of the cache:
//! callers arriving while a read is in flight join a pending queue and are
//! answered in arrival order, later callers get the stored text directly.
//! Nothing is ever evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use log::{debug, warn};
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::oneshot;

/// Path-safe characters followed by an extension ending in `ml`
static FILE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_./-]+\.[a-zA-Z]*ml$").expect("invalid file regex"));

/// Whether `identifier` names a markup file (`pages/index.html`) rather than
/// being literal markup.
pub fn is_file_reference(identifier: &str) -> bool {
    FILE_REFERENCE.is_match(identifier)
}

enum Entry {
    Pending(Vec<oneshot::Sender<Arc<str>>>),
    Resolved(Arc<str>),
}

#[derive(Default)]
struct CacheInner {
    entries: Mutex<HashMap<String, Entry>>,
    resolutions: AtomicUsize,
}

/// Process-wide store of resolved template sources. Clones share the same
/// entries.
#[derive(Clone, Default)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `identifier` to markup text.
    ///
    /// A file that cannot be read resolves to the identifier itself, so the
    /// caller always gets text back.
    pub async fn load(&self, identifier: &str) -> Arc<str> {
        let receiver = {
            let mut entries = self.inner.entries.lock();
            match entries.get_mut(identifier) {
                Some(Entry::Resolved(text)) => return Arc::clone(text),
                Some(Entry::Pending(queue)) => {
                    let (sender, receiver) = oneshot::channel();
                    queue.push(sender);
                    receiver
                }
                None if !is_file_reference(identifier) => {
                    self.inner.resolutions.fetch_add(1, Ordering::SeqCst);
                    let text: Arc<str> = Arc::from(identifier);
                    entries.insert(identifier.to_string(), Entry::Resolved(Arc::clone(&text)));
                    return text;
                }
                None => {
                    let (sender, receiver) = oneshot::channel();
                    entries.insert(identifier.to_string(), Entry::Pending(vec![sender]));
                    self.inner.resolutions.fetch_add(1, Ordering::SeqCst);

                    let inner = Arc::clone(&self.inner);
                    let path = identifier.to_string();
                    tokio::spawn(async move { inner.read(path).await });
                    receiver
                }
            }
        };

        receiver.await.unwrap_or_else(|_| Arc::from(identifier))
    }

    /// Number of underlying resolutions started so far.
    pub fn resolutions(&self) -> usize {
        self.inner.resolutions.load(Ordering::SeqCst)
    }

    /// Number of identifiers the cache knows about, pending or resolved.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheInner {
    async fn read(&self, path: String) {
        let text: Arc<str> = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!("Loaded template source from {}", path);
                Arc::from(content)
            }
            Err(e) => {
                warn!("Cannot read '{}' ({}), using it as literal markup", path, e);
                Arc::from(path.as_str())
            }
        };

        let waiting = {
            let mut entries = self.entries.lock();
            match entries.insert(path, Entry::Resolved(Arc::clone(&text))) {
                Some(Entry::Pending(queue)) => queue,
                _ => Vec::new(),
            }
        };

        for waiter in waiting {
            // A waiter that went away no longer needs the text.
            let _ = waiter.send(Arc::clone(&text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_file_reference() {
        assert!(is_file_reference("index.html"));
        assert!(is_file_reference("templates/page-1/layout_v2.xhtml"));
        assert!(is_file_reference("data.xml"));
        assert!(is_file_reference("notes.ml"));
        assert!(!is_file_reference("index.HTML"));
        assert!(!is_file_reference("style.css"));
        assert!(!is_file_reference("<p>index.html</p>"));
        assert!(!is_file_reference("my page.html"));
        assert!(!is_file_reference(".html"));
    }
}
