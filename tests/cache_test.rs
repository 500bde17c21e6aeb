use std::sync::Arc;

use futures_util::future::join_all;
use scaffold::cache::{is_file_reference, ResourceCache};
use tempfile::TempDir;
use test_log::test;

#[test(tokio::test)]
async fn test_concurrent_loads_resolve_once() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("page.html");
    std::fs::write(&path, "<p>Hello</p>").unwrap();
    let identifier = path.to_str().unwrap().to_string();
    assert!(is_file_reference(&identifier));

    let cache = ResourceCache::new();
    let loads = (0..8).map(|_| cache.load(&identifier));
    let results = join_all(loads).await;

    assert_eq!(cache.resolutions(), 1);
    assert!(results.iter().all(|text| &**text == "<p>Hello</p>"));
    assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));

    let late = cache.load(&identifier).await;
    assert!(Arc::ptr_eq(&late, &results[0]));
    assert_eq!(cache.resolutions(), 1);
}

#[test(tokio::test)]
async fn test_literal_markup_resolves_to_itself() {
    let cache = ResourceCache::new();
    let markup = "<p class=\"x\">literal</p>";

    assert_eq!(&*cache.load(markup).await, markup);
    assert_eq!(&*cache.load(markup).await, markup);
    assert_eq!(cache.resolutions(), 1);
    assert_eq!(cache.len(), 1);
}

#[test(tokio::test)]
async fn test_unreadable_file_falls_back_to_identifier() {
    let cache = ResourceCache::new();
    let identifier = "does/not/exist.html";

    let results = join_all([cache.load(identifier), cache.load(identifier)]).await;
    assert!(results.iter().all(|text| &**text == identifier));
    assert_eq!(cache.resolutions(), 1);
}

#[test(tokio::test)]
async fn test_clones_share_entries() {
    let cache = ResourceCache::new();
    let clone = cache.clone();

    clone.load("<a/>").await;
    cache.load("<a/>").await;
    assert_eq!(cache.resolutions(), 1);
    assert!(!cache.is_empty());
}
