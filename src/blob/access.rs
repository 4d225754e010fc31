//! Template functions backed by a blob store.

use std::path::Path;
use std::sync::Arc;
use minijinja::{Environment, Error, ErrorKind};

use crate::blob::{BlobError, BlobStore, BlobSubscription};
use crate::content::render_markdown;

fn engine_error(err: BlobError) -> Error {
    let kind = if err.is_transient() {
        ErrorKind::InvalidOperation
    } else {
        ErrorKind::UndefinedError
    };
    Error::new(kind, "blob lookup failed").with_source(err)
}

fn fetch(store: &dyn BlobStore, key: &str) -> Result<String, Error> {
    let bytes = store.get(key).map_err(engine_error)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Register `blob(key)` and `mdBlob(key)` and subscribe `folder` to the store.
///
/// The returned subscription must live exactly as long as the environment.
pub fn register_blob_access(
    env: &mut Environment<'static>,
    store: Arc<dyn BlobStore>,
    folder: &Path,
) -> BlobSubscription {
    let subscription = BlobSubscription::new(store.clone(), folder);

    let plain = store.clone();
    env.add_function("blob", move |key: String| fetch(plain.as_ref(), &key));

    let markdown = store;
    env.add_function("mdBlob", move |key: String| {
        fetch(markdown.as_ref(), &key).map(|text| render_markdown(&text))
    });

    subscription
}

/// Find a [`BlobError`] anywhere in an error's source chain.
pub fn find_blob_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a BlobError> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(blob) = err.downcast_ref::<BlobError>() {
            return Some(blob);
        }
        current = err.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use minijinja::context;

    fn env_with(store: Arc<MemoryBlobStore>) -> (Environment<'static>, BlobSubscription) {
        let mut env = Environment::new();
        let sub = register_blob_access(&mut env, store, Path::new("site"));
        env.add_template("page", "[{{ blob(key) }}]").unwrap();
        env.add_template("md", "{{ mdBlob(key) }}").unwrap();
        (env, sub)
    }

    #[test]
    fn test_blob_function_reads_store() {
        let store = Arc::new(MemoryBlobStore::new());
        let key = store.put(b"cached");
        let (env, _sub) = env_with(store.clone());

        let out = env.get_template("page").unwrap().render(context! { key }).unwrap();
        assert_eq!(out, "[cached]");
        assert_eq!(store.subscribers(Path::new("site")), 1);
    }

    #[test]
    fn test_eviction_survives_the_engine() {
        let store = Arc::new(MemoryBlobStore::new());
        let key = store.put(b"*gone*");
        store.evict(&key);
        let (env, _sub) = env_with(store);

        let err = env.get_template("md").unwrap().render(context! { key }).unwrap_err();
        let blob = find_blob_error(&err).expect("blob error in chain");
        assert!(blob.is_transient());
    }

    #[test]
    fn test_missing_blob_is_permanent() {
        let store = Arc::new(MemoryBlobStore::new());
        let (env, _sub) = env_with(store);

        let err = env.get_template("page").unwrap().render(context! { key => "nope" }).unwrap_err();
        assert!(!find_blob_error(&err).unwrap().is_transient());
    }
}
