//! Process-wide memoization of expensive plan objects.
//!
//! DFT plans are costly to build and freely shareable once built, so they
//! are cached for the lifetime of the process under string keys composed
//! from the plan kind, precision, direction and length. The cache holds one
//! strong reference; callers hold their own. Nothing is evicted within a
//! process run.
//!
//! Two threads racing on a missing key may both construct the value; the
//! later insert wins and the earlier value lives on with its holders. This
//! keeps construction outside the lock.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

type Store = Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>;

fn store() -> &'static Store {
    static STORE: OnceLock<Store> = OnceLock::new();
    STORE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Looks up a cached value of type `T` under `key`.
pub fn get<T: Send + Sync + 'static>(key: &str) -> Option<Arc<T>> {
    let map = store().lock().unwrap();
    map.get(key)
        .cloned()
        .and_then(|any| any.downcast::<T>().ok())
}

/// Inserts a value under `key`, replacing any previous entry.
pub fn insert<T: Send + Sync + 'static>(key: String, value: Arc<T>) {
    let mut map = store().lock().unwrap();
    map.insert(key, value);
}

/// Returns the cached value under `key`, building it with `build` on a miss.
///
/// `build` runs outside the cache lock.
pub fn get_or_insert_with<T, F>(key: &str, build: F) -> Arc<T>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Arc<T>,
{
    if let Some(hit) = get::<T>(key) {
        return hit;
    }
    let value = build();
    insert(key.to_owned(), Arc::clone(&value));
    value
}
