use crate::errors::{AdjustError, Result};
use crate::image_loader::EncodedImage;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

const URL_PREFIX: &str = "blob:adjust/";

/// Handle to an encoded image held by an [`AssetStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetUrl(String);

impl AssetUrl {
    fn generate() -> Self {
        Self(format!("{}{}", URL_PREFIX, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// In-memory registry of produced assets. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    assets: Arc<Mutex<HashMap<AssetUrl, Arc<EncodedImage>>>>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, image: EncodedImage) -> AssetUrl {
        let url = AssetUrl::generate();
        log::trace!("Registered {} ({} bytes, {})", url, image.bytes.len(), image.mime);
        self.lock().insert(url.clone(), Arc::new(image));
        url
    }

    pub fn get(&self, url: &AssetUrl) -> Option<Arc<EncodedImage>> {
        self.lock().get(url).cloned()
    }

    /// Release an asset; outstanding `Arc`s stay valid.
    pub fn revoke(&self, url: &AssetUrl) -> Result<()> {
        self.lock()
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| AdjustError::UnknownAsset { url: url.to_string() })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AssetUrl, Arc<EncodedImage>>> {
        // The map holds no invariants a panicking writer could break
        self.assets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(n: u8) -> EncodedImage {
        EncodedImage { mime: "image/png", width: 1, height: 1, bytes: vec![n; 4] }
    }

    #[test]
    fn test_register_and_get() {
        let store = AssetStore::new();
        let a = store.register(blob(1));
        let b = store.register(blob(2));

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("blob:adjust/"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a).unwrap().bytes, vec![1; 4]);
    }

    #[test]
    fn test_revoke() {
        let store = AssetStore::new();
        let url = store.register(blob(3));
        let held = store.get(&url).unwrap();

        store.revoke(&url).unwrap();
        assert!(store.get(&url).is_none());
        assert!(store.is_empty());
        assert_eq!(held.bytes[0], 3);
        assert_eq!(store.revoke(&url).unwrap_err().error_code(), "UNKNOWN_ASSET");
    }

    #[test]
    fn test_clones_share_storage() {
        let store = AssetStore::new();
        let other = store.clone();
        let url = other.register(blob(4));
        assert!(store.get(&url).is_some());
    }
}
