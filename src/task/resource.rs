// src/task/resource.rs

//! Opaque byte payloads attached to tasks (public keys, user data).
//!
//! A [`ResourceHolder`] is a leaf for dependency discovery and is compared by
//! identity, never by content. Its bytes are materialized at most once.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context as _;

use crate::dag::{Walk, Walker};
use crate::fs::FileSystem;

/// Source of bytes behind a holder.
pub trait Resource: Send + Sync + fmt::Debug {
    fn open(&self) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct StringResource(pub String);

impl Resource for StringResource {
    fn open(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.0.clone().into_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct BytesResource(pub Vec<u8>);

impl Resource for BytesResource {
    fn open(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Bytes read from a file on first use.
#[derive(Debug, Clone)]
pub struct FileResource {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl FileResource {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }
}

impl Resource for FileResource {
    fn open(&self) -> anyhow::Result<Vec<u8>> {
        self.fs
            .read(&self.path)
            .with_context(|| format!("reading resource {:?}", self.path))
    }
}

struct Holder {
    resource: Box<dyn Resource>,
    cache: Mutex<Option<Arc<[u8]>>>,
}

/// Named, lazily materialized byte payload.
#[derive(Clone)]
pub struct ResourceHolder {
    name: String,
    inner: Arc<Holder>,
}

impl ResourceHolder {
    pub fn new(name: impl Into<String>, resource: impl Resource + 'static) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Holder {
                resource: Box::new(resource),
                cache: Mutex::new(None),
            }),
        }
    }

    pub fn from_string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, StringResource(value.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Materialize the payload, reading the underlying resource on first use
    /// only.
    pub fn as_bytes(&self) -> anyhow::Result<Arc<[u8]>> {
        let mut cache = self
            .inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(bytes) = cache.as_ref() {
            return Ok(bytes.clone());
        }
        let bytes: Arc<[u8]> = self
            .inner
            .resource
            .open()
            .with_context(|| format!("materializing resource {:?}", self.name))?
            .into();
        *cache = Some(bytes.clone());
        Ok(bytes)
    }

    pub fn as_string(&self) -> anyhow::Result<String> {
        let bytes = self.as_bytes()?;
        String::from_utf8(bytes.to_vec())
            .with_context(|| format!("resource {:?} is not valid UTF-8", self.name))
    }

    pub fn is_materialized(&self) -> bool {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Hex blake3 digest of the payload.
    pub fn fingerprint(&self) -> anyhow::Result<String> {
        Ok(blake3::hash(&self.as_bytes()?).to_hex().to_string())
    }
}

impl PartialEq for ResourceHolder {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ResourceHolder {}

impl fmt::Debug for ResourceHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHolder")
            .field("name", &self.name)
            .field("resource", &self.inner.resource)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

// Payloads never contain task references.
impl Walk for ResourceHolder {
    fn walk(&self, _walker: &mut Walker) {}
}
