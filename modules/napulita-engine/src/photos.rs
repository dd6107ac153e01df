//! Photo reference capability. The core never reads photo bytes; it only asks
//! whether a reference exists and how to link to it.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use napulita_common::{NapulitaError, Result};

#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn confirm_exists(&self, photo_ref: &str) -> Result<bool>;

    fn public_url(&self, photo_ref: &str) -> String;
}

fn join_url(base: &str, photo_ref: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        photo_ref.trim_start_matches('/')
    )
}

// ---------------------------------------------------------------------------
// HttpPhotoStore (production, public storage bucket)
// ---------------------------------------------------------------------------

/// Confirms references with a HEAD request against a public bucket URL.
pub struct HttpPhotoStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPhotoStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NapulitaError::ResourceUnavailable(format!("photo client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PhotoStore for HttpPhotoStore {
    async fn confirm_exists(&self, photo_ref: &str) -> Result<bool> {
        let url = self.public_url(photo_ref);
        let resp = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| NapulitaError::ResourceUnavailable(format!("photo store: {e}")))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(NapulitaError::ResourceUnavailable(format!(
                "photo store answered {s}"
            ))),
        }
    }

    fn public_url(&self, photo_ref: &str) -> String {
        join_url(&self.base_url, photo_ref)
    }
}

// ---------------------------------------------------------------------------
// AcceptingPhotoStore (no bucket configured)
// ---------------------------------------------------------------------------

/// Accepts any non-blank reference. Used when no photo bucket is configured.
#[derive(Debug, Default)]
pub struct AcceptingPhotoStore {
    base_url: Option<String>,
}

impl AcceptingPhotoStore {
    pub fn new(base_url: Option<String>) -> Self {
        Self { base_url }
    }
}

#[async_trait]
impl PhotoStore for AcceptingPhotoStore {
    async fn confirm_exists(&self, photo_ref: &str) -> Result<bool> {
        Ok(!photo_ref.trim().is_empty())
    }

    fn public_url(&self, photo_ref: &str) -> String {
        match &self.base_url {
            Some(base) => join_url(base, photo_ref),
            None => photo_ref.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticPhotoStore (tests, fixed set of known references)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StaticPhotoStore {
    known: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    unreachable: bool,
}

impl StaticPhotoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_photos<I, S>(photos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for p in photos {
            store.add(p);
        }
        store
    }

    /// Every lookup sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every lookup fails as if the store were down.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn add(&self, photo_ref: impl Into<String>) {
        self.known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(photo_ref.into());
    }
}

#[async_trait]
impl PhotoStore for StaticPhotoStore {
    async fn confirm_exists(&self, photo_ref: &str) -> Result<bool> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(NapulitaError::ResourceUnavailable(
                "photo store unreachable".into(),
            ));
        }
        Ok(self
            .known
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(photo_ref))
    }

    fn public_url(&self, photo_ref: &str) -> String {
        join_url("https://photos.test", photo_ref)
    }
}
