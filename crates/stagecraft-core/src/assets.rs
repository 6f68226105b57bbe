//! Asset loading.
//!
//! The runtime never fetches or decodes anything itself. It asks an
//! [`AssetLoader`] for each declared costume, backdrop and sound, and gets
//! back a [`PendingAsset`] that resolves later (possibly from another OS
//! thread). Failed loads are reported once and never retried.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::fmt;

use crate::error::AssetError;

/// What sort of asset a locator refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Sound,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Image => f.write_str("image"),
            AssetKind::Sound => f.write_str("sound"),
        }
    }
}

/// A successfully loaded asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetHandle {
    pub kind: AssetKind,
    pub locator: String,
    /// Image width in stage units (0 for sounds).
    pub width: f64,
    /// Image height in stage units (0 for sounds).
    pub height: f64,
}

impl AssetHandle {
    pub fn image(locator: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            kind: AssetKind::Image,
            locator: locator.into(),
            width,
            height,
        }
    }

    pub fn sound(locator: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::Sound,
            locator: locator.into(),
            width: 0.0,
            height: 0.0,
        }
    }
}

/// Completes a [`PendingAsset`].
pub type AssetSender = Sender<Result<AssetHandle, AssetError>>;

/// A load that may not have finished yet.
#[derive(Debug)]
pub struct PendingAsset {
    kind: AssetKind,
    locator: String,
    rx: Receiver<Result<AssetHandle, AssetError>>,
}

impl PendingAsset {
    /// A pending load plus the sender the loader completes it with.
    pub fn channel(kind: AssetKind, locator: impl Into<String>) -> (AssetSender, Self) {
        let (tx, rx) = bounded(1);
        let pending = Self {
            kind,
            locator: locator.into(),
            rx,
        };
        (tx, pending)
    }

    /// A load that has already finished.
    pub fn ready(kind: AssetKind, locator: &str, result: Result<AssetHandle, AssetError>) -> Self {
        let (tx, pending) = Self::channel(kind, locator);
        // Capacity is one and nothing else has sent.
        let _ = tx.send(result);
        pending
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Take the result if the load has finished.
    ///
    /// A loader that drops its sender without answering counts as a
    /// failed load.
    pub fn try_take(&self) -> Option<Result<AssetHandle, AssetError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(AssetError::Abandoned {
                kind: self.kind,
                locator: self.locator.clone(),
            })),
        }
    }
}

/// Something that can fetch assets by locator.
pub trait AssetLoader {
    fn load(&self, kind: AssetKind, locator: &str) -> PendingAsset;
}

/// Loader answering from a fixed table, for headless runs.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLoader {
    images: HashMap<String, (f64, f64)>,
    sounds: Vec<String>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an image of the given size available.
    pub fn with_image(mut self, locator: impl Into<String>, width: f64, height: f64) -> Self {
        self.images.insert(locator.into(), (width, height));
        self
    }

    /// Make a sound available.
    pub fn with_sound(mut self, locator: impl Into<String>) -> Self {
        self.sounds.push(locator.into());
        self
    }
}

impl AssetLoader for InMemoryLoader {
    fn load(&self, kind: AssetKind, locator: &str) -> PendingAsset {
        let result = match kind {
            AssetKind::Image => self
                .images
                .get(locator)
                .map(|&(w, h)| AssetHandle::image(locator, w, h)),
            AssetKind::Sound => self
                .sounds
                .iter()
                .any(|s| s == locator)
                .then(|| AssetHandle::sound(locator)),
        };
        let result = result.ok_or_else(|| AssetError::NotFound {
            kind,
            locator: locator.to_string(),
        });
        PendingAsset::ready(kind, locator, result)
    }
}
