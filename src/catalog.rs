//! Advertisement catalog: the ordered (or shuffled) list of watchable ads and
//! the navigation cursor over it. Read-only from the engine's point of view.

use crate::sync::backend::{BackendError, RewardBackend};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

fn default_points_per_interval() -> u64 {
    1
}

/// Watchable advertisement as served by `GET /api/ads`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub advertiser: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "duration")]
    pub duration_seconds: u64,
    #[serde(
        rename = "points",
        alias = "points_per_interval",
        alias = "points_per_minute",
        default = "default_points_per_interval"
    )]
    pub points_per_interval: u64,
}

impl Advertisement {
    pub fn new(id: impl Into<String>, duration_seconds: u64, points_per_interval: u64) -> Self {
        let id = id.into();
        Self {
            video_url: format!("video://{id}"),
            id,
            title: String::new(),
            advertiser: String::new(),
            thumbnail_url: None,
            duration_seconds,
            points_per_interval,
        }
    }

    fn is_playable(&self) -> bool {
        !self.id.is_empty() && self.duration_seconds > 0
    }
}

/// Ads in play order plus the index of the one currently shown.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    ads: Vec<Advertisement>,
    cursor: Option<usize>,
}

impl Catalog {
    pub fn new(ads: Vec<Advertisement>) -> Self {
        Self { ads, cursor: None }
    }

    pub fn shuffled<R: Rng + ?Sized>(mut ads: Vec<Advertisement>, rng: &mut R) -> Self {
        ads.shuffle(rng);
        Self::new(ads)
    }

    /// Fetch the catalog from the backend, dropping entries that cannot be watched.
    pub async fn fetch<B>(backend: &B, shuffle: bool) -> Result<Self, BackendError>
    where
        B: RewardBackend + ?Sized,
    {
        let fetched = backend.fetch_ads().await?;
        let total = fetched.len();
        let ads: Vec<_> = fetched.into_iter().filter(Advertisement::is_playable).collect();
        if ads.len() != total {
            tracing::debug!(
                dropped = total - ads.len(),
                "catalog entries without id or duration skipped"
            );
        }
        tracing::info!(ads = ads.len(), shuffle, "advertisement catalog loaded");
        if shuffle {
            Ok(Self::shuffled(ads, &mut rand::thread_rng()))
        } else {
            Ok(Self::new(ads))
        }
    }

    pub fn len(&self) -> usize {
        self.ads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }

    pub fn ads(&self) -> &[Advertisement] {
        &self.ads
    }

    pub fn position(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&Advertisement> {
        self.cursor.and_then(|idx| self.ads.get(idx))
    }

    /// Move the cursor to `index`; out-of-range indices leave it untouched.
    pub fn seek(&mut self, index: usize) -> Option<&Advertisement> {
        if index >= self.ads.len() {
            return None;
        }
        self.cursor = Some(index);
        self.ads.get(index)
    }

    /// Advance the cursor; at the last ad this is a no-op returning `None`.
    pub fn next_ad(&mut self) -> Option<&Advertisement> {
        let target = match self.cursor {
            None => 0,
            Some(idx) => idx + 1,
        };
        self.seek(target)
    }

    /// Step back; at the first ad this is a no-op returning `None`.
    pub fn previous_ad(&mut self) -> Option<&Advertisement> {
        match self.cursor {
            Some(idx) if idx > 0 => self.seek(idx - 1),
            _ => None,
        }
    }

    /// Forget the cursor (viewer closed).
    pub fn reset(&mut self) {
        self.cursor = None;
    }
}
