// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::state::{Query, SampleRef};

/// The only search source the instrument knows how to talk to.
pub const FREESOUND: &str = "freesound";

/// The Freesound text search endpoint.
pub const FREESOUND_ENDPOINT: &str = "https://freesound.org/apiv2/search/text/";

/// The fields requested from the search API.
const FIELDS: &str = "id,name,username,license,duration,images,previews";

const PREVIEW: &str = "preview-hq-ogg";
const WAVEFORM: &str = "waveform_m";

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search source {0} is not supported")]
    UnsupportedSource(String),
}

/// A sample search service.
#[async_trait]
pub trait Search: Send + Sync {
    async fn search(&self, query: &Query) -> Result<Vec<SampleRef>, SearchError>;
}

/// Searches the Freesound text search API.
pub struct Freesound {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl Freesound {
    pub fn new(endpoint: &str, token: Option<String>) -> Freesound {
        Freesound {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            token,
        }
    }
}

#[async_trait]
impl Search for Freesound {
    async fn search(&self, query: &Query) -> Result<Vec<SampleRef>, SearchError> {
        if query.source != FREESOUND {
            return Err(SearchError::UnsupportedSource(query.source.clone()));
        }

        let page = query.page.max(1).to_string();
        let page_size = query.limit.to_string();
        let mut params = vec![
            ("query", query.pattern.as_str()),
            ("fields", FIELDS),
            ("page", page.as_str()),
            ("page_size", page_size.as_str()),
        ];
        if let Some(token) = self.token.as_deref() {
            params.push(("token", token));
        }

        debug!(pattern = query.pattern, page = query.page, "Searching.");
        let response: Response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(
            pattern = query.pattern,
            results = response.results.len(),
            "Search finished."
        );
        Ok(response.results.into_iter().map(SampleRef::from).collect())
    }
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<Sound>,
}

#[derive(Deserialize)]
struct Sound {
    id: u64,
    #[serde(default)]
    name: String,
    username: Option<String>,
    license: Option<String>,
    /// Seconds.
    duration: Option<f64>,
    #[serde(default)]
    images: HashMap<String, String>,
    #[serde(default)]
    previews: HashMap<String, String>,
}

impl From<Sound> for SampleRef {
    fn from(mut sound: Sound) -> SampleRef {
        SampleRef {
            id: sound.id.to_string(),
            name: sound.name,
            author: sound.username,
            sound: sound.previews.remove(PREVIEW),
            image: sound.images.remove(WAVEFORM),
            license: sound.license,
            duration: sound
                .duration
                .map(|seconds| (seconds * 1000.0).round() as u64),
            updated: None,
        }
    }
}
