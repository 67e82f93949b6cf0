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
use async_trait::async_trait;
use tracing::debug;

use super::AudioError;

/// Fetches audio over HTTP(S), or from the local filesystem for plain paths
/// and `file://` URLs.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> HttpFetcher {
        HttpFetcher::default()
    }
}

#[async_trait]
impl super::Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AudioError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            debug!(url, "Fetching over HTTP.");
            let bytes = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            return Ok(bytes.to_vec());
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        debug!(path, "Reading from disk.");
        Ok(tokio::fs::read(path).await?)
    }
}
