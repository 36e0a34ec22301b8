//! Cursor pager over the history HTTP API.
//!
//! The service returns messages newest-first; everything leaving this
//! module is chronological ascending, ready for the timeline. Paging
//! backward uses the composite `(created_at, id)` key so messages sharing
//! a timestamp are neither skipped nor repeated.

use chrono::SecondsFormat;

use crate::error::FetchError;
use crate::model::{Message, MessagePage, PageInfo, Room};

/// Service-side bounds on the history page size.
const MIN_PAGE_SIZE: usize = 1;
const MAX_PAGE_SIZE: usize = 100;

/// HTTP client for room listing and history pagination.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    page_size: usize,
}

impl ApiClient {
    /// `base` is the API root, e.g. `http://localhost:8080/api`. The page
    /// size is clamped to the service's 1..=100 window.
    pub fn new(base: impl Into<String>, page_size: usize) -> Self {
        let base = base.into();
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            page_size: page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE),
        }
    }

    /// `GET /rooms`.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, FetchError> {
        let url = format!("{}/rooms", self.base);
        let resp = check_status(self.http.get(&url).send().await?)?;
        Ok(resp.json().await?)
    }

    /// Most recent page for a room, ascending, plus the frontier toward the
    /// past.
    pub async fn load_latest(&self, room_id: i64) -> Result<(Vec<Message>, PageInfo), FetchError> {
        let url = format!("{}/rooms/{}/messages", self.base, room_id);
        let resp = self
            .http
            .get(&url)
            .query(&[("limit", self.page_size.to_string())])
            .send()
            .await?;
        let page: MessagePage = check_status(resp)?.json().await?;
        tracing::debug!(room_id, count = page.items.len(), has_more = page.page_info.has_more, "loaded latest page");
        Ok(into_ascending(page))
    }

    /// The page strictly older than the cursor in `page_info`, ascending.
    ///
    /// Returns `Ok(None)` without issuing a request when the frontier is
    /// exhausted (`has_more == false` or a half-set cursor).
    pub async fn load_older(
        &self,
        room_id: i64,
        page_info: &PageInfo,
    ) -> Result<Option<(Vec<Message>, PageInfo)>, FetchError> {
        let Some((before_ts, before_id)) = page_info.cursor() else {
            return Ok(None);
        };
        let url = format!("{}/rooms/{}/messages", self.base, room_id);
        let resp = self
            .http
            .get(&url)
            .query(&[
                // Full precision: a truncated timestamp would shift the
                // strict (created_at, id) comparison on the service side.
                ("before_ts", before_ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
                ("before_id", before_id.to_string()),
                ("limit", self.page_size.to_string()),
            ])
            .send()
            .await?;
        let page: MessagePage = check_status(resp)?.json().await?;
        tracing::debug!(room_id, count = page.items.len(), has_more = page.page_info.has_more, "loaded older page");
        Ok(Some(into_ascending(page)))
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status { status });
    }
    Ok(resp)
}

fn into_ascending(mut page: MessagePage) -> (Vec<Message>, PageInfo) {
    page.items.reverse();
    (page.items, page.page_info)
}
