use serde::Deserialize;

use crate::storage::constants::MAX_LIST_RESULTS;
use crate::storage::error::{internal_error, invalid_argument, StorageResult};
use crate::storage::location::Location;
use crate::storage::reference::StorageReference;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Page size, `1..=1000`. The server default applies when unset.
    pub max_results: Option<u32>,
    /// Token from a previous [`ListResult::next_page_token`].
    pub page_token: Option<String>,
}

impl ListOptions {
    pub fn validate(&self) -> StorageResult<()> {
        if let Some(max) = self.max_results {
            if max == 0 || max > MAX_LIST_RESULTS {
                return Err(invalid_argument(format!(
                    "max_results must be between 1 and {MAX_LIST_RESULTS}, got {max}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn query_params(&self, location: &Location) -> Vec<(&'static str, String)> {
        let prefix = if location.is_root() {
            String::new()
        } else {
            format!("{}/", location.path())
        };
        let mut params = vec![("prefix", prefix), ("delimiter", "/".to_string())];
        if let Some(token) = &self.page_token {
            params.push(("pageToken", token.clone()));
        }
        if let Some(max) = self.max_results {
            params.push(("maxResults", max.to_string()));
        }
        params
    }
}

/// One page of a listing: child items and sub-folder prefixes, in server order.
#[derive(Clone, Debug, Default)]
pub struct ListResult {
    pub prefixes: Vec<StorageReference>,
    pub items: Vec<StorageReference>,
    pub next_page_token: Option<String>,
}

impl ListResult {
    /// Appends another page, keeping its token as the continuation point.
    pub(crate) fn absorb(&mut self, page: ListResult) {
        self.prefixes.extend(page.prefixes);
        self.items.extend(page.items);
        self.next_page_token = page.next_page_token;
    }
}

/// Raw list response before it is bound to a storage instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub items: Vec<ListItem>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ListItem {
    pub name: String,
    #[serde(default)]
    pub bucket: Option<String>,
}

impl ListPage {
    pub(crate) fn from_slice(body: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(body).map_err(|err| internal_error(format!("invalid list response: {err}")))
    }

    pub(crate) fn locations(self, bucket: &str) -> (Vec<Location>, Vec<Location>, Option<String>) {
        let prefixes = self
            .prefixes
            .iter()
            .map(|prefix| Location::new(bucket, prefix))
            .collect();
        let items = self
            .items
            .into_iter()
            .map(|item| Location::new(item.bucket.unwrap_or_else(|| bucket.to_string()), &item.name))
            .collect();
        let token = self.next_page_token.filter(|token| !token.is_empty());
        (prefixes, items, token)
    }
}
