use serde::Deserialize;
use serde::Serialize;

use crate::DeviceRecord;
use crate::RequestError;
use crate::SearchWorker;
use crate::SortDirection;
use crate::SortField;

/// One bulk device request, from the query string (GET) or a JSON body (POST)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceQuery {
    /// Case-insensitive substring over name, type, channel, MAC, phy and key
    pub search: Option<String>,
    pub sort: Option<String>,
    /// `asc` or `desc`
    pub direction: Option<String>,
    pub start: usize,
    /// Page length; absent or zero means the configured maximum
    pub length: Option<usize>,
}

impl DeviceQuery {
    /// Validate the request and build the worker that answers it.
    pub fn into_worker(
        self,
        max_page_size: usize,
    ) -> Result<SearchWorker, RequestError> {
        let length = match self.length {
            None | Some(0) => max_page_size,
            Some(requested) if requested > max_page_size => {
                return Err(RequestError::PageTooLarge {
                    requested,
                    max: max_page_size,
                })
            }
            Some(requested) => requested,
        };

        let direction = self
            .direction
            .as_deref()
            .map(str::parse::<SortDirection>)
            .transpose()?
            .unwrap_or_default();

        let mut worker = SearchWorker::new().with_page(self.start, length);
        if let Some(sort) = self.sort.as_deref() {
            worker = worker.with_sort(sort.parse::<SortField>()?, direction);
        }
        if let Some(term) = self.search {
            worker = worker.with_search(term);
        }
        Ok(worker)
    }
}

/// Paged answer to a [`DeviceQuery`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePage {
    /// Devices in the view when the request was served
    #[serde(rename = "recordsTotal")]
    pub records_total: usize,
    /// Devices matching the search, before pagination
    #[serde(rename = "recordsFiltered")]
    pub records_filtered: usize,
    pub data: Vec<DeviceRecord>,
}
