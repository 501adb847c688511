//! The asynchronous client, for callers on a tokio runtime.

use std::io::Cursor;

use http_body_util::BodyExt as _;
use tracing::debug;

use crate::{
    Config,
    api::{self, ApiError, ApiRequest, ApiResponse},
    bulk::{self, BulkError, BulkOptions, BulkResult},
    record::{
        CountRecords, DeleteRecord, GetRecord, InsertRecord, ListOptions, ListRecords, Record,
        RecordId, UpdateRecord,
    },
};

/// An error encountered while executing a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request could not be constructed.
    #[error("Failed to construct request")]
    Http(#[from] http::Error),
    /// The request could not be delivered.
    #[error("Transport error")]
    Transport(#[source] reqwest::Error),
    /// The API returned an error.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The request, or the bulk batch it belonged to, ran out of time.
    #[error("Request timed out")]
    Timeout,
}

impl Error {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Transport(e)
        }
    }
}

/// An async client for the NocoDB API.
///
/// The client holds a connection pool and is cheap to clone. Requests that
/// are rate-limited or fail server-side are retried up to
/// [Config::max_retries] times with exponential backoff.
#[derive(Debug, Clone)]
pub struct AsyncClient {
    config: Config,
    http: reqwest::Client,
}

impl AsyncClient {
    /// Create a client from the given configuration.
    pub fn new(config: Config) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(n) = config.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }

        let http = builder.build().map_err(Error::from_reqwest)?;

        Ok(Self { config, http })
    }

    /// The configuration the client was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle for record operations on one table.
    pub fn table<'a>(&'a self, table_id: &'a str) -> AsyncTable<'a> {
        AsyncTable {
            client: self,
            table_id,
        }
    }

    /// Execute an API request and parse the response.
    pub async fn execute<T: ApiRequest>(&self, req: T) -> Result<T::Response, Error> {
        let req = req.into_request(&self.config)?;
        let mut attempt = 0;

        loop {
            match self.run_once(api::clone_request(&req)).await {
                Err(Error::Api(api_err)) if attempt < self.config.max_retries => {
                    let Some(delay) = api_err.retry_delay(attempt, self.config.backoff_factor)
                    else {
                        return Err(Error::Api(api_err));
                    };

                    debug!(attempt, ?delay, uri = %req.uri(), "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn run_once<R: ApiResponse>(&self, req: http::Request<String>) -> Result<R, Error> {
        let reqwest_req: reqwest::Request = req.try_into().map_err(Error::from_reqwest)?;
        let resp = self
            .http
            .execute(reqwest_req)
            .await
            .map_err(Error::from_reqwest)?;

        let http_resp: http::Response<reqwest::Body> = resp.into();
        let (parts, body) = http_resp.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(Error::from_reqwest)?
            .to_bytes();

        Ok(R::from_response_parts(parts, Cursor::new(bytes))?)
    }
}

/// A handle for record operations on one table.
#[derive(Debug, Clone, Copy)]
pub struct AsyncTable<'a> {
    client: &'a AsyncClient,
    table_id: &'a str,
}

impl AsyncTable<'_> {
    /// Insert a record, returning the id the server assigned.
    pub async fn insert_record(&self, record: &Record) -> Result<RecordId, Error> {
        let resp = self
            .client
            .execute(InsertRecord {
                table_id: self.table_id,
                record,
            })
            .await?;

        Ok(resp.id)
    }

    /// Fetch a record by id, optionally restricted to the given
    /// comma-separated fields.
    pub async fn get_record(
        &self,
        record_id: &RecordId,
        fields: Option<&str>,
    ) -> Result<Record, Error> {
        self.client
            .execute(GetRecord {
                table_id: self.table_id,
                record_id,
                fields,
            })
            .await
    }

    /// Update fields of an existing record. The record must carry its `Id`.
    pub async fn update_record(&self, record: &Record) -> Result<RecordId, Error> {
        let resp = self
            .client
            .execute(UpdateRecord {
                table_id: self.table_id,
                record,
            })
            .await?;

        Ok(resp.id)
    }

    /// Delete a record by id.
    pub async fn delete_record(&self, record_id: &RecordId) -> Result<RecordId, Error> {
        let resp = self
            .client
            .execute(DeleteRecord {
                table_id: self.table_id,
                record_id,
            })
            .await?;

        Ok(resp.id)
    }

    /// List records, fetching as many pages as needed. A `limit` bounds the
    /// total number of records returned.
    pub async fn records(
        &self,
        options: &ListOptions<'_>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, Error> {
        let mut out = Vec::new();

        loop {
            let page_size = match limit {
                Some(l) if l <= out.len() => break,
                Some(l) => (l - out.len()).min(api::MAX_PAGE_SIZE),
                None => api::MAX_PAGE_SIZE,
            };

            let req = ListRecords {
                table_id: self.table_id,
                options: *options,
            }
            .page(Some(page_size), out.len());

            let page = self.client.execute(req).await?;
            let done = page.page_info.is_last_page || page.list.is_empty();
            out.extend(page.list);

            if done {
                break;
            }
        }

        if let Some(l) = limit {
            out.truncate(l);
        }

        Ok(out)
    }

    /// Count records, optionally restricted by a filter expression.
    pub async fn count_records(&self, r#where: Option<&str>) -> Result<u64, Error> {
        let resp = self
            .client
            .execute(CountRecords {
                table_id: self.table_id,
                r#where,
            })
            .await?;

        Ok(resp.count)
    }

    /// Insert many records with bounded concurrency. One [bulk::Outcome] is
    /// returned per input record, in input order.
    pub async fn bulk_insert_records(
        &self,
        records: Vec<Record>,
        options: &BulkOptions,
    ) -> Result<BulkResult<RecordId>, BulkError> {
        bulk::dispatch(records, options, |record| async move {
            self.insert_record(&record).await
        })
        .await
    }

    /// Update many records with bounded concurrency. Each record must carry
    /// its `Id`. One [bulk::Outcome] is returned per input record, in input
    /// order.
    pub async fn bulk_update_records(
        &self,
        records: Vec<Record>,
        options: &BulkOptions,
    ) -> Result<BulkResult<RecordId>, BulkError> {
        bulk::dispatch(records, options, |record| async move {
            self.update_record(&record).await
        })
        .await
    }

    /// Delete many records with bounded concurrency. One [bulk::Outcome] is
    /// returned per input id, in input order.
    pub async fn bulk_delete_records(
        &self,
        record_ids: Vec<RecordId>,
        options: &BulkOptions,
    ) -> Result<BulkResult<RecordId>, BulkError> {
        bulk::dispatch(record_ids, options, |record_id| async move {
            self.delete_record(&record_id).await
        })
        .await
    }
}
