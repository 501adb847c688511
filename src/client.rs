//! The synchronous client, for callers without an async runtime.

use std::thread;

use tracing::debug;

use crate::{
    Config,
    api::{self, ApiError, ApiRequest, ApiResponse, paginate},
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
    Transport(#[from] ureq::Error),
    /// The API returned an error.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A blocking client for the NocoDB API.
///
/// The client holds a connection pool and is cheap to share by reference.
/// Requests that are rate-limited or fail server-side are retried up to
/// [Config::max_retries] times with exponential backoff.
pub struct Client {
    config: Config,
    agent: ureq::Agent,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("config", &self.config).finish()
    }
}

impl Client {
    /// Create a client from the given configuration.
    pub fn new(config: Config) -> Self {
        // Allows error responses to be parsed.
        let mut cfg = ureq::config::Config::builder().http_status_as_error(false);
        cfg = cfg.timeout_global(config.timeout);
        let agent = ureq::Agent::new_with_config(cfg.build());

        Self { config, agent }
    }

    /// The configuration the client was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle for record operations on one table.
    pub fn table<'a>(&'a self, table_id: &'a str) -> Table<'a> {
        Table {
            client: self,
            table_id,
        }
    }

    /// Execute an API request and parse the response.
    pub fn execute<T: ApiRequest>(&self, req: T) -> Result<T::Response, Error> {
        let req = req.into_request(&self.config)?;
        let mut attempt = 0;

        loop {
            match self.run_once(api::clone_request(&req)) {
                Err(Error::Api(api_err)) if attempt < self.config.max_retries => {
                    let Some(delay) = api_err.retry_delay(attempt, self.config.backoff_factor)
                    else {
                        return Err(Error::Api(api_err));
                    };

                    debug!(attempt, ?delay, uri = %req.uri(), "retrying request");
                    thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn run_once<R: ApiResponse>(&self, req: http::Request<String>) -> Result<R, Error> {
        let resp = self.agent.run(req)?;
        Ok(R::from_response(resp.map(ureq::Body::into_reader))?)
    }
}

/// A handle for record operations on one table.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    client: &'a Client,
    table_id: &'a str,
}

impl Table<'_> {
    /// Insert a record, returning the id the server assigned.
    pub fn insert_record(&self, record: &Record) -> Result<RecordId, Error> {
        let resp = self.client.execute(InsertRecord {
            table_id: self.table_id,
            record,
        })?;

        Ok(resp.id)
    }

    /// Fetch a record by id, optionally restricted to the given
    /// comma-separated fields.
    pub fn get_record(
        &self,
        record_id: &RecordId,
        fields: Option<&str>,
    ) -> Result<Record, Error> {
        self.client.execute(GetRecord {
            table_id: self.table_id,
            record_id,
            fields,
        })
    }

    /// Update fields of an existing record. The record must carry its `Id`.
    pub fn update_record(&self, record: &Record) -> Result<RecordId, Error> {
        let resp = self.client.execute(UpdateRecord {
            table_id: self.table_id,
            record,
        })?;

        Ok(resp.id)
    }

    /// Delete a record by id.
    pub fn delete_record(&self, record_id: &RecordId) -> Result<RecordId, Error> {
        let resp = self.client.execute(DeleteRecord {
            table_id: self.table_id,
            record_id,
        })?;

        Ok(resp.id)
    }

    /// List records, fetching as many pages as needed. A `limit` bounds the
    /// total number of records returned.
    pub fn records(
        &self,
        options: &ListOptions<'_>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, Error> {
        let req = ListRecords {
            table_id: self.table_id,
            options: *options,
        };

        paginate(req, limit, |page_req| self.client.execute(page_req)).collect()
    }

    /// Count records, optionally restricted by a filter expression.
    pub fn count_records(&self, r#where: Option<&str>) -> Result<u64, Error> {
        let resp = self.client.execute(CountRecords {
            table_id: self.table_id,
            r#where,
        })?;

        Ok(resp.count)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    use super::*;

    fn test_client(server: &MockServer) -> Client {
        let mut config = Config::new(&server.uri(), "test-token").unwrap();
        config.backoff_factor = 0.0;
        Client::new(config)
    }

    #[tokio::test]
    async fn insert_record() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/tables/tbl/records"))
            .and(header("xc-token", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": 42})))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let id = tokio::task::spawn_blocking(move || {
            let mut record = Record::new();
            record.insert("Name".to_string(), "Ada".into());
            client.table("tbl").insert_record(&record)
        })
        .await??;

        assert_eq!(id, RecordId::Int(42));

        Ok(())
    }

    #[tokio::test]
    async fn get_record_not_found() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tables/tbl/records/9"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"error": "RECORD_NOT_FOUND", "message": "Record '9' not found"}),
            ))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = tokio::task::spawn_blocking(move || {
            client.table("tbl").get_record(&RecordId::Int(9), None)
        })
        .await?;

        match result {
            Err(Error::Api(e)) => assert!(e.is_not_found()),
            other => panic!("expected not-found error, got {other:?}"),
        }

        Ok(())
    }

    #[tokio::test]
    async fn retries_after_rate_limit() -> anyhow::Result<()> {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/v2/tables/tbl/records"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "0"),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/api/v2/tables/tbl/records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": 7})))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let id = tokio::task::spawn_blocking(move || {
            client.table("tbl").delete_record(&RecordId::Int(7))
        })
        .await??;

        assert_eq!(id, RecordId::Int(7));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn records_fetches_all_pages() -> anyhow::Result<()> {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v2/tables/tbl/records"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [{"Id": 1}, {"Id": 2}],
                "pageInfo": {"totalRows": 3, "isFirstPage": true, "isLastPage": false},
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v2/tables/tbl/records"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [{"Id": 3}],
                "pageInfo": {"totalRows": 3, "isFirstPage": false, "isLastPage": true},
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let records = tokio::task::spawn_blocking(move || {
            client.table("tbl").records(&ListOptions::default(), None)
        })
        .await??;

        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["Id"], json!(3));

        Ok(())
    }

    #[tokio::test]
    async fn count_records_with_filter() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/tables/tbl/records/count"))
            .and(query_param("where", "(Status,eq,Active)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 12})))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let count = tokio::task::spawn_blocking(move || {
            client.table("tbl").count_records(Some("(Status,eq,Active)"))
        })
        .await??;

        assert_eq!(count, 12);

        Ok(())
    }
}
