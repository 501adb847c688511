//! API operations concerning records in a table.

use serde::{Deserialize, Serialize};

use crate::api::{ApiRequest, DataResponse, PagedResponse};

/// A record, as a mapping from field name to value. No schema validation
/// happens on the client; the server owns the table schema.
pub type Record = serde_json::Map<String, serde_json::Value>;

impl DataResponse for Record {}

/// The primary key of a persisted record. NocoDB tables may use either
/// integer or string keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RecordId {
    /// An integer key.
    Int(i64),
    /// A string key.
    String(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{id}"),
            RecordId::String(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::String(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::String(id.to_owned())
    }
}

/// The id echo returned by insert, update, and delete operations.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordIdOnly {
    /// The record's primary key.
    #[serde(rename = "Id")]
    pub id: RecordId,
}

impl DataResponse for RecordIdOnly {}

/// The count returned by [CountRecords].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RecordCount {
    /// The number of records matching the filter.
    pub count: u64,
}

impl DataResponse for RecordCount {}

/// Insert a single record into a table.
#[derive(Debug, Clone)]
pub struct InsertRecord<'a> {
    /// The table to insert into.
    pub table_id: &'a str,

    /// The record fields. Leave `Id` unset to let the server assign one.
    pub record: &'a Record,
}

impl ApiRequest for InsertRecord<'_> {
    type Response = RecordIdOnly;

    fn method(&self) -> http::Method {
        http::Method::POST
    }

    fn path(&self) -> String {
        format!("/api/v2/tables/{}/records", self.table_id)
    }

    fn body(&self) -> Option<impl Serialize> {
        Some(self.record)
    }
}

/// Fetch a single record by id.
#[derive(Debug, Clone)]
pub struct GetRecord<'a> {
    /// The table to read from.
    pub table_id: &'a str,

    /// The record's primary key.
    pub record_id: &'a RecordId,

    /// A comma-separated list of fields to return. Defaults to all fields.
    pub fields: Option<&'a str>,
}

#[derive(Serialize)]
struct GetRecordQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a str>,
}

impl ApiRequest for GetRecord<'_> {
    type Response = Record;

    fn path(&self) -> String {
        format!("/api/v2/tables/{}/records/{}", self.table_id, self.record_id)
    }

    fn query(&self) -> Option<impl Serialize> {
        Some(GetRecordQuery {
            fields: self.fields,
        })
    }
}

/// Update fields of an existing record. The record must carry its `Id`
/// field; all other fields present are overwritten, and absent fields are
/// left untouched.
#[derive(Debug, Clone)]
pub struct UpdateRecord<'a> {
    /// The table the record lives in.
    pub table_id: &'a str,

    /// The fields to update, including the record's `Id`.
    pub record: &'a Record,
}

impl ApiRequest for UpdateRecord<'_> {
    type Response = RecordIdOnly;

    fn method(&self) -> http::Method {
        http::Method::PATCH
    }

    fn path(&self) -> String {
        format!("/api/v2/tables/{}/records", self.table_id)
    }

    fn body(&self) -> Option<impl Serialize> {
        Some(self.record)
    }
}

/// Delete a single record by id.
#[derive(Debug, Clone)]
pub struct DeleteRecord<'a> {
    /// The table to delete from.
    pub table_id: &'a str,

    /// The record's primary key.
    pub record_id: &'a RecordId,
}

#[derive(Serialize)]
struct DeleteRecordBody<'a> {
    #[serde(rename = "Id")]
    id: &'a RecordId,
}

impl ApiRequest for DeleteRecord<'_> {
    type Response = RecordIdOnly;

    fn method(&self) -> http::Method {
        http::Method::DELETE
    }

    fn path(&self) -> String {
        format!("/api/v2/tables/{}/records", self.table_id)
    }

    fn body(&self) -> Option<impl Serialize> {
        Some(DeleteRecordBody {
            id: self.record_id,
        })
    }
}

/// Options for listing records, shared by the sync and async table handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions<'a> {
    /// A comma-separated list of fields to return. Defaults to all fields.
    pub fields: Option<&'a str>,

    /// Sort expression, e.g. `Name` or `-CreatedAt`.
    pub sort: Option<&'a str>,

    /// Filter expression, e.g. `(Status,eq,Active)`.
    pub r#where: Option<&'a str>,

    /// Restrict the listing to a view.
    pub view_id: Option<&'a str>,
}

/// List records in a table.
#[derive(Debug, Clone, Default)]
pub struct ListRecords<'a> {
    /// The table to list.
    pub table_id: &'a str,

    /// Field selection, filtering, and ordering.
    pub options: ListOptions<'a>,
}

#[derive(Serialize)]
struct ListRecordsQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#where: Option<&'a str>,
    #[serde(rename = "viewId", skip_serializing_if = "Option::is_none")]
    view_id: Option<&'a str>,
}

impl ApiRequest for ListRecords<'_> {
    type Response = PagedResponse<Record>;

    fn path(&self) -> String {
        format!("/api/v2/tables/{}/records", self.table_id)
    }

    fn query(&self) -> Option<impl Serialize> {
        Some(ListRecordsQuery {
            fields: self.options.fields,
            sort: self.options.sort,
            r#where: self.options.r#where,
            view_id: self.options.view_id,
        })
    }
}

/// Count records in a table.
#[derive(Debug, Clone, Default)]
pub struct CountRecords<'a> {
    /// The table to count.
    pub table_id: &'a str,

    /// Filter expression, e.g. `(Status,eq,Active)`.
    pub r#where: Option<&'a str>,
}

#[derive(Serialize)]
struct CountRecordsQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    r#where: Option<&'a str>,
}

impl ApiRequest for CountRecords<'_> {
    type Response = RecordCount;

    fn path(&self) -> String {
        format!("/api/v2/tables/{}/records/count", self.table_id)
    }

    fn query(&self) -> Option<impl Serialize> {
        Some(CountRecordsQuery {
            r#where: self.r#where,
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;
    use crate::{ApiResponse, Config};

    fn test_config() -> Config {
        Config::new("http://localhost:8080", "test-token").unwrap()
    }

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn insert_request() -> anyhow::Result<()> {
        let rec = record(&[("Name", "Ada".into())]);
        let req = InsertRecord {
            table_id: "m0lwxv2cvqrwnpc",
            record: &rec,
        };

        let http_req = req.into_request(&test_config())?;
        assert_eq!(http_req.method(), http::Method::POST);
        assert_eq!(
            http_req.uri().path(),
            "/api/v2/tables/m0lwxv2cvqrwnpc/records"
        );
        assert_eq!(
            http_req.headers().get("xc-token").unwrap(),
            &"test-token"
        );
        assert_eq!(
            http_req.headers().get(http::header::CONTENT_TYPE).unwrap(),
            &"application/json"
        );

        let body: serde_json::Value = serde_json::from_str(http_req.body())?;
        assert_eq!(body["Name"], "Ada");

        Ok(())
    }

    #[test]
    fn get_request_with_fields() -> anyhow::Result<()> {
        let id = RecordId::Int(42);
        let req = GetRecord {
            table_id: "tbl",
            record_id: &id,
            fields: Some("Name,Email"),
        };

        let http_req = req.into_request(&test_config())?;
        assert_eq!(http_req.method(), http::Method::GET);
        assert_eq!(http_req.uri().path(), "/api/v2/tables/tbl/records/42");
        assert_eq!(http_req.uri().query(), Some("fields=Name%2CEmail"));

        Ok(())
    }

    #[test]
    fn delete_request_body() -> anyhow::Result<()> {
        let id = RecordId::Int(7);
        let req = DeleteRecord {
            table_id: "tbl",
            record_id: &id,
        };

        let http_req = req.into_request(&test_config())?;
        assert_eq!(http_req.method(), http::Method::DELETE);

        let body: serde_json::Value = serde_json::from_str(http_req.body())?;
        assert_eq!(body, serde_json::json!({"Id": 7}));

        Ok(())
    }

    #[test]
    fn list_request_query() -> anyhow::Result<()> {
        let req = ListRecords {
            table_id: "tbl",
            options: ListOptions {
                sort: Some("-CreatedAt"),
                r#where: Some("(Status,eq,Active)"),
                ..Default::default()
            },
        };

        let http_req = req.page(Some(25), 50).into_request(&test_config())?;
        let query = http_req.uri().query().unwrap();
        assert!(query.contains("sort=-CreatedAt"), "query: {query}");
        assert!(query.contains("limit=25"), "query: {query}");
        assert!(query.contains("offset=50"), "query: {query}");

        Ok(())
    }

    #[test]
    fn parse_id_echo() -> anyhow::Result<()> {
        let (parts, ()) = http::Response::builder().status(200).body(())?.into_parts();
        let echoed =
            RecordIdOnly::from_response_parts(parts, Cursor::new(r#"{"Id": 1203}"#))?;
        assert_eq!(echoed.id, RecordId::Int(1203));

        Ok(())
    }

    #[test]
    fn parse_string_id_echo() -> anyhow::Result<()> {
        let (parts, ()) = http::Response::builder().status(200).body(())?.into_parts();
        let echoed =
            RecordIdOnly::from_response_parts(parts, Cursor::new(r#"{"Id": "rec_8fa"}"#))?;
        assert_matches!(echoed.id, RecordId::String(id) if id == "rec_8fa");

        Ok(())
    }

    #[test]
    fn parse_error_response() {
        let (parts, ()) = http::Response::builder()
            .status(404)
            .body(())
            .unwrap()
            .into_parts();

        let result = Record::from_response_parts(
            parts,
            Cursor::new(r#"{"error": "RECORD_NOT_FOUND", "message": "Record '9' not found"}"#),
        );

        assert_matches!(result, Err(e) if e.is_not_found());
    }
}
