//! A client for [NocoDB](https://nocodb.com).
//!
//! This crate provides a Rust SDK for the NocoDB table-records API, with
//! both a blocking client and an async client, and bulk helpers that fan
//! out many independent record operations under a concurrency limit.
//!
//! # Synchronous usage
//!
//! ```no_run
//! use nocodb_client::{Client, Config, record::Record};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let client = Client::new(config);
//! let table = client.table("m0lwxv2cvqrwnpc");
//!
//! let mut record = Record::new();
//! record.insert("Name".to_string(), "Ada".into());
//!
//! let id = table.insert_record(&record)?;
//! let fetched = table.get_record(&id, None)?;
//! println!("inserted: {fetched:?}");
//!
//! table.delete_record(&id)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Async and bulk usage
//!
//! Bulk helpers issue one request per record, with at most
//! [bulk::BulkOptions::concurrency] requests in flight at once. Each input
//! gets its own [bulk::Outcome], in input order, so partially-failed batches
//! can be recovered item by item.
//!
//! ```no_run
//! use nocodb_client::{AsyncClient, Config, bulk::BulkOptions, record::Record};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let client = AsyncClient::new(config)?;
//! let table = client.table("m0lwxv2cvqrwnpc");
//!
//! let records: Vec<Record> = (0..100)
//!     .map(|i| {
//!         let mut record = Record::new();
//!         record.insert("Name".to_string(), format!("User {i}").into());
//!         record
//!     })
//!     .collect();
//!
//! let result = table
//!     .bulk_insert_records(records, &BulkOptions::default())
//!     .await?;
//!
//! println!("inserted {} of {}", result.succeeded(), result.len());
//! for (index, error) in result.failures() {
//!     eprintln!("record {index} failed: {error}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # HTTP requests and responses
//!
//! The API types are designed to work with any HTTP client that uses the
//! [`http`] crate. Use [`ApiRequest::into_request`] to create a request, and
//! [`ApiResponse::from_response`] to parse the response, if you would rather
//! bring your own transport than use [Client] or [AsyncClient].

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

mod api;
pub mod async_client;
pub mod bulk;
pub mod client;
pub mod config;

pub use api::*;
pub use async_client::{AsyncClient, AsyncTable};
pub use client::{Client, Table};
pub use config::Config;
