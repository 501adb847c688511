use std::io::Read;

use serde::{Serialize, de::DeserializeOwned};

use crate::Config;

mod error;
mod paginate;
pub mod record;

pub use error::*;
pub use paginate::*;

// The server rejects page sizes above this.
pub(crate) const MAX_PAGE_SIZE: usize = 1000;

/// Implemented by types that can be sent as requests to the NocoDB API.
pub trait ApiRequest: Sized {
    /// The corresponding response type.
    type Response: ApiResponse;

    /// The path that the request should take.
    fn path(&self) -> String;

    /// The method to use.
    fn method(&self) -> http::Method {
        http::Method::GET
    }

    /// The serializable request body.
    fn body(&self) -> Option<impl Serialize> {
        None::<&()>
    }

    /// The serializable query string.
    fn query(&self) -> Option<impl Serialize> {
        None::<&()>
    }

    /// Consume the request and return an [http::Request] suitable for passing
    /// to your favorite HTTP client.
    fn into_request(self, config: &Config) -> Result<http::Request<String>, http::Error> {
        let method = self.method();
        let mut path = self.path();
        let mut parts = config.base_url.clone().into_parts();

        if let Some(qs) = self.query() {
            path.push('?');

            // SAFETY: query strings should only be valid UTF-8.
            unsafe {
                serde_qs::to_writer(&qs, &mut path.as_mut_vec())
                    .expect("query string serialization should be infallible");
            }
        }

        parts.path_and_query = Some(path.parse()?);

        let uri = http::Uri::from_parts(parts)?;
        let mut req = http::Request::builder()
            .method(method)
            .uri(uri)
            .header("xc-token", &config.api_token)
            .header(http::header::USER_AGENT, &config.user_agent);

        for (name, value) in &config.extra_headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(body) = self.body() {
            let body_str =
                serde_json::to_string(&body).expect("JSON serialization should be infallible");
            req.header(http::header::CONTENT_TYPE, "application/json")
                .header(http::header::CONTENT_LENGTH, body_str.len())
                .body(body_str)
        } else {
            req.body("".to_string())
        }
    }

    /// Attach an explicit page window to the request.
    fn page(self, limit: Option<usize>, offset: usize) -> Paged<Self> {
        Paged {
            base: self,
            limit,
            offset,
        }
    }
}

/// Implemented by types that can be read as responses from the NocoDB API.
pub trait ApiResponse: Sized {
    /// Read the response from an [http::Response] object.
    fn from_response(resp: http::Response<impl Read>) -> Result<Self, ApiError> {
        let (parts, body) = resp.into_parts();
        Self::from_response_parts(parts, body)
    }

    /// Read the response from pre-parsed parts. Useful for async HTTP clients
    /// where the body must be collected before parsing.
    fn from_response_parts(parts: http::response::Parts, body: impl Read)
    -> Result<Self, ApiError>;
}

/// Rebuild a request so it can be issued again. Retries need this because
/// running a request consumes it.
pub(crate) fn clone_request(req: &http::Request<String>) -> http::Request<String> {
    let mut builder = http::Request::builder()
        .method(req.method().clone())
        .uri(req.uri().clone());

    for (name, value) in req.headers() {
        builder = builder.header(name, value);
    }

    builder
        .body(req.body().clone())
        .expect("the source request was already valid")
}

/// A private trait for types that deserialize directly from a JSON response
/// body. NocoDB returns payloads bare; error details appear only on non-2xx
/// statuses.
pub(crate) trait DataResponse: DeserializeOwned {}

impl<T: DataResponse> ApiResponse for T {
    fn from_response_parts(
        parts: http::response::Parts,
        body: impl Read,
    ) -> Result<Self, ApiError> {
        if !parts.status.is_success() {
            return Err(ApiError::from_parts(parts, body));
        }

        serde_json::from_reader(body).map_err(|e| {
            tracing::error!("Failed to parse API response: {e:#?}");
            ApiError::InvalidResponse(parts.status, e)
        })
    }
}
