use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ApiRequest;

use super::{DataResponse, MAX_PAGE_SIZE};

/// A request with an explicit page window attached.
pub struct Paged<T> {
    /// The inner request.
    pub base: T,
    /// The maximum number of records to request from the server.
    pub limit: Option<usize>,
    /// The number of records to skip.
    pub offset: usize,
}

#[derive(Serialize)]
struct PageQuery<T> {
    #[serde(flatten)]
    inner: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    offset: usize,
}

impl<T> fmt::Debug for Paged<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paged")
            .field("base", &self.base)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<T: ApiRequest> ApiRequest for Paged<T> {
    type Response = T::Response;

    fn path(&self) -> String {
        self.base.path()
    }

    fn method(&self) -> http::Method {
        self.base.method()
    }

    fn body(&self) -> Option<impl Serialize> {
        self.base.body()
    }

    fn query(&self) -> Option<impl Serialize> {
        Some(PageQuery {
            inner: self.base.query(),
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// The page trailer returned alongside every listing.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// The total number of rows matching the request.
    pub total_rows: u64,
    /// Whether this page is the first one.
    #[serde(default)]
    pub is_first_page: bool,
    /// Whether this page is the last one.
    pub is_last_page: bool,
}

/// One page of a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PagedResponse<T> {
    /// The records on this page.
    pub list: Vec<T>,
    /// The page trailer.
    #[serde(rename = "pageInfo")]
    pub page_info: PageInfo,
}

impl<T: serde::de::DeserializeOwned> DataResponse for PagedResponse<T> {}

struct Paginator<F, E, R, T>
where
    F: Fn(Paged<R>) -> Result<R::Response, E>,
    R: ApiRequest<Response = PagedResponse<T>> + Clone,
{
    base_req: R,
    fetch_batch: F,
    batch: <Vec<T> as IntoIterator>::IntoIter,
    exhausted: bool,
    off: usize,
    limit: Option<usize>,
}

impl<F, E, R, T> Paginator<F, E, R, T>
where
    F: Fn(Paged<R>) -> Result<R::Response, E>,
    R: ApiRequest<Response = PagedResponse<T>> + Clone,
{
    fn page_size(&self) -> usize {
        match self.limit {
            Some(l) => (l - self.off).min(MAX_PAGE_SIZE),
            None => MAX_PAGE_SIZE,
        }
    }
}

impl<F, E, R, T> Iterator for Paginator<F, E, R, T>
where
    F: Fn(Paged<R>) -> Result<R::Response, E>,
    R: ApiRequest<Response = PagedResponse<T>> + Clone,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|l| self.off >= l) {
            return None;
        }

        if let Some(v) = self.batch.next() {
            self.off += 1;
            return Some(Ok(v));
        }

        if self.exhausted {
            return None;
        }

        let page_req = self
            .base_req
            .clone()
            .page(Some(self.page_size()), self.off);

        let PagedResponse { list, page_info } = match (self.fetch_batch)(page_req) {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };

        self.exhausted = page_info.is_last_page || list.is_empty();
        self.batch = list.into_iter();

        if let Some(v) = self.batch.next() {
            self.off += 1;
            Some(Ok(v))
        } else {
            None
        }
    }
}

/// Repeatedly make a request, fetching more results continuously by calling
/// `fetch_batch`.
pub fn paginate<F, E, R, T>(
    base_req: R,
    limit: Option<usize>,
    fetch_batch: F,
) -> impl Iterator<Item = Result<T, E>>
where
    F: Fn(Paged<R>) -> Result<R::Response, E>,
    R: ApiRequest<Response = PagedResponse<T>> + Clone,
{
    Paginator {
        fetch_batch,
        base_req,
        batch: Vec::new().into_iter(),
        exhausted: false,
        off: 0,
        limit,
    }
}

#[cfg(test)]
mod test {
    use std::convert::Infallible;

    use super::*;

    #[derive(Debug, Clone)]
    struct ListNumbers;

    impl ApiRequest for ListNumbers {
        type Response = PagedResponse<u64>;

        fn path(&self) -> String {
            "/numbers".to_string()
        }
    }

    // Serves pages of at most three numbers out of 0..total.
    fn fake_pages(
        total: u64,
    ) -> impl Fn(Paged<ListNumbers>) -> Result<PagedResponse<u64>, Infallible> {
        move |req| {
            let offset = req.offset as u64;
            let limit = req.limit.unwrap_or(MAX_PAGE_SIZE).min(3) as u64;
            let end = (offset + limit).min(total);

            Ok(PagedResponse {
                list: (offset..end).collect(),
                page_info: PageInfo {
                    total_rows: total,
                    is_first_page: offset == 0,
                    is_last_page: end >= total,
                },
            })
        }
    }

    #[test]
    fn paginates_to_exhaustion() {
        let all: Vec<u64> = paginate(ListNumbers, None, fake_pages(8))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(all, (0..8).collect::<Vec<u64>>());
    }

    #[test]
    fn respects_limit() {
        let some: Vec<u64> = paginate(ListNumbers, Some(5), fake_pages(100))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(some, (0..5).collect::<Vec<u64>>());
    }

    #[test]
    fn empty_listing() {
        let none: Vec<u64> = paginate(ListNumbers, None, fake_pages(0))
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(none.is_empty());
    }
}
