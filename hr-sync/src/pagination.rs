//! Lazy walk over every page of one sync run.

use errors::UpstreamError;
use futures_util::Stream;
use futures_util::stream;
use hcp_core::{EmployeeSource, Page};

#[derive(Debug, Clone, Copy)]
struct Cursor {
    next: u32,
    last: Option<u32>
}

/// Pages `1..=last_page` of the listing for `date`, fetched one at a time in
/// increasing order.
///
/// `last_page` is taken from page 1; a value below 1 means a single page.
/// Nothing is fetched until the stream is polled, and the stream ends right
/// after yielding the first error.
pub fn fetch_all<'a>(
    source: &'a dyn EmployeeSource,
    date: &'a str
) -> impl Stream<Item = Result<Page, UpstreamError>> + Send + 'a {
    let start = Some(Cursor { next: 1, last: None });

    stream::try_unfold(start, move |cursor| async move {
        let Some(cursor) = cursor else {
            return Ok(None);
        };

        let page = source.fetch_page(date, cursor.next).await?;
        let last = cursor
            .last
            .unwrap_or_else(|| page.pagination.last_page.max(1));

        let following = (cursor.next < last).then_some(Cursor {
            next: cursor.next + 1,
            last: Some(last)
        });

        Ok(Some((page, following)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use hcp_core::Pagination;
    use testing::ScriptedEmployeeSource;

    fn page(current: u32, last: u32) -> Page {
        Page {
            data: vec![serde_json::json!({"name": format!("p{current}")})],
            pagination: Pagination {
                current_page: current,
                last_page: last,
                total: u64::from(last)
            }
        }
    }

    #[tokio::test]
    async fn test_fetches_every_page_in_order() {
        let source = ScriptedEmployeeSource::new(vec![page(1, 3), page(2, 3), page(3, 3)]);
        let pages: Vec<_> = fetch_all(&source, "2026-01-05").collect().await;

        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(Result::is_ok));
        let requested: Vec<u32> = source.requested().into_iter().map(|(_, p)| p).collect();
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_zero_last_page_is_single_page() {
        let source = ScriptedEmployeeSource::new(vec![page(1, 0)]);
        let pages: Vec<_> = fetch_all(&source, "d").collect().await;
        assert_eq!(pages.len(), 1);
        assert_eq!(source.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_ends_after_first_error() {
        let source =
            ScriptedEmployeeSource::new(vec![page(1, 4), page(2, 4), page(3, 4), page(4, 4)])
                .failing_on(2);
        let pages: Vec<_> = fetch_all(&source, "d").collect().await;

        assert_eq!(pages.len(), 2);
        assert!(pages[0].is_ok());
        assert!(pages[1].is_err());
        assert_eq!(source.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_fetched_until_polled() {
        let source = ScriptedEmployeeSource::new(vec![page(1, 1)]);
        let stream = fetch_all(&source, "d");
        assert!(source.requested().is_empty());
        drop(stream);
    }
}
