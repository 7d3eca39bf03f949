use std::future::Future;

use crate::error::Result;

/// Largest page either remote accepts.
pub const PAGE_SIZE: usize = 100;

pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }
}

/// Follow cursors until the collection is exhausted.
///
/// `fetch` receives the cursor of the previous page (`None` first) and the
/// requested page size. Stops on a short page, an empty page or a missing
/// cursor. A collection of exactly `k * page_size` items costs one extra
/// request that comes back empty.
pub async fn fetch_all<T, F, Fut>(page_size: usize, fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>, usize) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    walk(page_size, true, fetch).await
}

/// Like [`fetch_all`], for remotes that may hand out short pages before the
/// last one. Only an empty page or a missing cursor ends the walk, so the
/// page function must drop the cursor on the page the remote flags as last.
pub async fn fetch_all_until_last<T, F, Fut>(page_size: usize, fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>, usize) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    walk(page_size, false, fetch).await
}

async fn walk<T, F, Fut>(page_size: usize, stop_on_short: bool, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>, usize) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = None;

    loop {
        let page = fetch(cursor.take(), page_size).await?;
        let count = page.items.len();
        items.extend(page.items);

        if count == 0 || (stop_on_short && count < page_size) {
            break;
        }
        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    Ok(items)
}
