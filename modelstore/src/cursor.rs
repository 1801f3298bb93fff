//! The Paging Iterator (spec §4.6's `getPaged`, §2's "Paging Iterator").
//!
//! Grounded on the teacher's synchronous `Cursor::next_n` batching, made
//! async: the driver's own [`mongodb::Cursor`] already implements
//! [`futures::Stream`], so paging here is a `try_next` loop that buffers
//! up to `batch_size` documents before handing them to the caller's
//! callback and awaiting it — the callback is itself a suspension point,
//! consistent with spec §5's scheduling model.

use std::future::Future;

use bson::Document;
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::Collection;

use crate::error::Result;
use crate::ident;

/// Summary returned once paging completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagedTotals {
    /// Total number of documents matching the filter.
    pub total: u64,
    /// The batch size paging was driven with.
    pub batch_size: u64,
    /// Number of pages `total` divides into at `batch_size`.
    pub pages: u64,
}

/// Drives `filter`/`sort` as a sequence of pages of at most `batch_size`
/// documents, invoking `callback` once per non-empty page with the
/// renamed-for-client documents, the 1-based page number, and the batch
/// size. Returns totals once the cursor is exhausted.
pub async fn get_paged<F, Fut>(
    collection: &Collection<Document>,
    filter: Document,
    sort: Option<Document>,
    batch_size: u64,
    mut callback: F,
) -> Result<PagedTotals>
where
    F: FnMut(Vec<Document>, u64, u64) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let total = collection.count_documents(filter.clone(), None).await?;

    let pages = if batch_size == 0 {
        0
    } else {
        total.div_ceil(batch_size)
    };

    let mut options = FindOptions::default();
    options.sort = sort;
    options.batch_size = u32::try_from(batch_size).ok();

    let mut cursor = collection.find(filter, options).await?;
    let mut buffer = Vec::with_capacity(batch_size as usize);
    let mut page_number = 0u64;

    while let Some(document) = cursor.try_next().await? {
        buffer.push(ident::rename_for_client(document));

        if buffer.len() as u64 >= batch_size && batch_size > 0 {
            page_number += 1;
            let page = std::mem::replace(&mut buffer, Vec::with_capacity(batch_size as usize));
            callback(page, page_number, batch_size).await?;
        }
    }

    if !buffer.is_empty() {
        page_number += 1;
        callback(buffer, page_number, batch_size).await?;
    }

    Ok(PagedTotals {
        total,
        batch_size,
        pages,
    })
}
