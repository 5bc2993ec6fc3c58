use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::adapters::traits::{HistorySource, RawTransaction};
use crate::error::{DecodeError, ReconcileError, ReconcileResult};
use crate::ledger::models::{Chain, LedgerRecord, Truncation};
use crate::reconcile::retry::{with_backoff, RetryPolicy};

/// Lazy, finite sequence of decoded records, oldest first.
///
/// A scan that runs out of window before the account runs out of history
/// ends with `Err(ReconcileError::HistoryTruncated)`.
pub type RecordStream = BoxStream<'static, ReconcileResult<LedgerRecord>>;

/// How much history one scan may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for ScanWindow {
    fn default() -> Self {
        Self {
            page_size: 200,
            max_pages: 25,
        }
    }
}

/// Chain-specific decoding of one raw history item.
///
/// `Ok(None)` means the item is irrelevant (wrong type, failed transaction).
/// `Err` means it is malformed; the scanner logs and skips it either way.
pub trait RecordDecoder: Send + Sync {
    type Raw;

    fn decode(&self, raw: &Self::Raw) -> Result<Option<LedgerRecord>, DecodeError>;
}

#[derive(Debug, Clone, Default)]
struct PageState {
    cursor: Option<String>,
    fetched: u32,
    exhausted: bool,
}

/// Pages through an account's history within a [`ScanWindow`].
///
/// Every call starts again from the oldest item; no cursor is kept between
/// scans. Pages are fetched with bounded retry. A page that still fails ends
/// the stream with that error, and so does reaching `max_pages` while the
/// ledger still reports a next page: history is never cut short silently.
pub struct LedgerScanner<S> {
    source: Arc<S>,
    window: ScanWindow,
    retry: RetryPolicy,
}

impl<S> Clone for LedgerScanner<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            window: self.window,
            retry: self.retry,
        }
    }
}

impl<S> LedgerScanner<S>
where
    S: HistorySource + 'static,
{
    pub fn new(source: Arc<S>, window: ScanWindow, retry: RetryPolicy) -> Self {
        Self {
            source,
            window,
            retry,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Undecoded items, page by page.
    pub fn raw(&self, account: &str) -> BoxStream<'static, ReconcileResult<S::Raw>> {
        let source = self.source.clone();
        let window = self.window;
        let retry = self.retry;
        let account = account.to_string();

        stream::try_unfold(PageState::default(), move |state| {
            let source = source.clone();
            let account = account.clone();
            async move { next_page(source, &account, window, retry, state).await }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, ReconcileError>)))
        .try_flatten()
        .boxed()
    }

    /// Decoded records. Undecodable items are logged and skipped.
    pub fn scan<D>(&self, account: &str, decoder: Arc<D>) -> RecordStream
    where
        D: RecordDecoder<Raw = S::Raw> + 'static,
    {
        let chain = self.source.chain();

        self.raw(account)
            .try_filter_map(move |raw| future::ready(Ok(decode_or_skip(&*decoder, &raw, chain))))
            .boxed()
    }
}

async fn next_page<S>(
    source: Arc<S>,
    account: &str,
    window: ScanWindow,
    retry: RetryPolicy,
    state: PageState,
) -> ReconcileResult<Option<(Vec<S::Raw>, PageState)>>
where
    S: HistorySource,
{
    if state.exhausted {
        return Ok(None);
    }
    if state.fetched >= window.max_pages {
        let truncation = Truncation {
            chain: source.chain(),
            account: account.to_string(),
            pages: window.max_pages,
        };
        warn!("⚠️ {}", truncation);
        return Err(ReconcileError::HistoryTruncated(truncation));
    }

    let cursor = state.cursor.as_deref();
    let page = with_backoff(&retry, "fetch history page", || {
        source.fetch_page(account, cursor, window.page_size)
    })
    .await?;

    let exhausted = page.items.is_empty()
        || page.next_cursor.is_none()
        || page.next_cursor == state.cursor;

    debug!(
        "Fetched page {} of {} on {} ({} items)",
        state.fetched + 1,
        account,
        source.chain(),
        page.items.len()
    );

    Ok(Some((
        page.items,
        PageState {
            cursor: page.next_cursor,
            fetched: state.fetched + 1,
            exhausted,
        },
    )))
}

fn decode_or_skip<D>(decoder: &D, raw: &D::Raw, chain: Chain) -> Option<LedgerRecord>
where
    D: RecordDecoder + ?Sized,
    D::Raw: RawTransaction,
{
    match decoder.decode(raw) {
        Ok(record) => record,
        Err(e) => {
            warn!(
                raw_id = %raw.raw_id(),
                "⚠️ Skipping undecodable {} transaction: {}",
                chain,
                e
            );
            None
        }
    }
}
