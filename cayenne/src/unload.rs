// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of cayenne.
//
// cayenne is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// cayenne is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with cayenne.  If not,
// see <http://www.gnu.org/licenses/>.

//! # unload
//!
//! Emptying the table.
//!
//! [pages] walks the table one scan page at a time; [unload] turns the products on each page into a
//! batch of deletes, then resets the aggregate counter to zero. The scan covers *everything*, but
//! the counter item is never deleted: the reset overwrites it.

use futures::{stream, Stream, StreamExt};
use snafu::{prelude::*, Backtrace, IntoError};
use tracing::{debug, error, info};

use crate::{
    counter::Counter,
    entities::ItemKey,
    storage::{self, Backend, ContinuationToken, WriteOp},
};

/// The most items we'll ask for in one scan page (so that each page fits in one `BatchWriteItem`)
pub const MAX_PAGE_SIZE: usize = 25;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Page sizes must be between 1 & {MAX_PAGE_SIZE}; got {size}"))]
    PageSize { size: usize, backtrace: Backtrace },
    #[snafu(display("Failed to scan page {page} of the table: {source}"))]
    Scan {
        page: usize,
        source: storage::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// Check that `size` is a page size we can delete in one go
pub fn check_page_size(size: usize) -> Result<usize> {
    ensure!((1..=MAX_PAGE_SIZE).contains(&size), PageSizeSnafu { size });
    Ok(size)
}

/// The tally of a single unload
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UnloadSummary {
    /// Non-empty pages retrieved
    pub pages: usize,
    /// Products submitted for deletion
    pub deleted: usize,
    /// Pages whose `BatchWriteItem` failed
    pub failed_pages: usize,
    /// Deletes the store handed back as unprocessed
    pub unprocessed: usize,
    /// Whether the counter was reset to zero
    pub counter_reset: bool,
}

enum ScanState {
    Scanning(Option<ContinuationToken>),
    Done,
}

/// Page through the keys of every item in the table, `page_size` at a time
///
/// The stream ends after the first empty page, or after the first page that comes back without a
/// continuation token. A scan failure is yielded as an error, after which the stream ends.
pub fn pages(
    backend: &dyn Backend,
    page_size: usize,
) -> impl Stream<Item = Result<Vec<ItemKey>>> + '_ {
    stream::unfold(
        (ScanState::Scanning(None), 0usize),
        move |(state, page)| async move {
            let token = match state {
                ScanState::Scanning(token) => token,
                ScanState::Done => return None,
            };
            match backend.scan_keys(page_size, token.as_ref()).await {
                Ok(p) if p.keys.is_empty() => None,
                Ok(p) => {
                    let next = match p.next {
                        Some(token) => ScanState::Scanning(Some(token)),
                        None => ScanState::Done,
                    };
                    Some((Ok(p.keys), (next, page + 1)))
                }
                Err(err) => Some((
                    Err(ScanSnafu { page: page + 1 }.into_error(err)),
                    (ScanState::Done, page + 1),
                )),
            }
        },
    )
}

/// Delete every item in the table, then reset the aggregate counter to zero
///
/// A page that can't be deleted is logged & skipped; a page that can't be *read* is fatal, and the
/// counter is left untouched. A page holding nothing but the counter item makes no delete call.
pub async fn unload(backend: &dyn Backend, page_size: usize) -> Result<UnloadSummary> {
    let page_size = check_page_size(page_size)?;
    let mut summary = UnloadSummary::default();
    let mut stream = std::pin::pin!(pages(backend, page_size));
    while let Some(keys) = stream.next().await {
        let keys = keys?;
        summary.pages += 1;
        let ops = keys
            .into_iter()
            .filter(ItemKey::is_product)
            .map(WriteOp::Delete)
            .collect::<Vec<_>>();
        let n = ops.len();
        if n == 0 {
            continue;
        }
        match backend.batch_write(&ops).await {
            Ok(outcome) => {
                debug!("Deleted page {} ({n} items)", summary.pages);
                summary.unprocessed += outcome.unprocessed;
            }
            Err(err) => {
                error!("Failed to delete page {}: {err}", summary.pages);
                summary.failed_pages += 1;
            }
        }
        summary.deleted += n;
        info!("Deleted {} items", summary.deleted);
    }

    let mut counter = Counter::new(backend);
    summary.counter_reset = match counter.reset().await {
        Ok(_) => true,
        Err(err) => {
            error!("{err}");
            false
        }
    };
    Ok(summary)
}
