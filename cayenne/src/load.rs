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

//! # load
//!
//! Bulk-loading [Product](crate::entities::Product)s into the table.
//!
//! Two strategies are offered:
//!
//! - [load_transactional] writes each record in its own `TransactWriteItems` call, bundled with a
//!   `+1` to the aggregate counter; the counter is exact so long as every transaction succeeds, and
//!   each failure costs only its own record.
//!
//! - [load_batched] runs the records through an [Accumulator] & submits each batch as a single
//!   `BatchWriteItem`. The counter is reconciled once, at the end, by the number of items
//!   *submitted* (whether or not the store accepted them all).
//!
//! In both cases, a line that won't parse (or that parses to an invalid product) is logged & skipped,
//! while a failure to read the input at all is fatal.

use snafu::{prelude::*, Backtrace};
use tracing::{debug, error, info, warn};

use crate::{
    batch::{self, Accumulator, Offer},
    counter::Counter,
    entities::StoredItem,
    source::{self, Record},
    storage::{Backend, WriteOp},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Bad batch size: {source}"))]
    BatchSize {
        #[snafu(backtrace)]
        source: batch::Error,
    },
    #[snafu(display("Giving-up on the load: {source}"))]
    Input {
        #[snafu(backtrace)]
        source: source::Error,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// The tally of a single load
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LoadSummary {
    /// Non-blank lines consumed from the input
    pub lines: usize,
    /// Lines that yielded a valid product
    pub accepted: usize,
    /// Lines that didn't parse, or parsed to something we won't store
    pub malformed: usize,
    /// Products dropped because their (name, store) was already pending in the same batch
    pub duplicates: usize,
    /// Items the store acknowledged writing
    pub written: usize,
    /// Items whose write failed outright
    pub failed: usize,
    /// `BatchWriteItem` calls made (zero for a transactional load)
    pub batches: usize,
    /// `BatchWriteItem` calls that failed
    pub failed_batches: usize,
    /// Items the store handed back as unprocessed
    pub unprocessed: usize,
    /// Net amount by which we asked the store to bump the counter
    pub submitted: usize,
    /// Whether the counter accounts for every write the store accepted
    pub counter_updated: bool,
}

impl std::fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} lines read, {} accepted ({} malformed, {} duplicates); {} written, {} failed, {} unprocessed in {} batches ({} failed); counter {}",
            self.lines,
            self.accepted,
            self.malformed,
            self.duplicates,
            self.written,
            self.failed,
            self.unprocessed,
            self.batches,
            self.failed_batches,
            if self.counter_updated {
                "up-to-date"
            } else {
                "NOT up-to-date"
            }
        )
    }
}

impl LoadSummary {
    /// Account for one item from the input; returns the [StoredItem] if there's anything to write
    fn take(&mut self, record: source::Result<Record>) -> Result<Option<StoredItem>> {
        let record = match record {
            Ok(record) => record,
            Err(err) if err.is_fatal() => return Err(err).context(InputSnafu),
            Err(err) => {
                self.lines += 1;
                self.malformed += 1;
                warn!("Skipping malformed input: {err}");
                return Ok(None);
            }
        };
        self.lines += 1;
        match StoredItem::from_product(record.product) {
            Ok(item) => {
                self.accepted += 1;
                Ok(Some(item))
            }
            Err(err) => {
                self.malformed += 1;
                warn!("Skipping line {}: {err}", record.line);
                Ok(None)
            }
        }
    }
}

/// Write each record in its own atomic group along with a `+1` to the aggregate counter
///
/// There's no de-duplication here: a product appearing twice in the input will be written twice,
/// and counted twice.
pub async fn load_transactional<I>(backend: &dyn Backend, records: I) -> Result<LoadSummary>
where
    I: IntoIterator<Item = source::Result<Record>>,
{
    let mut summary = LoadSummary::default();
    let mut counter = Counter::new(backend);
    for record in records {
        let Some(item) = summary.take(record)? else {
            continue;
        };
        match counter.put_counted(&item).await {
            Ok(_) => {
                debug!("Inserted {}", item.product_key());
                summary.written += 1;
                summary.submitted += 1;
            }
            Err(err) => {
                error!("{err}");
                summary.failed += 1;
            }
        }
    }
    summary.counter_updated = counter.unapplied() == 0;
    info!("Counter bumped by {} over this load", counter.applied());
    Ok(summary)
}

/// Write the records in batches of at most `batch_size`, then bump the counter once
///
/// Products are de-duplicated on (name, store) within each batch (the store would reject the
/// whole call otherwise), but not across batches.
pub async fn load_batched<I>(
    backend: &dyn Backend,
    records: I,
    batch_size: usize,
) -> Result<LoadSummary>
where
    I: IntoIterator<Item = source::Result<Record>>,
{
    let mut summary = LoadSummary::default();
    let mut acc = Accumulator::new(batch_size).context(BatchSizeSnafu)?;
    for record in records {
        let Some(item) = summary.take(record)? else {
            continue;
        };
        match acc.offer(item) {
            Offer::Buffered => (),
            Offer::Full(batch) => submit(backend, batch, &mut summary).await,
            Offer::Duplicate(key) => {
                info!("Dropping duplicate {key}");
                summary.duplicates += 1;
            }
        }
    }
    if let Some(batch) = acc.finish() {
        submit(backend, batch, &mut summary).await;
    }

    let mut counter = Counter::new(backend);
    summary.counter_updated = match counter.adjust(summary.submitted as i64).await {
        Ok(_) => true,
        Err(err) => {
            error!("{err}; the aggregate count is now off by {}", summary.submitted);
            false
        }
    };
    Ok(summary)
}

async fn submit(backend: &dyn Backend, batch: Vec<StoredItem>, summary: &mut LoadSummary) {
    let n = batch.len();
    let ops = batch.into_iter().map(WriteOp::Put).collect::<Vec<_>>();
    summary.batches += 1;
    summary.submitted += n;
    match backend.batch_write(&ops).await {
        Ok(outcome) => {
            debug!("Inserted a batch of {n} items");
            if outcome.unprocessed > 0 {
                warn!(
                    "{} of {n} items in batch {} went unprocessed",
                    outcome.unprocessed, summary.batches
                );
            }
            summary.written += n - outcome.unprocessed.min(n);
            summary.unprocessed += outcome.unprocessed;
        }
        Err(err) => {
            error!("Batch {} ({n} items) failed: {err}", summary.batches);
            summary.failed_batches += 1;
            summary.failed += n;
        }
    }
}
