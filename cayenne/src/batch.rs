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

//! # batch
//!
//! Accumulating [StoredItem]s into groups small enough for `BatchWriteItem`.
//!
//! DynamoDB will take at most twenty-five requests in a single `BatchWriteItem` call, and will
//! reject the entire call if two of them name the same primary key. The [Accumulator] takes care
//! of both: it hands back a full batch every time it reaches capacity, and it silently drops any
//! item whose (name, store) it has already seen *in the current batch*. Once a batch is handed
//! back, the slate is wiped clean; the same product may well appear again in the next one.

use std::collections::HashSet;

use snafu::{prelude::*, Backtrace};
use tracing::trace;

use crate::entities::{ProductKey, StoredItem};

/// The most requests DynamoDB will accept in a single `BatchWriteItem` call
pub const MAX_BATCH_SIZE: usize = 25;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Batch sizes must be between 1 & {MAX_BATCH_SIZE}; got {size}"))]
    BatchSize { size: usize, backtrace: Backtrace },
}

type Result<T> = std::result::Result<T, Error>;

/// Check that `size` is something DynamoDB will accept
pub fn check_batch_size(size: usize) -> Result<usize> {
    ensure!((1..=MAX_BATCH_SIZE).contains(&size), BatchSizeSnafu { size });
    Ok(size)
}

/// What became of an item handed to [Accumulator::offer]
#[derive(Debug, PartialEq)]
pub enum Offer {
    /// The item is pending; the batch isn't full yet
    Buffered,
    /// The item completed a batch; here it is
    Full(Vec<StoredItem>),
    /// An item with the same (name, store) is already pending; this one was dropped
    Duplicate(ProductKey),
}

/// Buffers [StoredItem]s into batches, de-duplicating within each
#[derive(Debug)]
pub struct Accumulator {
    capacity: usize,
    pending: Vec<StoredItem>,
    seen: HashSet<ProductKey>,
}

impl Accumulator {
    pub fn new(capacity: usize) -> Result<Accumulator> {
        let capacity = check_batch_size(capacity)?;
        Ok(Accumulator {
            capacity,
            pending: Vec::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        })
    }
    pub fn len(&self) -> usize {
        self.pending.len()
    }
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
    pub fn offer(&mut self, item: StoredItem) -> Offer {
        let key = item.product_key();
        if self.seen.contains(&key) {
            return Offer::Duplicate(key);
        }
        trace!("buffering {key}");
        self.seen.insert(key);
        self.pending.push(item);
        if self.pending.len() < self.capacity {
            Offer::Buffered
        } else {
            self.seen.clear();
            Offer::Full(std::mem::replace(
                &mut self.pending,
                Vec::with_capacity(self.capacity),
            ))
        }
    }
    /// End-of-stream: yield whatever's left, if anything
    pub fn finish(self) -> Option<Vec<StoredItem>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending)
        }
    }
}
