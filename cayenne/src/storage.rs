// Copyright (C) 2024-2025 Michael Herstine <sp1ff@pobox.com>
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

//! # storage
//!
//! Abstractions for the cayenne storage layer.
//!
//! The load, unload & query logic is written against [Backend], which is about as thin a wrapper
//! over the DynamoDB operations we need as I could make it while still speaking in terms of
//! [StoredItem]s rather than attribute maps. The production implementation is
//! [dynamodb::Client](crate::dynamodb::Client); the tests use an in-memory implementation.

use async_trait::async_trait;

use crate::{
    counter::CounterUpdate,
    entities::{ItemKey, StoredItem},
};

#[derive(Debug)]
pub struct Error {
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error {
            source: Box::new(err),
        }
    }
}

/// Opaque cursor marking where the next page of a scan should begin
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContinuationToken(ItemKey);

impl ContinuationToken {
    pub fn new(last_evaluated: ItemKey) -> ContinuationToken {
        ContinuationToken(last_evaluated)
    }
    pub fn last_evaluated(&self) -> &ItemKey {
        &self.0
    }
}

/// One page of a table scan
#[derive(Clone, Debug, Default)]
pub struct Page {
    /// The keys of the items on this page
    pub keys: Vec<ItemKey>,
    /// Where to pick-up next time; `None` means this was the last page
    pub next: Option<ContinuationToken>,
}

/// A single request in a `BatchWriteItem` call
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Put(StoredItem),
    Delete(ItemKey),
}

/// What the store had to say about a batch it accepted
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BatchOutcome {
    /// The number of requests the store declined to process this time around
    pub unprocessed: usize,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Write `item` & apply `update` to the aggregate counter, atomically: either both happen, or
    /// neither does.
    async fn put_with_counter(&self, item: &StoredItem, update: CounterUpdate)
        -> Result<(), Error>;
    /// Submit up to twenty-five puts and/or deletes in one unconditional call. There is no
    /// atomicity across the batch.
    async fn batch_write(&self, ops: &[WriteOp]) -> Result<BatchOutcome, Error>;
    /// Apply `update` to the aggregate counter, creating it if need be
    async fn update_counter(&self, update: CounterUpdate) -> Result<(), Error>;
    /// Read the aggregate counter; `None` means it doesn't exist (yet)
    async fn get_counter(&self) -> Result<Option<i64>, Error>;
    /// Retrieve the keys of at most `limit` items in the table, beginning just after `start` (or at
    /// the beginning of the table, if `start` is `None`)
    async fn scan_keys(
        &self,
        limit: usize,
        start: Option<&ContinuationToken>,
    ) -> Result<Page, Error>;
    /// Retrieve every item in the pepper category, optionally restricted to those whose lower-cased
    /// name contains `name_contains` (which the caller must have lower-cased).
    async fn query_category(&self, name_contains: Option<&str>)
        -> Result<Vec<StoredItem>, Error>;
}
