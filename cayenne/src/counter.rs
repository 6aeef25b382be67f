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

//! # counter
//!
//! Maintaining the aggregate item count.
//!
//! The table carries a single, well-known item (`METADATA`/`COUNTER`) whose `count` attribute is
//! meant to equal the number of products in the table. Keeping it so is the caller's job: every
//! net change to the product set has to be matched by exactly one update here. Relative updates are
//! `ADD`s on the store side, so the item springs into existence the first time it's touched.
//!
//! Nothing here retries. If an update fails, the count is off by that much until the next unload
//! resets it. To make the damage visible, [Counter] keeps a ledger of every update it issued in
//! this run, & whether the store took it. An update bundled with its write in one atomic group
//! can't drift: if it fails, the write failed with it.

use snafu::{prelude::*, Backtrace};
use tracing::debug;

use crate::{
    entities::{ProductKey, StoredItem},
    storage::{self, Backend},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to read the aggregate counter: {source}"))]
    Fetch {
        source: storage::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to write {key} along with its counter update: {source}"))]
    Put {
        key: ProductKey,
        source: storage::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to apply {update} to the aggregate counter: {source}"))]
    Update {
        update: CounterUpdate,
        source: storage::Error,
        backtrace: Backtrace,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// A change to the aggregate counter
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CounterUpdate {
    /// Add this (signed) amount to the current count
    Add(i64),
    /// Overwrite the current count
    Set(i64),
}

impl std::fmt::Display for CounterUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterUpdate::Add(delta) => write!(f, "ADD {delta}"),
            CounterUpdate::Set(value) => write!(f, "SET {value}"),
        }
    }
}

/// One line in the [Counter]'s ledger
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LedgerEntry {
    pub update: CounterUpdate,
    /// Whether the store accepted the update
    pub applied: bool,
    /// Whether the update went in the same atomic group as the write it accounts for
    pub bundled: bool,
}

/// Issues updates against the aggregate counter, recording each in an append-only ledger
pub struct Counter<'a> {
    backend: &'a dyn Backend,
    ledger: Vec<LedgerEntry>,
}

impl<'a> Counter<'a> {
    pub fn new(backend: &'a dyn Backend) -> Counter<'a> {
        Counter {
            backend,
            ledger: Vec::new(),
        }
    }
    /// Add `delta` (which may be negative) to the count
    pub async fn adjust(&mut self, delta: i64) -> Result<()> {
        self.apply(CounterUpdate::Add(delta)).await
    }
    /// Reset the count to zero, unconditionally
    pub async fn reset(&mut self) -> Result<()> {
        self.apply(CounterUpdate::Set(0)).await
    }
    /// Write `item` & bump the count by one in a single atomic group
    pub async fn put_counted(&mut self, item: &StoredItem) -> Result<()> {
        let update = CounterUpdate::Add(1);
        let res = self.backend.put_with_counter(item, update).await;
        self.record(update, res.is_ok(), true);
        res.context(PutSnafu {
            key: item.product_key(),
        })
    }
    /// Read the count as the store has it
    pub async fn fetch(&self) -> Result<Option<i64>> {
        self.backend.get_counter().await.context(FetchSnafu)
    }
    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }
    /// The net change the store has accepted since the last successful reset (or since the start
    /// of the run, if there wasn't one)
    pub fn applied(&self) -> i64 {
        self.ledger
            .iter()
            .filter(|e| e.applied)
            .fold(0, |acc, e| match e.update {
                CounterUpdate::Add(delta) => acc + delta,
                CounterUpdate::Set(_) => 0,
            })
    }
    /// The net change that was attempted but never made it to the store, apart from its write;
    /// this is how far the count has drifted during this run.
    pub fn unapplied(&self) -> i64 {
        self.ledger
            .iter()
            .filter(|e| !e.applied && !e.bundled)
            .map(|e| match e.update {
                CounterUpdate::Add(delta) => delta,
                CounterUpdate::Set(_) => 0,
            })
            .sum()
    }
    async fn apply(&mut self, update: CounterUpdate) -> Result<()> {
        let res = self.backend.update_counter(update).await;
        self.record(update, res.is_ok(), false);
        res.context(UpdateSnafu { update })
    }
    fn record(&mut self, update: CounterUpdate, applied: bool, bundled: bool) {
        debug!("counter {update} (applied: {applied}, bundled: {bundled})");
        self.ledger.push(LedgerEntry {
            update,
            applied,
            bundled,
        });
    }
}
