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

//! # cayenne
//!
//! Keeping a DynamoDB catalogue of chili-pepper products.
//!
//! Products arrive as newline-delimited JSON ([source]), are projected into a single-table layout
//! ([entities]), and are written either one atomic transaction at a time or in batches of up to
//! twenty-five ([load], [batch]). The table carries an aggregate item count alongside the products
//! ([counter]), which [unload] resets after sweeping the table & [query] reports next to its results.
//! All of this is written against the [storage::Backend] trait; [dynamodb] supplies the real thing.
pub mod batch;
pub mod counter;
pub mod dynamodb;
pub mod entities;
pub mod load;
pub mod query;
pub mod source;
pub mod storage;
pub mod unload;
pub mod util;
