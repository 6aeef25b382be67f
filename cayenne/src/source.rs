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

//! # source
//!
//! Reading [Product]s from newline-delimited JSON.
//!
//! [Records] is a lazy iterator over the lines of its reader. Lines are taken as raw bytes, so a
//! line that isn't valid UTF-8 is just one more line that fails to parse: it's reported as
//! [Error::Parse] and the iteration carries on. A failure to read from the underlying stream is
//! reported as [Error::Read], after which callers are expected to give up (see [Error::is_fatal]).

use std::{
    fs::File,
    io::{BufRead, BufReader, Split},
    path::{Path, PathBuf},
};

use snafu::{prelude::*, Backtrace, IntoError};

use crate::entities::Product;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to open {path:?}: {source}"))]
    Open {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to parse line {line}: {source}"))]
    Parse {
        line: usize,
        source: serde_json::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("While reading line {line}, {source}"))]
    Read {
        line: usize,
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

impl Error {
    /// True if the stream can't be read any further
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Parse { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// One [Product], along with the (one-based) line on which it was found
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub line: usize,
    pub product: Product,
}

/// Lazy iterator over the [Product]s in a newline-delimited JSON stream
pub struct Records<R> {
    lines: Split<R>,
    line: usize,
    done: bool,
}

impl<R: BufRead> Records<R> {
    pub fn new(reader: R) -> Records<R> {
        Records {
            lines: reader.split(b'\n'),
            line: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let bytes = match self.lines.next()? {
                Ok(bytes) => bytes,
                Err(err) => {
                    // Once the reader has failed, there's no telling where we are in the stream
                    self.done = true;
                    return Some(Err(ReadSnafu {
                        line: self.line + 1,
                    }
                    .into_error(err)));
                }
            };
            self.line += 1;
            if bytes.trim_ascii().is_empty() {
                continue;
            }
            return Some(
                serde_json::from_slice::<Product>(&bytes)
                    .context(ParseSnafu { line: self.line })
                    .map(|product| Record {
                        line: self.line,
                        product,
                    }),
            );
        }
    }
}

/// Open `path` for reading [Product]s
pub fn open<P: AsRef<Path>>(path: P) -> Result<Records<BufReader<File>>> {
    Ok(Records::new(BufReader::new(File::open(&path).context(
        OpenSnafu {
            path: path.as_ref().to_path_buf(),
        },
    )?)))
}
