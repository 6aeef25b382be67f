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

//! # util
//!
//! Odds & ends for turning command-line arguments & configuration items into things the
//! [dynamodb](crate::dynamodb) module can use.

use std::{fmt::Display, str::FromStr};

use either::Either;
use itertools::Itertools;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tap::Pipe;
use url::Url;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          exactly_two                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct ExactlyTwoError<T: std::iter::Iterator> {
    #[allow(clippy::type_complexity)]
    cause: Option<Either<T::Item, (T::Item, T::Item, T::Item)>>,
}

impl<T: std::iter::Iterator> Display for ExactlyTwoError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(Either::Left(_)) => write!(f, "expected two elements; got one"),
            Some(Either::Right(_)) => write!(f, "expected two elements; got three or more"),
            None => write!(f, "expected two elements; got none"),
        }
    }
}

/// Pull exactly two items out of `iter`, or fail
pub fn exactly_two<T>(mut iter: T) -> std::result::Result<(T::Item, T::Item), ExactlyTwoError<T>>
where
    T: std::iter::Iterator,
{
    match iter.next() {
        Some(first) => match iter.next() {
            Some(second) => match iter.next() {
                Some(third) => Err(ExactlyTwoError {
                    cause: Some(Either::Right((first, second, third))),
                }),
                None => Ok((first, second)),
            },
            None => Err(ExactlyTwoError {
                cause: Some(Either::Left(first)),
            }),
        },
        None => Err(ExactlyTwoError { cause: None }),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        AWS credentials                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// AWS credentials: key ID & secret key, given as "key-id,secret"
// Not sure that the key ID should be secret, but why not?
#[derive(Clone, Debug)]
pub struct Credentials(pub (SecretString, SecretString));

#[derive(Debug)]
pub struct BadCredentials;

impl Display for BadCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "credentials must be given as \"key-id,secret\"")
    }
}

impl std::error::Error for BadCredentials {}

impl FromStr for Credentials {
    type Err = BadCredentials;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .pipe(exactly_two)
            .map_err(|_| BadCredentials)?
            .pipe(|(id, secret)| Credentials((id.into(), secret.into())))
            .pipe(Ok)
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse::<Credentials>()
            .map_err(<D::Error as serde::de::Error>::custom)
    }
}

impl clap::builder::ValueParserFactory for Credentials {
    type Parser = CredentialsParser;

    fn value_parser() -> Self::Parser {
        CredentialsParser
    }
}

#[derive(Clone, Debug)]
pub struct CredentialsParser;

impl clap::builder::TypedValueParser for CredentialsParser {
    type Value = Credentials;

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> std::result::Result<Self::Value, clap::Error> {
        use clap::error::ErrorKind;
        value
            .to_str()
            .ok_or(clap::Error::new(ErrorKind::InvalidValue))?
            .parse::<Credentials>()
            .map_err(|_| clap::Error::new(ErrorKind::WrongNumberOfValues))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                finding DynamoDB on the network                                 //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Where to find DynamoDB: either an AWS region, or one or more endpoint URLs (for DynamoDB Local,
/// say, or ScyllaDB's Alternator interface)
#[derive(Clone, Debug, PartialEq)]
pub struct DynamoLocation(pub Either<String, Vec<Url>>);

impl Default for DynamoLocation {
    fn default() -> Self {
        DynamoLocation(Either::Left(crate::dynamodb::DEFAULT_REGION.to_owned()))
    }
}

impl FromStr for DynamoLocation {
    type Err = url::ParseError;

    /// A single token that doesn't parse as an URL is taken to be a region; anything else is a
    /// comma-separated list of URLs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vals = s.split(',').map(str::trim).collect::<Vec<&str>>();
        match vals.iter().exactly_one() {
            Ok(s) => Ok(DynamoLocation(match Url::parse(s) {
                Ok(url) => Either::Right(vec![url]),
                Err(_) => Either::Left(s.to_string()),
            })),
            Err(_) => vals
                .iter()
                .map(|s| Url::parse(s))
                .collect::<std::result::Result<Vec<Url>, _>>()
                .map(|urls| DynamoLocation(Either::Right(urls))),
        }
    }
}

impl<'de> Deserialize<'de> for DynamoLocation {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<Url>),
        }
        match Repr::deserialize(deserializer)? {
            Repr::One(s) => s
                .parse::<DynamoLocation>()
                .map_err(<D::Error as serde::de::Error>::custom),
            Repr::Many(urls) => Ok(DynamoLocation(Either::Right(urls))),
        }
    }
}

impl clap::builder::ValueParserFactory for DynamoLocation {
    type Parser = DynamoLocationParser;

    fn value_parser() -> Self::Parser {
        DynamoLocationParser
    }
}

#[derive(Clone, Debug)]
pub struct DynamoLocationParser;

impl clap::builder::TypedValueParser for DynamoLocationParser {
    type Value = DynamoLocation;

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> std::result::Result<Self::Value, clap::Error> {
        use clap::error::ErrorKind;
        value
            .to_str()
            .ok_or(clap::Error::new(ErrorKind::InvalidValue))?
            .parse::<DynamoLocation>()
            .map_err(|_| clap::Error::new(ErrorKind::InvalidValue))
    }
}
