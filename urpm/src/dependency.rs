// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::evr::Evr;

/// Comparison operator of a versioned capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Less,
    LessEq,
    Equal,
    GreaterEq,
    Greater,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Less => "<",
            Op::LessEq => "<=",
            Op::Equal => "=",
            Op::GreaterEq => ">=",
            Op::Greater => ">",
        }
    }

    pub fn matches(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Op::Less => ord == Less,
            Op::LessEq => ord != Greater,
            Op::Equal => ord == Equal,
            Op::GreaterEq => ord != Less,
            Op::Greater => ord == Greater,
        }
    }
}

impl FromStr for Op {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Op::Less),
            "<=" | "=<" => Ok(Op::LessEq),
            "=" | "==" => Ok(Op::Equal),
            ">=" | "=>" => Ok(Op::GreaterEq),
            ">" => Ok(Op::Greater),
            _ => Err(ParseError(s.to_owned())),
        }
    }
}

/// A capability as found in provides/requires/obsoletes/conflicts tables.
///
/// Encoded as `name` or `name op evr`, e.g. `libfoo.so.2` or
/// `bash >= 5.0-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    pub name: String,
    pub constraint: Option<(Op, Evr)>,
}

impl Capability {
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }

    pub fn versioned(name: impl Into<String>, op: Op, evr: Evr) -> Self {
        Self {
            name: name.into(),
            constraint: Some((op, evr)),
        }
    }

    /// Does a provider of `name` at `evr` satisfy this capability?
    ///
    /// An unversioned provider satisfies any constraint on its name; this is
    /// RPM's promiscuous match for provides that carry no version.
    pub fn satisfied_by(&self, name: &str, evr: Option<&Evr>) -> bool {
        if self.name != name {
            return false;
        }
        match (&self.constraint, evr) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some((op, want)), Some(have)) => op.matches(have.cmp(want)),
        }
    }
}

impl FromStr for Capability {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError(s.to_owned()));
        }
        let mut parts = s.split_whitespace();
        let name = parts.next().ok_or_else(|| ParseError(s.to_owned()))?;
        match (parts.next(), parts.next()) {
            (None, _) => Ok(Capability::unversioned(name)),
            (Some(op), Some(version)) => {
                let op = op.parse()?;
                let evr = Evr::parse(version).map_err(|_| ParseError(s.to_owned()))?;
                Ok(Capability::versioned(name, op, evr))
            }
            (Some(_), None) => Err(ParseError(s.to_owned())),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            None => self.name.fmt(f),
            Some((op, evr)) => write!(f, "{} {} {evr}", self.name, op.as_str()),
        }
    }
}

#[derive(Debug, Error)]
#[error("malformed capability: {0}")]
pub struct ParseError(String);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_unversioned() {
        let c: Capability = "libssl.so.3()(64bit)".parse().unwrap();
        assert_eq!(c.name, "libssl.so.3()(64bit)");
        assert!(c.constraint.is_none());
    }

    #[test]
    fn parse_versioned_roundtrip() {
        for s in ["bash >= 5.0-1", "foo < 2:1.0", "baz = 3.1-4.mga10"] {
            let c: Capability = s.parse().unwrap();
            assert_eq!(c.to_string(), s);
        }
    }

    #[test]
    fn satisfaction() {
        let req: Capability = "foo >= 2.0".parse().unwrap();
        assert!(req.satisfied_by("foo", Some(&Evr::parse("2.1-1").unwrap())));
        assert!(req.satisfied_by("foo", Some(&Evr::parse("2.0").unwrap())));
        assert!(!req.satisfied_by("foo", Some(&Evr::parse("1.9-9").unwrap())));
        assert!(!req.satisfied_by("bar", Some(&Evr::parse("2.1").unwrap())));
        // unversioned provider matches any constraint
        assert!(req.satisfied_by("foo", None));
    }

    #[test]
    fn rejects_trailing_op() {
        assert!("foo >=".parse::<Capability>().is_err());
    }
}
