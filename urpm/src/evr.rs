// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! RPM version ordering
//!
//! Implements the full rpmvercmp semantics: epoch first, then version and
//! release compared segment-wise with numeric segments ordered as integers,
//! alphabetic segments as strings, and numeric sorting before alphabetic at
//! the same position. `~` sorts before everything, including end of string.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Compare two RPM version fragments (a version *or* a release, not both)
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut i = 0;
    let mut j = 0;

    while i < a.len() || j < b.len() {
        // Separators carry no ordering weight
        while i < a.len() && !a[i].is_ascii_alphanumeric() && a[i] != b'~' {
            i += 1;
        }
        while j < b.len() && !b[j].is_ascii_alphanumeric() && b[j] != b'~' {
            j += 1;
        }

        // Tilde sorts lower than anything, even the end of the string
        let a_tilde = i < a.len() && a[i] == b'~';
        let b_tilde = j < b.len() && b[j] == b'~';
        match (a_tilde, b_tilde) {
            (true, true) => {
                i += 1;
                j += 1;
                continue;
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        if i >= a.len() || j >= b.len() {
            break;
        }

        let numeric = a[i].is_ascii_digit();
        let seg_a = take_segment(a, &mut i, numeric);
        let b_numeric = b[j].is_ascii_digit();
        let seg_b = take_segment(b, &mut j, b_numeric);

        match (seg_a, seg_b) {
            (Segment::Num(x), Segment::Num(y)) => match compare_numeric(x, y) {
                Ordering::Equal => {}
                other => return other,
            },
            (Segment::Alpha(x), Segment::Alpha(y)) => match x.cmp(y) {
                Ordering::Equal => {}
                other => return other,
            },
            // Numeric sorts before alphabetic at the same position
            (Segment::Num(_), Segment::Alpha(_)) => return Ordering::Less,
            (Segment::Alpha(_), Segment::Num(_)) => return Ordering::Greater,
        }
    }

    (a.len() - i).cmp(&(b.len() - j))
}

enum Segment<'a> {
    Num(&'a [u8]),
    Alpha(&'a [u8]),
}

fn take_segment<'a>(s: &'a [u8], pos: &mut usize, numeric: bool) -> Segment<'a> {
    let start = *pos;
    if numeric {
        while *pos < s.len() && s[*pos].is_ascii_digit() {
            *pos += 1;
        }
        Segment::Num(&s[start..*pos])
    } else {
        while *pos < s.len() && s[*pos].is_ascii_alphabetic() {
            *pos += 1;
        }
        Segment::Alpha(&s[start..*pos])
    }
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = trim_zeros(a);
    let b = trim_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn trim_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|c| *c != b'0').unwrap_or(s.len());
    &s[start..]
}

/// The orderable portion of a package identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Evr {
    pub epoch: u64,
    pub version: String,
    pub release: String,
}

impl Evr {
    pub fn new(epoch: u64, version: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release: release.into(),
        }
    }

    /// Parse `[epoch:]version[-release]`
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => (
                e.parse::<u64>().map_err(|_| ParseError(s.to_owned()))?,
                rest,
            ),
            None => (0, s),
        };
        if rest.is_empty() {
            return Err(ParseError(s.to_owned()));
        }
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_owned(), r.to_owned()),
            None => (rest.to_owned(), String::new()),
        };
        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// `version-release` without the epoch, as used in filenames
    pub fn version_release(&self) -> String {
        format!("{}-{}", self.version, self.release)
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| rpmvercmp(&self.release, &other.release))
    }
}

/// Name, Epoch, Version, Release, Architecture
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nevra {
    pub name: String,
    pub evr: Evr,
    pub arch: String,
}

impl Nevra {
    pub fn new(name: impl Into<String>, evr: Evr, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evr,
            arch: arch.into(),
        }
    }

    /// Parse `name-[epoch:]version-release.arch`
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let (rest, arch) = s.rsplit_once('.').ok_or_else(|| ParseError(s.to_owned()))?;
        let (rest, release) = rest
            .rsplit_once('-')
            .ok_or_else(|| ParseError(s.to_owned()))?;
        let (name, version) = rest
            .rsplit_once('-')
            .ok_or_else(|| ParseError(s.to_owned()))?;
        let (epoch, version) = match version.split_once(':') {
            Some((e, v)) => (
                e.parse::<u64>().map_err(|_| ParseError(s.to_owned()))?,
                v,
            ),
            None => (0, version),
        };
        if name.is_empty() || version.is_empty() || release.is_empty() || arch.is_empty() {
            return Err(ParseError(s.to_owned()));
        }
        Ok(Self {
            name: name.to_owned(),
            evr: Evr::new(epoch, version, release),
            arch: arch.to_owned(),
        })
    }

    /// RPM payload filename, epoch omitted by convention
    pub fn filename(&self) -> String {
        format!(
            "{}-{}-{}.{}.rpm",
            self.name, self.evr.version, self.evr.release, self.arch
        )
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.evr, self.arch)
    }
}

#[derive(Debug, Error)]
#[error("malformed version: {0}")]
pub struct ParseError(String);

#[cfg(test)]
mod test {
    use super::*;

    fn cmp(a: &str, b: &str) -> Ordering {
        rpmvercmp(a, b)
    }

    #[test]
    fn vercmp_basics() {
        assert_eq!(cmp("1.0", "1.0"), Ordering::Equal);
        assert_eq!(cmp("1.0", "2.0"), Ordering::Less);
        assert_eq!(cmp("2.0.1", "2.0"), Ordering::Greater);
        assert_eq!(cmp("10", "9"), Ordering::Greater);
        assert_eq!(cmp("1.05", "1.5"), Ordering::Equal);
    }

    #[test]
    fn vercmp_alpha_vs_numeric() {
        // Numeric sorts before alphabetic at the same position
        assert_eq!(cmp("1.0rc1", "1.0.1"), Ordering::Greater);
        assert_eq!(cmp("1.0.1", "1.0rc1"), Ordering::Less);
        assert_eq!(cmp("abc", "1"), Ordering::Greater);
        assert_eq!(cmp("1", "abc"), Ordering::Less);
        assert_eq!(cmp("alpha", "beta"), Ordering::Less);
        // More segments still wins when the shared prefix ties
        assert_eq!(cmp("1.0a", "1.0"), Ordering::Greater);
    }

    #[test]
    fn vercmp_tilde() {
        assert_eq!(cmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(cmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(cmp("1.0~~", "1.0~"), Ordering::Less);
    }

    #[test]
    fn vercmp_separators() {
        assert_eq!(cmp("1.0.1", "1_0_1"), Ordering::Equal);
        assert_eq!(cmp("2.0.1a", "2.0.1.a"), Ordering::Equal);
    }

    #[test]
    fn evr_ordering() {
        let a = Evr::parse("1:1.0-1").unwrap();
        let b = Evr::parse("2.0-1").unwrap();
        assert!(a > b, "epoch dominates");

        let a = Evr::parse("5.2.21-1.mga10").unwrap();
        let b = Evr::parse("5.2.21-2.mga10").unwrap();
        assert!(a < b);
    }

    #[test]
    fn evr_display_roundtrip() {
        for s in ["1.0-1", "2:4.1.0-1.fc41", "0.9"] {
            assert_eq!(Evr::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn nevra_parse() {
        let n = Nevra::parse("bash-completion-2.11-1.mga9.noarch").unwrap();
        assert_eq!(n.name, "bash-completion");
        assert_eq!(n.evr.version, "2.11");
        assert_eq!(n.evr.release, "1.mga9");
        assert_eq!(n.arch, "noarch");
        assert_eq!(n.filename(), "bash-completion-2.11-1.mga9.noarch.rpm");

        let n = Nevra::parse("foo-1:2.0-3.x86_64").unwrap();
        assert_eq!(n.evr.epoch, 1);
        assert_eq!(n.to_string(), "foo-1:2.0-3.x86_64");
    }

    #[test]
    fn nevra_rejects_garbage() {
        assert!(Nevra::parse("not-a-nevra").is_err());
        assert!(Nevra::parse("").is_err());
    }
}
