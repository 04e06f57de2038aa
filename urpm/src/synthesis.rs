// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Synthesis index parser
//!
//! A synthesis blob is the compressed, line-oriented package index of one
//! media. Records are groups of `@tag@value[@value…]` lines terminated by
//! the `@info@` line:
//!
//! ```text
//! @provides@wget[= 1.21-1.mga9]@webclient
//! @requires@libc.so.6@libssl.so.3
//! @summary@Network download utility
//! @filesize@794356
//! @info@wget-1.21-1.mga9.x86_64@0@3043612@Networking/File transfer
//! ```
//!
//! Capabilities use the compact `name[op evr]` bracket encoding.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use thiserror::Error;

use crate::dependency::Capability;
use crate::evr::Nevra;
use crate::package::Meta;

/// Parse a synthesis stream into package metadata
pub fn parse(reader: impl Read) -> Result<Vec<Meta>, Error> {
    let reader = BufReader::new(reader);
    let mut packages = Vec::new();
    let mut pending = Pending::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('@');
        // Lines start with '@', so the first field is empty
        fields.next();
        let tag = fields.next().ok_or_else(|| Error::Malformed(idx + 1))?;

        match tag {
            "provides" => pending.provides = capabilities(fields)?,
            "requires" => pending.requires = capabilities(fields)?,
            "recommends" => pending.recommends = capabilities(fields)?,
            "suggests" => pending.suggests = capabilities(fields)?,
            "conflicts" => pending.conflicts = capabilities(fields)?,
            "obsoletes" => pending.obsoletes = capabilities(fields)?,
            "summary" => pending.summary = fields.collect::<Vec<_>>().join("@"),
            "filesize" => {
                pending.filesize = fields
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| Error::Malformed(idx + 1))?;
            }
            "info" => {
                let nevra = fields.next().ok_or_else(|| Error::Malformed(idx + 1))?;
                let epoch: u64 = fields
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| Error::Malformed(idx + 1))?;
                let size: u64 = fields
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or_else(|| Error::Malformed(idx + 1))?;
                let group = fields.next().unwrap_or_default();

                let mut nevra = Nevra::parse(nevra).map_err(|_| Error::Malformed(idx + 1))?;
                // The epoch rides in its own field, not in the nevra string
                nevra.evr.epoch = epoch;

                packages.push(pending.finish(nevra, size, group.to_owned()));
            }
            // Unknown tags are skipped so newer indexes stay readable
            _ => {}
        }
    }

    Ok(packages)
}

/// Parse a synthesis file, transparently decompressing `.cz`/`.xz`/`.lzma`
pub fn parse_file(path: &Path) -> Result<Vec<Meta>, Error> {
    let file = std::fs::File::open(path)?;
    if is_compressed(path) {
        parse(lzma_rust2::XzReader::new(file, true))
    } else {
        parse(file)
    }
}

fn is_compressed(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("cz" | "xz" | "lzma")
    )
}

fn capabilities<'a>(fields: impl Iterator<Item = &'a str>) -> Result<Vec<Capability>, Error> {
    fields
        .filter(|f| !f.is_empty())
        .map(parse_capability)
        .collect()
}

/// `name` or `name[op evr]`
fn parse_capability(item: &str) -> Result<Capability, Error> {
    match item.split_once('[') {
        Some((name, rest)) => {
            let inner = rest
                .strip_suffix(']')
                .ok_or_else(|| Error::Capability(item.to_owned()))?;
            // Bracket encoding may omit the space: `foo[>=1.2]`
            let spaced = if inner.contains(' ') {
                format!("{name} {inner}")
            } else {
                let split = inner
                    .find(|c: char| c != '<' && c != '>' && c != '=')
                    .ok_or_else(|| Error::Capability(item.to_owned()))?;
                format!("{name} {} {}", &inner[..split], &inner[split..])
            };
            spaced
                .parse()
                .map_err(|_| Error::Capability(item.to_owned()))
        }
        None => Ok(Capability::unversioned(item)),
    }
}

#[derive(Debug, Default)]
struct Pending {
    summary: String,
    filesize: u64,
    provides: Vec<Capability>,
    requires: Vec<Capability>,
    recommends: Vec<Capability>,
    suggests: Vec<Capability>,
    conflicts: Vec<Capability>,
    obsoletes: Vec<Capability>,
}

impl Pending {
    fn finish(&mut self, nevra: Nevra, size: u64, group: String) -> Meta {
        let pending = std::mem::take(self);
        Meta {
            nevra,
            summary: pending.summary,
            group,
            filesize: pending.filesize,
            size,
            provides: pending.provides,
            requires: pending.requires,
            recommends: pending.recommends,
            suggests: pending.suggests,
            conflicts: pending.conflicts,
            obsoletes: pending.obsoletes,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed synthesis line {0}")]
    Malformed(usize),
    #[error("malformed capability: {0}")]
    Capability(String),
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = "\
@provides@wget[= 1.21.4-3.mga10]@webclient
@requires@libc.so.6@libssl.so.3()(64bit)@openssl[>=3.0]
@recommends@ca-certificates
@summary@A wget with @ in its summary
@filesize@794356
@info@wget-1.21.4-3.mga10.x86_64@0@3043612@Networking/File transfer
@provides@curl
@requires@libc.so.6
@summary@Tool for transferring data
@filesize@350000
@info@curl-8.6.0-1.mga10.x86_64@1@900000@Networking/Other
";

    #[test]
    fn parses_records() {
        let metas = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(metas.len(), 2);

        let wget = &metas[0];
        assert_eq!(wget.name(), "wget");
        assert_eq!(wget.evr().version, "1.21.4");
        assert_eq!(wget.filesize, 794356);
        assert_eq!(wget.size, 3043612);
        assert_eq!(wget.group, "Networking/File transfer");
        assert_eq!(wget.summary, "A wget with @ in its summary");
        assert_eq!(wget.provides.len(), 2);
        assert_eq!(wget.requires.len(), 3);
        assert_eq!(
            wget.requires[2].to_string(),
            "openssl >= 3.0",
            "compact bracket form is normalised"
        );

        let curl = &metas[1];
        assert_eq!(curl.evr().epoch, 1);
        assert!(curl.recommends.is_empty(), "state resets between records");
    }

    #[test]
    fn rejects_broken_info() {
        assert!(parse("@info@nonsense@x@y@z\n".as_bytes()).is_err());
    }
}
