// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Files index parser
//!
//! Streaming parser for the per-media files index, which lists every file
//! of every package:
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <media_info><files fn="package-1.0-1.mga9.x86_64">
//! /usr/bin/foo
//! /usr/lib64/libfoo.so
//! </files><files fn="other-2.0-1.mga9.noarch">
//! /etc/other.conf
//! </files></media_info>
//! ```
//!
//! Real indexes run to millions of lines, so packages are yielded one at a
//! time and memory stays flat.

use std::io::{BufRead, BufReader, Lines, Read};
use std::path::Path;

use thiserror::Error;

/// One package worth of files
pub type Entry = (String, Vec<String>);

/// Iterate `(nevra, files)` pairs out of a files index stream
pub fn parse<R: Read>(reader: R) -> Parser<R> {
    Parser {
        lines: BufReader::new(reader).lines(),
        current: None,
        files: Vec::new(),
        pending: Vec::new(),
    }
}

/// Open a files index on disk, decompressing `.lzma`/`.xz`
pub fn parse_file(
    path: &Path,
) -> Result<Parser<Box<dyn Read + Send>>, std::io::Error> {
    let file = std::fs::File::open(path)?;
    let reader: Box<dyn Read + Send> = if matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("lzma" | "xz")
    ) {
        Box::new(lzma_rust2::XzReader::new(file, true))
    } else {
        Box::new(file)
    };
    Ok(parse(reader))
}

pub struct Parser<R: Read> {
    lines: Lines<BufReader<R>>,
    current: Option<String>,
    files: Vec<String>,
    /// Entries completed while scanning one physical line
    pending: Vec<Entry>,
}

impl<R: Read> Parser<R> {
    /// Process one line; `<files>` open and close tags may share a line
    fn feed(&mut self, line: &str) {
        let mut rest = line.trim();
        loop {
            if self.current.is_some() {
                match rest.find("</files>") {
                    Some(end) => {
                        let text = &rest[..end];
                        if !text.is_empty() {
                            self.files.push(text.to_owned());
                        }
                        let nevra = self.current.take().unwrap_or_default();
                        self.pending.push((nevra, std::mem::take(&mut self.files)));
                        rest = &rest[end + "</files>".len()..];
                    }
                    None => {
                        if !rest.is_empty() {
                            self.files.push(rest.to_owned());
                        }
                        return;
                    }
                }
            } else {
                let Some(start) = rest.find("<files fn=\"") else {
                    return;
                };
                let after = &rest[start + "<files fn=\"".len()..];
                let Some(quote) = after.find('"') else {
                    return;
                };
                self.current = Some(after[..quote].to_owned());
                match after[quote..].find('>') {
                    Some(gt) => rest = &after[quote + gt + 1..],
                    None => return,
                }
            }
        }
    }
}

impl<R: Read> Iterator for Parser<R> {
    type Item = Result<Entry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.pending.is_empty() {
                return Some(Ok(self.pending.remove(0)));
            }
            match self.lines.next() {
                Some(Ok(line)) => self.feed(&line),
                Some(Err(e)) => return Some(Err(Error::Io(e))),
                None => return None,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<media_info><files fn="wget-1.21-1.mga9.x86_64">
/usr/bin/wget
/usr/share/man/man1/wget.1.xz
</files><files fn="empty-pkg-1.0-1.mga9.noarch">
</files><files fn="tail-2.0-1.mga9.noarch">
/etc/tail.conf
</files></media_info>"#;

    #[test]
    fn streams_entries() {
        let entries: Vec<_> = parse(SAMPLE.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "wget-1.21-1.mga9.x86_64");
        assert_eq!(
            entries[0].1,
            vec!["/usr/bin/wget", "/usr/share/man/man1/wget.1.xz"]
        );
        assert!(entries[1].1.is_empty());
        assert_eq!(entries[2].1, vec!["/etc/tail.conf"]);
    }

    #[test]
    fn single_line_document() {
        let doc = r#"<media_info><files fn="a-1-1.noarch">/f1</files><files fn="b-1-1.noarch">/f2</files></media_info>"#;
        let entries: Vec<_> = parse(doc.as_bytes()).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, vec!["/f1"]);
        assert_eq!(entries[1].0, "b-1-1.noarch");
    }
}
