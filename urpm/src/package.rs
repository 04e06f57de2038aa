// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use crate::dependency::Capability;
use crate::evr::{Evr, Nevra};

pub use crate::evr::ParseError;

/// Full metadata for one package in a media index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub nevra: Nevra,
    /// Brief one line summary of the package
    pub summary: String,
    /// rpm group classification
    pub group: String,
    /// Size of the .rpm payload on the server
    pub filesize: u64,
    /// Installed size
    pub size: u64,
    pub provides: Vec<Capability>,
    pub requires: Vec<Capability>,
    pub recommends: Vec<Capability>,
    pub suggests: Vec<Capability>,
    pub conflicts: Vec<Capability>,
    pub obsoletes: Vec<Capability>,
}

impl Meta {
    pub fn new(nevra: Nevra) -> Self {
        Self {
            nevra,
            summary: String::new(),
            group: String::new(),
            filesize: 0,
            size: 0,
            provides: Vec::new(),
            requires: Vec::new(),
            recommends: Vec::new(),
            suggests: Vec::new(),
            conflicts: Vec::new(),
            obsoletes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.nevra.name
    }

    pub fn evr(&self) -> &Evr {
        &self.nevra.evr
    }

    pub fn arch(&self) -> &str {
        &self.nevra.arch
    }

    /// Every package implicitly provides its own name at its own EVR
    pub fn provides_capability(&self, cap: &Capability) -> bool {
        if cap.satisfied_by(self.name(), Some(self.evr())) {
            return true;
        }
        self.provides.iter().any(|p| {
            cap.satisfied_by(
                &p.name,
                p.constraint.as_ref().map(|(_, evr)| evr).or(Some(self.evr())),
            )
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn implicit_self_provide() {
        let meta = Meta::new(Nevra::parse("wget-1.21-1.mga9.x86_64").unwrap());
        assert!(meta.provides_capability(&"wget".parse().unwrap()));
        assert!(meta.provides_capability(&"wget >= 1.20".parse().unwrap()));
        assert!(!meta.provides_capability(&"wget >= 2.0".parse().unwrap()));
        assert!(!meta.provides_capability(&"curl".parse().unwrap()));
    }

    #[test]
    fn explicit_provides() {
        let mut meta = Meta::new(Nevra::parse("wget-1.21-1.mga9.x86_64").unwrap());
        meta.provides.push("webclient".parse().unwrap());
        meta.provides.push("libwget.so.0 = 1.21".parse().unwrap());
        assert!(meta.provides_capability(&"webclient".parse().unwrap()));
        assert!(meta.provides_capability(&"libwget.so.0 >= 1.20".parse().unwrap()));
        assert!(!meta.provides_capability(&"libwget.so.0 > 1.21".parse().unwrap()));
    }
}
