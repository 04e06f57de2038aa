// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

pub use self::dependency::Capability;
pub use self::evr::{Evr, Nevra};
pub use self::installation::Installation;
pub use self::package::Meta;
pub use self::resolver::Resolver;

pub mod auth;
pub mod cli;
pub mod db;
pub mod dependency;
pub mod download;
pub mod environment;
pub mod evr;
pub mod files_xml;
pub mod installation;
pub mod ops;
pub mod package;
pub mod queue;
pub mod request;
pub mod resolver;
pub mod rpmdb;
pub mod runtime;
pub mod signal;
pub mod synthesis;
