// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::blocking::{Client, Response};
use url::Url;

use crate::environment;

pub use reqwest::Error;

/// Shared client for tcp socket reuse and connection limit
static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .connect_timeout(Duration::from_secs(environment::CONNECT_TIMEOUT_SECS))
        .build()
        .expect("build reqwest client")
});

/// Fetch a resource at the provided [`Url`], returning the streaming response
pub fn get(url: Url) -> Result<Response, Error> {
    let response = CLIENT.get(url).send()?;
    response.error_for_status()
}

/// Client with a tighter timeout and forced local address family, for
/// mirrors configured with an explicit ip mode
pub fn client_for(ip_mode: IpMode, timeout: Duration) -> Result<Client, Error> {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    let mut builder = Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .connect_timeout(timeout);

    // Binding the local end pins the address family for the whole request
    builder = match ip_mode {
        IpMode::Auto => builder,
        IpMode::Ipv4 | IpMode::Dual => {
            builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        }
        IpMode::Ipv6 => builder.local_address(IpAddr::V6(Ipv6Addr::UNSPECIFIED)),
    };

    builder.build()
}

/// Address family selection for a configured server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpMode {
    #[default]
    Auto,
    Ipv4,
    Ipv6,
    /// Both families configured; v4 preferred
    Dual,
}

impl IpMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(IpMode::Auto),
            "ipv4" => Some(IpMode::Ipv4),
            "ipv6" => Some(IpMode::Ipv6),
            "dual" => Some(IpMode::Dual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IpMode::Auto => "auto",
            IpMode::Ipv4 => "ipv4",
            IpMode::Ipv6 => "ipv6",
            IpMode::Dual => "dual",
        }
    }
}
