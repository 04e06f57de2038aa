// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

/// Fixed download worker slots
pub const MAX_DOWNLOAD_WORKERS: usize = 4;
/// HTTP connect timeout in seconds
pub const CONNECT_TIMEOUT_SECS: u64 = 30;
/// Retry attempts per server for transient errors
pub const MAX_RETRIES: usize = 3;
/// Peer availability query timeout in seconds
pub const PEER_TIMEOUT_SECS: u64 = 2;
/// Max concurrent peer `have` queries
pub const MAX_PEER_QUERIES: usize = 10;
/// UDP discovery port
pub const DISCOVERY_PORT: u16 = 9878;
/// Framing prefix on discovery datagrams
pub const DISCOVERY_MAGIC: &[u8] = b"URPMD1";
/// Production daemon HTTP port
pub const DAEMON_PORT: u16 = 9876;
/// Development daemon HTTP port
pub const DAEMON_DEV_PORT: u16 = 9877;
/// Leading bytes of every RPM payload
pub const RPM_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
/// Files index insert batch
pub const FILES_IMPORT_BATCH: usize = 10_000;
/// FTS rebuild batch
pub const FTS_REBUILD_BATCH: i64 = 50_000;
/// Store commit retries under lock contention
pub const DB_COMMIT_RETRIES: u32 = 10;
/// Base delay for the locked-commit retry loop, milliseconds
pub const DB_COMMIT_BASE_DELAY_MS: u64 = 500;
