// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SSH and SFTP surface of the gateway.

pub mod server;
pub mod sftp;

pub use server::{load_host_key, ConnectionHandler, GatewayServerError, SshGatewayServer};
pub use sftp::{normalize_path, SftpSession, LIST_PAGE_SIZE};
