// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! podgate core
//!
//! Bridges SSH terminal sessions and SFTP requests onto one-shot command
//! executions inside a single target container.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Exec-stream bridge, file-operation translator and the SSH/SFTP surface

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
