// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value types and seams shared by the gateway: target identity, exec
//! contracts, terminal geometry, file attributes and configuration.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements the gateway's pure types and trait seams

pub mod target;
pub mod exec;
pub mod terminal;
pub mod attributes;
pub mod file_request;
pub mod gateway_config;
