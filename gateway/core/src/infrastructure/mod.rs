// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod docker_exec;
pub mod exec_pumps;
pub mod kube_exec;

pub use docker_exec::DockerExecTransport;
pub use kube_exec::KubeExecTransport;
