// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Target identity and command vectors.
//!
//! Every remote command runs against exactly one container of one pod. The
//! SSH login name is repurposed as the container selector; that mapping
//! happens once, at session start, in [`TargetSelector::resolve`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The container every command of a session runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetIdentity {
    pub namespace: String,
    pub instance: String,
    pub container: String,
}

impl TargetIdentity {
    pub fn new(
        namespace: impl Into<String>,
        instance: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            instance: instance.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.instance, self.container)
    }
}

/// Maps an authenticated login onto a [`TargetIdentity`].
///
/// In the single-target variant a fixed container is configured and the
/// login name is ignored.
#[derive(Debug, Clone)]
pub struct TargetSelector {
    namespace: String,
    instance: String,
    fixed_container: Option<String>,
}

impl TargetSelector {
    pub fn new(
        namespace: impl Into<String>,
        instance: impl Into<String>,
        fixed_container: Option<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            instance: instance.into(),
            fixed_container,
        }
    }

    pub fn resolve(&self, user: &str) -> TargetIdentity {
        let container = self
            .fixed_container
            .clone()
            .unwrap_or_else(|| user.to_string());
        TargetIdentity::new(self.namespace.clone(), self.instance.clone(), container)
    }
}

/// Executable plus arguments. Built per request, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandVector(Vec<String>);

impl CommandVector {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl fmt::Display for CommandVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_name_selects_container() {
        let selector = TargetSelector::new("default", "web-0", None);
        let target = selector.resolve("nginx");
        assert_eq!(target, TargetIdentity::new("default", "web-0", "nginx"));
    }

    #[test]
    fn test_fixed_container_ignores_login_name() {
        let selector = TargetSelector::new("default", "web-0", Some("app".to_string()));
        assert_eq!(selector.resolve("root").container, "app");
    }

    #[test]
    fn test_command_vector_accessors() {
        let command = CommandVector::new(["stat", "-c", "%n", "/tmp"]);
        assert_eq!(command.program(), Some("stat"));
        assert_eq!(command.args().len(), 4);
        assert_eq!(command.to_string(), "stat -c %n /tmp");
        assert!(CommandVector::new(Vec::<String>::new()).program().is_none());
    }
}
