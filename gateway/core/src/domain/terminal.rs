// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal geometry and the resize sequence fed to a pty exec.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u16,
    pub height: u16,
}

impl WindowSize {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// SSH reports dimensions as u32; anything wider than u16 is clamped.
    pub fn from_cells(width: u32, height: u32) -> Self {
        Self {
            width: u16::try_from(width).unwrap_or(u16::MAX),
            height: u16::try_from(height).unwrap_or(u16::MAX),
        }
    }
}

/// Producer half, owned by the protocol session.
///
/// Dropping it ends the paired [`ResizeSequence`].
#[derive(Debug)]
pub struct ResizeNotifier {
    sender: watch::Sender<WindowSize>,
}

impl ResizeNotifier {
    /// Publish a new size. Sizes not yet consumed are overwritten.
    pub fn notify(&self, size: WindowSize) {
        self.sender.send_replace(size);
    }
}

/// Lazy, single-pass sequence of window sizes.
///
/// Yields the size captured at session start first, then the latest size
/// after each resize, and ends once the notifier is dropped.
#[derive(Debug)]
pub struct ResizeSequence {
    initial: Option<WindowSize>,
    changes: watch::Receiver<WindowSize>,
}

impl ResizeSequence {
    pub fn channel(initial: WindowSize) -> (ResizeNotifier, ResizeSequence) {
        let (sender, changes) = watch::channel(initial);
        (
            ResizeNotifier { sender },
            ResizeSequence {
                initial: Some(initial),
                changes,
            },
        )
    }

    pub async fn next(&mut self) -> Option<WindowSize> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        match self.changes.changed().await {
            Ok(()) => Some(*self.changes.borrow_and_update()),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_without_resize_yields_initial_only() {
        let (notifier, mut sequence) = ResizeSequence::channel(WindowSize::new(80, 24));
        drop(notifier);

        assert_eq!(sequence.next().await, Some(WindowSize::new(80, 24)));
        assert_eq!(sequence.next().await, None);
    }

    #[tokio::test]
    async fn test_resize_events_follow_initial_size() {
        let (notifier, mut sequence) = ResizeSequence::channel(WindowSize::new(80, 24));

        assert_eq!(sequence.next().await, Some(WindowSize::new(80, 24)));
        notifier.notify(WindowSize::new(120, 40));
        assert_eq!(sequence.next().await, Some(WindowSize::new(120, 40)));

        drop(notifier);
        assert_eq!(sequence.next().await, None);
    }

    #[tokio::test]
    async fn test_pending_resizes_coalesce_to_latest() {
        let (notifier, mut sequence) = ResizeSequence::channel(WindowSize::new(80, 24));
        notifier.notify(WindowSize::new(100, 30));
        notifier.notify(WindowSize::new(132, 43));
        drop(notifier);

        assert_eq!(sequence.next().await, Some(WindowSize::new(80, 24)));
        assert_eq!(sequence.next().await, Some(WindowSize::new(132, 43)));
        assert_eq!(sequence.next().await, None);
    }

    #[test]
    fn test_from_cells_clamps_oversized_dimensions() {
        assert_eq!(WindowSize::from_cells(70_000, 50), WindowSize::new(u16::MAX, 50));
    }
}
