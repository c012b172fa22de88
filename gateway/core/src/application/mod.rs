// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod command_channel;
pub mod interactive_session;
pub mod spool;
pub mod file_translator;

pub use command_channel::RemoteCommandChannel;
pub use interactive_session::{InteractiveSessionHandler, TerminalSession};
pub use file_translator::{
    DirectoryLister, FileOpError, FileOperationTranslator, ListerAt, RemoteFileWriter,
    SingleEntryLister,
};
pub use spool::SpooledFile;
