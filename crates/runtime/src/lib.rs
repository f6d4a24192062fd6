//! chainprobe runtime - client sessions, launch, and the session pool
//!
//! This crate binds worker threads to live client sessions:
//!
//! - **Backends**: one open channel to one client over a socket file, a
//!   network address, or a per-call tool
//! - **Launcher**: spawning local clients and waiting for their socket,
//!   picking free network addresses
//! - **Registry**: the lock-protected slot table handing sessions to threads,
//!   reusing idle ones and tearing everything down in parallel
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ chainprobe-cli   │  worker pool, one thread id per worker
//! └────────┬─────────┘
//!          │ acquire / release / clear
//! ┌────────▼─────────┐
//! │ SessionRegistry  │  slots + thread index, one mutex
//! │  ┌────────────┐  │
//! │  │ Launch     │  │  ClientLauncher: spawn, poll, warm up
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ Backend    │  │  ipc / http / tool
//! │  └────────────┘  │
//! └──────────────────┘
//! ```
//!
//! Only Unix targets are supported: local clients are reached over Unix
//! domain sockets and stopped with `SIGTERM`.

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod launcher;
pub mod process;
pub mod registry;

pub use backend::{CommandTool, HttpBackend, IpcBackend, SessionBackend, ToolBackend, ToolRunner};
pub use config::{ConfigProvider, ConfigSource};
pub use entry::{SessionEntry, SessionStatus};
pub use error::{Error, Result};
pub use launcher::{BoundAddresses, ClientLauncher, Launch, LaunchSettings, LaunchTimings};
pub use process::OwnedProcess;
pub use registry::{PoolSettings, SessionRegistry, SessionSummary, SlotId};
