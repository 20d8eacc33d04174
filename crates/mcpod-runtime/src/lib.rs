//! Pod runtime for mcpod.
//!
//! - [`registry`]: live pods by server id, with per-server lifecycle locks
//! - [`lifecycle`]: start, restart and delete pods
//! - [`bridge`]: relay JSON-RPC between a client channel and pod stdio
//! - [`logs`]: recent container output
//! - [`backend`]: where workloads actually run
//! - [`health_monitor`]: evict pods that died on their own
#![deny(unsafe_code)]

pub mod backend;
pub mod bridge;
pub mod health_monitor;
pub mod lifecycle;
pub mod logs;
pub mod registry;
mod runtime;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{Launcher, ProcessBackend, Workload, WorkloadBackend, WorkloadSpec};
pub use bridge::{
    ChannelError, ClientChannel, CollectingChannel, ExchangeEnd, JsonRpcEnvelope, ResponseHead,
    StreamBridge, error_envelope,
};
pub use health_monitor::{DeadPod, PodHealthMonitor};
pub use lifecycle::LifecycleController;
pub use logs::LogRetriever;
pub use registry::{InMemoryPodRegistry, PodHandle, PodRegistry};
pub use runtime::PodRuntime;
