//! Test helpers shared across Parley crates.

pub mod memory;
pub mod provider;
pub mod quota;
pub mod usage;

pub use memory::StubMemory;
pub use provider::{
    BreakingProvider, FailingProvider, FixedProvider, FlakyProvider, RecordingProvider,
    ScriptedProvider, StallingProvider, factory_for,
};
pub use quota::{FailingQuota, StubQuota};
pub use usage::FailingUsage;
