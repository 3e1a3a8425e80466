//! Dual-partition OTA update subsystem.
//!
//! ```text
//!  POST /update ──▶ ImageReceiver ──▶ FlashSink (inactive OTA slot)
//!                        │
//!                        ▼ finalize ok
//!               UpdateOrchestrator ──▶ VersionStore (record + history)
//!                        │
//!                        ▼
//!                   ActionQueue ──▶ restart (control loop)
//!
//!  GET /switch_partition ──▶ PartitionSelector ──▶ BootManager
//! ```
//!
//! Everything is owned by [`context::OtaContext`].

pub mod context;
pub mod image_info;
pub mod orchestrator;
pub mod receiver;
pub mod selector;
pub mod slot;
pub mod version_store;

pub use context::OtaContext;
pub use slot::PartitionSlot;
