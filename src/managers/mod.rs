// Managers Module
//
// Focused manager types extracted from the capture loop:
// - EventChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;

pub use broadcast_manager::{EventChannelManager, DEFAULT_CHANNEL_CAPACITY};
