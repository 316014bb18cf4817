//! Harbor Route Library
//!
//! This library provides the routing core for the Harbor API system including:
//! - Global model-name mapping resolution
//! - The in-memory channel directory with timed refresh
//! - Priority and weight based channel selection
//! - Channel lifecycle management and health-based exclusion

pub mod route;

// Re-export commonly used types
pub use route::directory::{ChannelDirectory, DirectorySnapshot};
pub use route::lifecycle::{ChannelErrorContext, LifecycleManager};
pub use route::mapping::resolve_model_mapping;
pub use route::selector::select_channel;
pub use route::service::{ChannelRouter, RoutedChannel};
