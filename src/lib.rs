// Careline chat timeline engine
// The library half of the crate: message models, the REST backend,
// and the timeline engine consumed by the terminal client (and by
// the integration tests through a mock backend).

pub mod api;
pub mod models;
pub mod timeline;

// Re-export the types a renderer needs day to day
pub use models::{ChatMessage, MessageOrigin, MessageStatus, PageCursor};
pub use timeline::{ChatTimeline, TimelineConfig, TimelineEvent};
