pub mod events;
pub mod queue;

pub use events::{CallbackEvent, ChatKind, InboundEvent, MessageEvent};
pub use queue::EventBus;
