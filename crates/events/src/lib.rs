//! Domain events, envelopes and the publish/subscribe boundary.
//!
//! Every engine transition emits typed events. After the changeset is
//! committed they are wrapped in an [`EventEnvelope`] and published on an
//! [`EventBus`] for the collaborators that act on them (supplier e-mail,
//! approval notifications, reporting).

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
