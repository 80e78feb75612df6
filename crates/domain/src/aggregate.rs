//! Core aggregate and domain event traits.

use common::WorkflowId;
use history::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events are facts that have happened. They are immutable and named
/// in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name, stored alongside the payload.
    fn event_type(&self) -> &'static str;
}

/// Trait for event-sourced state.
///
/// An aggregate is rebuilt by replaying its events in order. `apply` must be
/// pure and deterministic:
/// - the same state and event always produce the same new state
/// - it has no side effects
/// - it cannot fail (events are facts that already happened)
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate consumes.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the identifier, or None for an aggregate with no events yet.
    fn id(&self) -> Option<&WorkflowId>;

    /// Returns the version of the last applied event.
    fn version(&self) -> Version;

    /// Sets the version after loading or appending events.
    fn set_version(&mut self, version: Version);

    /// Applies an event, updating state.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
