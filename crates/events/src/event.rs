use chrono::{DateTime, Utc};

/// A fact recorded on a workflow document's stream.
///
/// The stream is also the document's audit history, so an event is never
/// edited once committed. Payload shapes change by bumping `version`.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, `<document>.<verb>` (e.g. "transfer.order.received").
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time of the transition.
    fn occurred_at(&self) -> DateTime<Utc>;
}
