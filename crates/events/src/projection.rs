use crate::EventEnvelope;

/// A projection builds a read model from committed event envelopes.
///
/// Read models are disposable: they can be cleared and rebuilt by replaying
/// the event store. Implementations must be idempotent, since the same
/// envelope may be offered again during a rebuild or a retried dispatch.
pub trait Projection<P>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display;

    /// Aggregate type this projection consumes (e.g. "inbound.order").
    fn aggregate_type(&self) -> &'static str;

    /// Apply one committed envelope to the read model.
    fn apply_envelope(&self, envelope: &EventEnvelope<P>) -> Result<(), Self::Error>;
}
