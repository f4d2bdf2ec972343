/// Immutable, compared by value. Transitions such as an approval decision or
/// a variance calculation return a new value rather than editing one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
