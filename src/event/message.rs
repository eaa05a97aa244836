use std::fmt;
use std::hash::Hash;

/// A typed message carried by an [`EventBus`](super::EventBus).
///
/// Implementors are payload enums; `Kind` is the matching discriminant enum
/// and serves as the event name. Deriving the discriminant with
/// `strum_macros::EnumDiscriminants` keeps the event-name-to-payload mapping
/// statically checked instead of relying on string keys at runtime.
pub trait BusMessage: Clone + fmt::Debug + Send + 'static {
    type Kind: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// The event name this message is dispatched under.
    fn kind(&self) -> Self::Kind;
}

/// Stable identifier handed back by `subscribe`, used to remove exactly that
/// registration later. Unique within one bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(String);

impl ListenerId {
    pub(crate) fn new(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
