//! Shared protocol types.

/// Message identifier, unique within one mailbox listing.
pub type Uid = u32;

/// Event observed while waiting in IDLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    /// New message count (EXISTS response).
    Exists(u32),
    /// Recent count changed.
    Recent(u32),
    /// A message was expunged.
    Expunge(u32),
    /// The wait elapsed, or the server sent chatter with no mailbox change.
    Quiet,
}

impl IdleEvent {
    /// Whether the event signals mail worth triaging.
    #[must_use]
    pub const fn is_new_mail(self) -> bool {
        matches!(self, Self::Exists(_) | Self::Recent(_))
    }
}
