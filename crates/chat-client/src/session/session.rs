//! Retained session data
//!
//! What survives a dropped connection so the next one can resume instead
//! of identifying from scratch.

/// Resume data for one logical session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Present only after a successful identify
    session_id: Option<String>,
    /// Last dispatch sequence observed
    sequence: Option<u64>,
    /// Gateway address to resume against, when the snapshot named one
    resume_url: Option<String>,
}

/// Verdict on an inbound dispatch sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Strictly greater than anything seen; recorded
    Advanced,
    /// Not greater than the last one; the frame must be dropped
    Stale { last: u64 },
    /// The frame carried no sequence number
    Missing,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    /// A session can be resumed once it has an ID and has seen a dispatch
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    /// Record a dispatch sequence number, enforcing strict monotonicity
    pub fn observe_sequence(&mut self, seq: Option<u64>) -> SequenceCheck {
        let Some(seq) = seq else {
            return SequenceCheck::Missing;
        };
        match self.sequence {
            Some(last) if seq <= last => SequenceCheck::Stale { last },
            _ => {
                self.sequence = Some(seq);
                SequenceCheck::Advanced
            }
        }
    }

    /// Adopt the ID and resume address delivered with the snapshot
    pub fn establish(&mut self, session_id: String, resume_url: Option<String>) {
        self.session_id = Some(session_id);
        self.resume_url = resume_url;
    }

    /// Forget the session; the next connection identifies from scratch
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}
