//! Inbound message reassembly

use super::TransportError;

/// Buffers partial deliveries until the message-boundary marker
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
}

impl FrameAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one delivery. Returns the complete message once `last` is seen.
    pub fn push(&mut self, data: &[u8], last: bool) -> Result<Option<String>, TransportError> {
        if !last {
            self.buffer.extend_from_slice(data);
            return Ok(None);
        }

        let bytes = if self.buffer.is_empty() {
            data.to_vec()
        } else {
            self.buffer.extend_from_slice(data);
            std::mem::take(&mut self.buffer)
        };

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| TransportError::InvalidFrame(e.to_string()))
    }

    /// Drop any partial message, e.g. when the link goes away
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}
