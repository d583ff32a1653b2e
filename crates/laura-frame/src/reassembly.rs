use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::channel::Channel;
use crate::error::FragmentError;
use crate::fragment::{parse_header, FragmentHeader};

/// Reassembly limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyConfig {
    /// Largest expected length a start fragment may declare.
    pub max_message_len: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            max_message_len: 0xFFFF,
        }
    }
}

/// Rebuilds one message from a stream of fragments.
///
/// Owned by exactly one listener. Every integrity violation drops the
/// accumulated bytes and returns the buffer to idle; there is no partial
/// recovery.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    config: ReassemblyConfig,
    data: BytesMut,
    expected_len: Option<usize>,
    next_sequence: usize,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReassemblyConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Feed one fragment.
    ///
    /// Returns whether a complete message is now buffered. An empty
    /// fragment is rejected without touching the buffer.
    pub fn push(&mut self, fragment: &[u8]) -> Result<bool, FragmentError> {
        let header = match parse_header(fragment) {
            Ok(header) => header,
            Err(FragmentError::Empty) => return Err(FragmentError::Empty),
            Err(err) => {
                self.reset();
                return Err(err);
            }
        };

        match header {
            FragmentHeader::Start {
                expected_len,
                payload_offset,
                ..
            } => {
                self.reset();
                if expected_len > self.config.max_message_len {
                    return Err(FragmentError::TooLarge {
                        len: expected_len,
                        max: self.config.max_message_len,
                    });
                }
                self.data.extend_from_slice(&fragment[payload_offset..]);
                self.expected_len = Some(expected_len);
            }
            FragmentHeader::Continuation { sequence } => {
                if self.expected_len.is_none() {
                    self.reset();
                    return Err(FragmentError::UnexpectedContinuation { sequence });
                }
                if usize::from(sequence) != self.next_sequence {
                    let expected = self.next_sequence;
                    self.reset();
                    return Err(FragmentError::SequenceMismatch {
                        expected,
                        got: sequence,
                    });
                }
                self.data.extend_from_slice(&fragment[1..]);
                self.next_sequence += 1;
            }
        }

        Ok(self.is_complete())
    }

    /// True once the accumulated bytes reach the declared length.
    pub fn is_complete(&self) -> bool {
        self.expected_len
            .is_some_and(|expected| self.data.len() >= expected)
    }

    /// Extract the completed message and return to idle.
    pub fn take(&mut self) -> Option<Bytes> {
        if !self.is_complete() {
            return None;
        }
        let message = self.data.split().freeze();
        self.reset();
        Some(message)
    }

    /// Drop everything buffered.
    pub fn reset(&mut self) {
        self.data.clear();
        self.expected_len = None;
        self.next_sequence = 0;
    }

    pub fn in_progress(&self) -> bool {
        self.expected_len.is_some()
    }

    pub fn expected_len(&self) -> Option<usize> {
        self.expected_len
    }

    pub fn buffered_len(&self) -> usize {
        self.data.len()
    }

    pub fn next_sequence(&self) -> usize {
        self.next_sequence
    }
}

/// Reassembly buffers keyed by channel.
///
/// A buffer is created on the first fragment seen for its channel and is
/// only ever reset afterwards.
#[derive(Debug, Default)]
pub struct Reassembler {
    config: ReassemblyConfig,
    buffers: HashMap<Channel, ReassemblyBuffer>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReassemblyConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
        }
    }

    /// Feed one fragment for `channel`. Errors are logged here; the caller
    /// only needs the result to count drops.
    pub fn submit(&mut self, channel: Channel, fragment: &[u8]) -> Result<bool, FragmentError> {
        let config = self.config;
        let buffer = self
            .buffers
            .entry(channel)
            .or_insert_with(|| ReassemblyBuffer::with_config(config));

        match buffer.push(fragment) {
            Ok(complete) => {
                trace!(
                    channel = %channel,
                    len = fragment.len(),
                    buffered = buffer.buffered_len(),
                    complete,
                    "fragment accepted"
                );
                Ok(complete)
            }
            Err(err) => {
                warn!(channel = %channel, error = %err, "fragment dropped");
                Err(err)
            }
        }
    }

    pub fn is_complete(&self, channel: Channel) -> bool {
        self.buffers
            .get(&channel)
            .is_some_and(ReassemblyBuffer::is_complete)
    }

    /// Extract the completed message for `channel`, resetting its buffer.
    pub fn take_message(&mut self, channel: Channel) -> Option<Bytes> {
        self.buffers.get_mut(&channel).and_then(ReassemblyBuffer::take)
    }

    pub fn buffer(&self, channel: Channel) -> Option<&ReassemblyBuffer> {
        self.buffers.get(&channel)
    }
}
