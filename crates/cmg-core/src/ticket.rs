//! Pull requests and the data they carry.

use crate::error::{Error, Result};
use crate::object::ObjectId;

/// Interleaved float samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    channels: usize,
    samples: Vec<f32>,
}

impl Batch {
    /// Creates a batch. `samples.len()` must be a multiple of `channels`.
    pub fn new(channels: usize, samples: Vec<f32>) -> Result<Self> {
        if channels == 0 || samples.len() % channels != 0 {
            return Err(Error::other(format!(
                "{} samples do not form {}-channel pixels",
                samples.len(),
                channels
            )));
        }
        Ok(Self { channels, samples })
    }

    /// Channels per pixel.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of pixels.
    #[inline]
    pub fn pixels(&self) -> usize {
        if self.channels == 0 { 0 } else { self.samples.len() / self.channels }
    }

    /// Samples.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Mutable samples.
    #[inline]
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Pixels `start..start + len`, clamped to the batch.
    pub fn window(&self, start: usize, len: usize) -> Batch {
        let first = start.min(self.pixels());
        let last = first.saturating_add(len).min(self.pixels());
        Batch {
            channels: self.channels,
            samples: self.samples[first * self.channels..last * self.channels].to_vec(),
        }
    }
}

/// Outcome of a renderer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Output was written to the ticket.
    Done,
    /// Nothing to produce for the requested range.
    Empty,
}

/// A single pull through the graph.
///
/// The ticket travels upstream through plugs and carries the requested
/// range, the produced output and the ids of every node that ran for it.
#[derive(Debug, Clone)]
pub struct Ticket {
    id: ObjectId,
    position: usize,
    length: Option<usize>,
    iteration: u32,
    output: Option<Batch>,
    visited: Vec<ObjectId>,
}

impl Default for Ticket {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticket {
    /// Requests everything from position zero.
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            position: 0,
            length: None,
            iteration: 0,
            output: None,
            visited: Vec::new(),
        }
    }

    /// Requests `length` pixels starting at `position`.
    pub fn with_range(position: usize, length: usize) -> Self {
        Self {
            position,
            length: Some(length),
            ..Self::new()
        }
    }

    /// Ticket id.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// First requested pixel.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Requested pixel count, `None` for "until the end".
    #[inline]
    pub fn length(&self) -> Option<usize> {
        self.length
    }

    /// Moves the window forward by its length and clears the output.
    pub fn advance(&mut self) {
        self.position += self.length.unwrap_or(0);
        self.iteration += 1;
        self.output = None;
        self.visited.clear();
    }

    /// How often [`Ticket::advance`] was called.
    #[inline]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Output written by the last renderer.
    #[inline]
    pub fn output(&self) -> Option<&Batch> {
        self.output.as_ref()
    }

    /// Stores output.
    #[inline]
    pub fn set_output(&mut self, batch: Batch) {
        self.output = Some(batch);
    }

    /// Takes the output out of the ticket.
    #[inline]
    pub fn take_output(&mut self) -> Option<Batch> {
        self.output.take()
    }

    /// Records that a node ran for this ticket.
    #[inline]
    pub fn record(&mut self, node: ObjectId) {
        self.visited.push(node);
    }

    /// Nodes in the order they ran.
    #[inline]
    pub fn visited(&self) -> &[ObjectId] {
        &self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_shape() {
        let b = Batch::new(3, vec![0.0; 12]).unwrap();
        assert_eq!(b.pixels(), 4);
        assert!(Batch::new(3, vec![0.0; 4]).is_err());
        assert!(Batch::new(0, vec![]).is_err());
    }

    #[test]
    fn batch_window_clamps() {
        let b = Batch::new(1, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(b.window(1, 2).samples(), &[1.0, 2.0]);
        assert_eq!(b.window(3, 10).samples(), &[3.0]);
        assert_eq!(b.window(9, 1).pixels(), 0);
    }

    #[test]
    fn ticket_advance() {
        let mut t = Ticket::with_range(0, 64);
        t.record(ObjectId::next());
        t.set_output(Batch::new(1, vec![1.0]).unwrap());
        t.advance();
        assert_eq!(t.position(), 64);
        assert_eq!(t.iteration(), 1);
        assert!(t.output().is_none());
        assert!(t.visited().is_empty());
    }
}
