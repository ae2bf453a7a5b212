//! Receiver-side reassembly of a framed multi-item stream
//!
//! Rules, applied per frame:
//! - marker: flush the open item (if any), then remember the marker
//! - first chunk: open a fresh item with the chunk's header and total
//! - any chunk: store it at its index if `index < total`
//! - last chunk of the item named last by the latest marker: flush
//!
//! A last chunk of a non-final item is flushed only when the next marker
//! arrives. An item still open when the stream ends is discarded by
//! [`StreamAssembler::finish`], never returned partially.

use std::collections::BTreeMap;

use crate::frame::{ChunkFrame, Frame, ItemMarker};

struct OpenItem<H> {
    header: H,
    total: u32,
    slots: BTreeMap<u32, Vec<u8>>,
}

pub struct StreamAssembler<H> {
    marker: Option<ItemMarker>,
    open: Option<OpenItem<H>>,
    completed: Vec<(H, Vec<u8>)>,
}

impl<H> Default for StreamAssembler<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> StreamAssembler<H> {
    pub fn new() -> Self {
        Self {
            marker: None,
            open: None,
            completed: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: Frame<H>) {
        match frame {
            Frame::Marker(marker) => self.on_marker(marker),
            Frame::Chunk(chunk) => self.on_chunk(chunk),
        }
    }

    pub fn on_marker(&mut self, marker: ItemMarker) {
        self.flush();
        self.marker = Some(marker);
    }

    pub fn on_chunk(&mut self, chunk: ChunkFrame<H>) {
        if chunk.is_first {
            if self.open.is_some() {
                tracing::debug!("first chunk replaced an unflushed item");
            }
            self.open = Some(OpenItem {
                header: chunk.header,
                total: chunk.total,
                slots: BTreeMap::new(),
            });
        }

        let Some(open) = self.open.as_mut() else {
            tracing::debug!(index = chunk.index, "chunk without an open item ignored");
            return;
        };
        if chunk.index < open.total {
            open.slots.insert(chunk.index, chunk.data);
        } else {
            tracing::debug!(
                index = chunk.index,
                total = open.total,
                "out-of-range chunk ignored"
            );
        }

        let final_item = self.marker.is_some_and(|m| m.is_last_item);
        if chunk.is_last && final_item {
            self.flush();
        }
    }

    /// Items completed so far
    pub fn completed(&self) -> usize {
        self.completed.len()
    }

    /// End of input: every completed item in arrival order. An item still
    /// open is dropped.
    pub fn finish(self) -> Vec<(H, Vec<u8>)> {
        if let Some(open) = &self.open {
            tracing::warn!(
                received = open.slots.len(),
                total = open.total,
                "stream ended with an incomplete item; discarding it"
            );
        }
        self.completed
    }

    fn flush(&mut self) {
        if let Some(open) = self.open.take() {
            let len = open.slots.values().map(Vec::len).sum();
            let mut blob = Vec::with_capacity(len);
            for data in open.slots.into_values() {
                blob.extend_from_slice(&data);
            }
            self.completed.push((open.header, blob));
        }
    }
}
