//! Multi-item emission framing
//!
//! For each item, in order:
//! ```text
//! Marker { total_items, current_item_index, is_first_item, is_last_item }
//! Chunk  { header, data[0],   index 0,       total N, is_first }
//! ...
//! Chunk  { header, data[N-1], index N-1,     total N, is_last }
//! ```
//! The header (item fields without payload) rides on every chunk; payload
//! bytes never appear in a marker. Item N+1's marker is produced only
//! after the last chunk of item N. Zero items produce zero frames.

use crate::split::total_chunks;

/// Precedes the chunk run of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemMarker {
    pub total_items: u32,
    pub current_item_index: u32,
    pub is_first_item: bool,
    pub is_last_item: bool,
}

/// One chunk of one item's blob, tagged with the item header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame<H> {
    pub header: H,
    pub data: Vec<u8>,
    pub index: u32,
    pub total: u32,
    pub is_first: bool,
    pub is_last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<H> {
    Marker(ItemMarker),
    Chunk(ChunkFrame<H>),
}

struct CurrentItem<H> {
    header: H,
    blob: Vec<u8>,
    next_chunk: u32,
    total: u32,
}

/// Lazy frame producer; see the module docs for the sequence.
pub struct Emitter<H> {
    items: std::vec::IntoIter<(H, Vec<u8>)>,
    total_items: u32,
    next_item: u32,
    current: Option<CurrentItem<H>>,
    chunk_size: usize,
}

/// Frame `items` (header, blob) for emission, preserving their order.
pub fn emit<H: Clone>(items: Vec<(H, Vec<u8>)>, chunk_size: usize) -> Emitter<H> {
    let total_items = u32::try_from(items.len()).unwrap_or(u32::MAX);
    Emitter {
        items: items.into_iter(),
        total_items,
        next_item: 0,
        current: None,
        chunk_size: chunk_size.max(1),
    }
}

impl<H: Clone> Iterator for Emitter<H> {
    type Item = Frame<H>;

    fn next(&mut self) -> Option<Frame<H>> {
        if let Some(cur) = self.current.as_mut() {
            if cur.next_chunk < cur.total {
                let index = cur.next_chunk;
                cur.next_chunk += 1;

                let start = (index as usize)
                    .saturating_mul(self.chunk_size)
                    .min(cur.blob.len());
                let end = start.saturating_add(self.chunk_size).min(cur.blob.len());
                return Some(Frame::Chunk(ChunkFrame {
                    header: cur.header.clone(),
                    data: cur.blob[start..end].to_vec(),
                    index,
                    total: cur.total,
                    is_first: index == 0,
                    is_last: index + 1 == cur.total,
                }));
            }
            self.current = None;
        }

        let (header, blob) = self.items.next()?;
        let index = self.next_item;
        self.next_item += 1;
        self.current = Some(CurrentItem {
            total: total_chunks(blob.len(), self.chunk_size),
            header,
            blob,
            next_chunk: 0,
        });

        Some(Frame::Marker(ItemMarker {
            total_items: self.total_items,
            current_item_index: index,
            is_first_item: index == 0,
            is_last_item: index + 1 == self.total_items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn describe(frames: &[Frame<&'static str>]) -> Vec<String> {
        frames
            .iter()
            .map(|f| match f {
                Frame::Marker(m) => format!("M{}", m.current_item_index),
                Frame::Chunk(c) => format!("{}:{}/{}", c.header, c.index, c.total),
            })
            .collect()
    }

    #[test]
    fn test_no_items_no_frames() {
        assert_eq!(emit::<()>(Vec::new(), 4).count(), 0);
    }

    #[test]
    fn test_marker_precedes_each_chunk_run() {
        let frames: Vec<_> = emit(vec![("a", vec![0u8; 9]), ("b", vec![1u8; 3])], 4).collect();
        assert_eq!(
            describe(&frames),
            vec!["M0", "a:0/3", "a:1/3", "a:2/3", "M1", "b:0/1"]
        );
    }

    #[test]
    fn test_marker_flags() {
        let frames: Vec<_> = emit(vec![("a", vec![]), ("b", vec![]), ("c", vec![])], 4).collect();
        let markers: Vec<ItemMarker> = frames
            .into_iter()
            .filter_map(|f| match f {
                Frame::Marker(m) => Some(m),
                Frame::Chunk(_) => None,
            })
            .collect();
        assert_eq!(markers.len(), 3);
        assert!(markers[0].is_first_item && !markers[0].is_last_item);
        assert!(!markers[1].is_first_item && !markers[1].is_last_item);
        assert!(markers[2].is_last_item);
        assert!(markers.iter().all(|m| m.total_items == 3));
    }

    #[test]
    fn test_empty_blob_single_empty_chunk() {
        let frames: Vec<_> = emit(vec![("e", Vec::new())], 4).collect();
        assert_eq!(frames.len(), 2);
        match &frames[1] {
            Frame::Chunk(c) => {
                assert!(c.data.is_empty());
                assert_eq!((c.index, c.total), (0, 1));
                assert!(c.is_first && c.is_last);
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn test_chunks_respect_size_bound() {
        let frames = emit(vec![("big", vec![7u8; 4097])], 1024);
        for f in frames {
            if let Frame::Chunk(c) = f {
                assert!(c.data.len() <= 1024);
            }
        }
    }
}
