//! Fixed-size blob slicing
//!
//! An empty blob still yields one (empty) chunk so the receiver always
//! sees a first and a last chunk for every item.

/// One slice of a blob, borrowed from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSlice<'a> {
    pub index: u32,
    pub total: u32,
    pub is_first: bool,
    pub is_last: bool,
    pub data: &'a [u8],
}

/// `ceil(len / chunk_size)`, or 1 for an empty blob.
pub fn total_chunks(len: usize, chunk_size: usize) -> u32 {
    if len == 0 {
        return 1;
    }
    u32::try_from(len.div_ceil(chunk_size.max(1))).unwrap_or(u32::MAX)
}

/// Iterate `blob` in `chunk_size` slices
pub fn split(blob: &[u8], chunk_size: usize) -> Split<'_> {
    let chunk_size = chunk_size.max(1);
    Split {
        blob,
        chunk_size,
        next: 0,
        total: total_chunks(blob.len(), chunk_size),
    }
}

pub struct Split<'a> {
    blob: &'a [u8],
    chunk_size: usize,
    next: u32,
    total: u32,
}

impl<'a> Iterator for Split<'a> {
    type Item = ChunkSlice<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let start = (index as usize).saturating_mul(self.chunk_size).min(self.blob.len());
        let end = start.saturating_add(self.chunk_size).min(self.blob.len());
        Some(ChunkSlice {
            index,
            total: self.total,
            is_first: index == 0,
            is_last: index + 1 == self.total,
            data: &self.blob[start..end],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Split<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_chunks() {
        assert_eq!(total_chunks(0, 4), 1);
        assert_eq!(total_chunks(1, 4), 1);
        assert_eq!(total_chunks(4, 4), 1);
        assert_eq!(total_chunks(5, 4), 2);
        assert_eq!(total_chunks(8, 4), 2);
    }

    #[test]
    fn test_empty_blob_yields_one_empty_chunk() {
        let chunks: Vec<_> = split(&[], 4).collect();
        assert_eq!(chunks.len(), 1);
        let c = chunks[0];
        assert_eq!((c.index, c.total), (0, 1));
        assert!(c.is_first && c.is_last);
        assert!(c.data.is_empty());
    }

    #[test]
    fn test_exact_multiple() {
        let blob: Vec<u8> = (0..8).collect();
        let chunks: Vec<_> = split(&blob, 4).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].data, &[0, 1, 2, 3]);
        assert_eq!(chunks[1].data, &[4, 5, 6, 7]);
        assert!(chunks[0].is_first && !chunks[0].is_last);
        assert!(!chunks[1].is_first && chunks[1].is_last);
    }

    #[test]
    fn test_short_tail() {
        let blob = [9u8; 10];
        let sizes: Vec<usize> = split(&blob, 4).map(|c| c.data.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(split(&blob, 4).len(), 3);
    }
}
