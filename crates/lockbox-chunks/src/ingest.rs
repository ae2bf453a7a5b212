//! Single-item upload ingestion
//!
//! The sender opens with exactly one metadata message, then streams raw
//! chunk bytes with no index. Chunks are appended in arrival order. The
//! item is complete when the sender closes the stream.

use crate::TransferError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestMessage<M> {
    Metadata(M),
    Chunk(Vec<u8>),
}

#[derive(Debug)]
pub struct Ingest<M> {
    metadata: Option<M>,
    buf: Vec<u8>,
    limit: Option<usize>,
}

impl<M> Ingest<M> {
    /// `limit` bounds the total chunk bytes accepted
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            metadata: None,
            buf: Vec::new(),
            limit,
        }
    }

    pub fn accept(&mut self, msg: IngestMessage<M>) -> Result<(), TransferError> {
        match msg {
            IngestMessage::Metadata(meta) => {
                if self.metadata.is_some() {
                    return Err(TransferError::UnexpectedMetadata);
                }
                self.metadata = Some(meta);
            }
            IngestMessage::Chunk(data) => {
                if self.metadata.is_none() {
                    return Err(TransferError::MissingMetadata);
                }
                if let Some(limit) = self.limit {
                    if self.buf.len().saturating_add(data.len()) > limit {
                        return Err(TransferError::LimitExceeded { limit });
                    }
                }
                self.buf.extend_from_slice(&data);
            }
        }
        Ok(())
    }

    /// Bytes received so far
    pub fn received(&self) -> usize {
        self.buf.len()
    }

    /// End of input: the metadata and the concatenated blob.
    pub fn finish(self) -> Result<(M, Vec<u8>), TransferError> {
        let meta = self.metadata.ok_or(TransferError::MissingMetadata)?;
        Ok((meta, self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_then_chunks() {
        let mut ingest = Ingest::new(None);
        ingest.accept(IngestMessage::Metadata("report.pdf")).unwrap();
        ingest.accept(IngestMessage::Chunk(vec![1, 2])).unwrap();
        ingest.accept(IngestMessage::Chunk(vec![3])).unwrap();
        assert_eq!(ingest.received(), 3);

        let (meta, blob) = ingest.finish().unwrap();
        assert_eq!(meta, "report.pdf");
        assert_eq!(blob, vec![1, 2, 3]);
    }

    #[test]
    fn test_metadata_only_is_empty_item() {
        let mut ingest = Ingest::new(None);
        ingest.accept(IngestMessage::Metadata(())).unwrap();
        let ((), blob) = ingest.finish().unwrap();
        assert!(blob.is_empty());
    }

    #[test]
    fn test_chunk_before_metadata_rejected() {
        let mut ingest: Ingest<()> = Ingest::new(None);
        assert_eq!(
            ingest.accept(IngestMessage::Chunk(vec![1])),
            Err(TransferError::MissingMetadata)
        );
    }

    #[test]
    fn test_empty_stream_rejected() {
        let ingest: Ingest<()> = Ingest::new(None);
        assert_eq!(ingest.finish().unwrap_err(), TransferError::MissingMetadata);
    }

    #[test]
    fn test_second_metadata_rejected() {
        let mut ingest = Ingest::new(None);
        ingest.accept(IngestMessage::Metadata(1)).unwrap();
        assert_eq!(
            ingest.accept(IngestMessage::Metadata(2)),
            Err(TransferError::UnexpectedMetadata)
        );
    }

    #[test]
    fn test_limit_enforced() {
        let mut ingest = Ingest::new(Some(4));
        ingest.accept(IngestMessage::Metadata(())).unwrap();
        ingest.accept(IngestMessage::Chunk(vec![0; 4])).unwrap();
        assert_eq!(
            ingest.accept(IngestMessage::Chunk(vec![0])),
            Err(TransferError::LimitExceeded { limit: 4 })
        );
    }
}
