//! Log record - the unit of durable storage in a [`FileStore`](super::FileStore)

use super::WriteBatch;
use crate::model::Hash;

/// Type tag for records
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// One committed write batch
    Batch,
    /// The whole store, written by compaction
    Snapshot,
}

impl RecordKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            RecordKind::Batch => 0,
            RecordKind::Snapshot => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RecordKind::Batch),
            1 => Some(RecordKind::Snapshot),
            _ => None,
        }
    }
}

/// Flag byte values following the kind byte
const RAW: u8 = 0;
const ZSTD: u8 = 1;

/// A typed list of write batches
///
/// On disk: `[len: u32 LE][checksum: 32 bytes][payload]` where the payload is
/// `[kind][flag][bincode(batches), zstd-compressed if flag says so]` and the
/// checksum is BLAKE3 over the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    pub batches: Vec<WriteBatch>,
}

/// Bytes preceding a record's payload
pub const FRAME_HEADER_SIZE: usize = 4 + 32;

impl Record {
    pub fn batch(batch: WriteBatch) -> Self {
        Record {
            kind: RecordKind::Batch,
            batches: vec![batch],
        }
    }

    pub fn snapshot(batches: Vec<WriteBatch>) -> Self {
        Record {
            kind: RecordKind::Snapshot,
            batches,
        }
    }

    /// Encode into a framed record; `compression_level` 0 disables zstd
    pub fn encode(&self, compression_level: i32) -> crate::Result<Vec<u8>> {
        let data = bincode::serialize(&self.batches)?;

        let mut payload = Vec::with_capacity(data.len() + 2);
        payload.push(self.kind.as_byte());
        if compression_level > 0 {
            payload.push(ZSTD);
            payload.extend(zstd::encode_all(data.as_slice(), compression_level)?);
        } else {
            payload.push(RAW);
            payload.extend(data);
        }

        let len = u32::try_from(payload.len())
            .map_err(|_| crate::Error::Commit(format!("record too large: {} bytes", payload.len())))?;
        let checksum = Hash::digest(&payload);

        let mut output = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(checksum.as_bytes());
        output.extend(payload);
        Ok(output)
    }

    /// Decode a payload whose checksum was already verified
    pub fn decode(payload: &[u8]) -> crate::Result<Self> {
        if payload.len() < 2 {
            return Err(crate::Error::Corruption("Record payload too short".into()));
        }

        let kind = RecordKind::from_byte(payload[0]).ok_or_else(|| {
            crate::Error::Corruption(format!("Invalid record kind: {}", payload[0]))
        })?;

        let batches = match payload[1] {
            RAW => bincode::deserialize(&payload[2..])?,
            ZSTD => {
                let data = zstd::decode_all(&payload[2..])?;
                bincode::deserialize(&data)?
            }
            flag => {
                return Err(crate::Error::Corruption(format!(
                    "Invalid record flag: {}",
                    flag
                )))
            }
        };

        Ok(Record { kind, batches })
    }

    /// Split a frame header into payload length and checksum
    pub fn parse_frame_header(header: &[u8; FRAME_HEADER_SIZE]) -> (usize, Hash) {
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[0..4]);
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&header[4..]);
        (u32::from_le_bytes(len) as usize, Hash::from_bytes(checksum))
    }
}
