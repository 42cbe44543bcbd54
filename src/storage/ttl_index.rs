//! TTL Secondary Index
//!
//! Encoded index entries mapping `(expire_time, db, type, key)` to the key
//! that must be deleted once its TTL elapses.

use bytes::{BufMut, Bytes, BytesMut};

use super::StorageError;

/// Byte length of the fixed-width header: expire (8) + db id (4) + type (1).
const HEADER_LEN: usize = 8 + 4 + 1;

/// Value-type discriminator carried in every TTL index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    String = 0,
    Hash = 1,
    List = 2,
    Set = 3,
    ZSet = 4,
}

impl ValueType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::String),
            1 => Some(Self::Hash),
            2 => Some(Self::List),
            3 => Some(Self::Set),
            4 => Some(Self::ZSet),
            _ => None,
        }
    }
}

/// One decoded TTL index entry.
///
/// The encoded form is total-ordered: entries sort first by expiration
/// timestamp, so a cursor bounded at `now` yields exactly the elapsed TTLs.
/// Two entries with the same encoded form are the same entry.
#[derive(Debug, Clone)]
pub struct TtlIndexEntry {
    expire_at_ms: u64,
    db_id: u32,
    vtype: ValueType,
    primary_key: Bytes,
    encoded: Bytes,
}

impl TtlIndexEntry {
    /// Build an entry and its encoded index key.
    pub fn new(expire_at_ms: u64, db_id: u32, vtype: ValueType, primary_key: Bytes) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + primary_key.len());
        buf.put_u64(expire_at_ms);
        buf.put_u32(db_id);
        buf.put_u8(vtype.as_u8());
        buf.put_slice(&primary_key);
        Self {
            expire_at_ms,
            db_id,
            vtype,
            primary_key,
            encoded: buf.freeze(),
        }
    }

    /// Decode an index key produced by [`TtlIndexEntry::new`].
    pub fn decode(raw: &[u8]) -> Result<Self, StorageError> {
        if raw.len() < HEADER_LEN {
            return Err(StorageError::CorruptIndexEntry(raw.len()));
        }
        let expire_at_ms = u64::from_be_bytes(raw[0..8].try_into().unwrap());
        let db_id = u32::from_be_bytes(raw[8..12].try_into().unwrap());
        let vtype = ValueType::from_u8(raw[12])
            .ok_or(StorageError::CorruptIndexEntry(raw.len()))?;
        Ok(Self {
            expire_at_ms,
            db_id,
            vtype,
            primary_key: Bytes::copy_from_slice(&raw[HEADER_LEN..]),
            encoded: Bytes::copy_from_slice(raw),
        })
    }

    /// Smallest encoded key strictly greater than every entry expiring at or
    /// before `now`. Used as the exclusive upper bound of expiration cursors.
    pub fn upper_bound(now_ms: u64) -> Bytes {
        Bytes::copy_from_slice(&now_ms.saturating_add(1).to_be_bytes())
    }

    pub fn expire_at_ms(&self) -> u64 {
        self.expire_at_ms
    }

    pub fn db_id(&self) -> u32 {
        self.db_id
    }

    pub fn vtype(&self) -> ValueType {
        self.vtype
    }

    pub fn primary_key(&self) -> &Bytes {
        &self.primary_key
    }

    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }
}

impl PartialEq for TtlIndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for TtlIndexEntry {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_orders_by_expiration_first() {
        let early = TtlIndexEntry::new(100, 9, ValueType::Hash, Bytes::from_static(b"zz"));
        let late = TtlIndexEntry::new(200, 0, ValueType::String, Bytes::from_static(b"aa"));
        assert!(early.encoded() < late.encoded());

        // Same expiration: db id breaks the tie.
        let db0 = TtlIndexEntry::new(100, 0, ValueType::String, Bytes::from_static(b"zz"));
        let db1 = TtlIndexEntry::new(100, 1, ValueType::String, Bytes::from_static(b"aa"));
        assert!(db0.encoded() < db1.encoded());
    }

    #[test]
    fn decode_recovers_fields() {
        let entry = TtlIndexEntry::new(1234, 7, ValueType::Set, Bytes::from_static(b"user:42"));
        let decoded = TtlIndexEntry::decode(entry.encoded()).unwrap();
        assert_eq!(decoded.expire_at_ms(), 1234);
        assert_eq!(decoded.db_id(), 7);
        assert_eq!(decoded.vtype(), ValueType::Set);
        assert_eq!(decoded.primary_key().as_ref(), b"user:42");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn decode_rejects_truncated_input() {
        assert!(TtlIndexEntry::decode(b"short").is_err());
    }

    #[test]
    fn upper_bound_splits_elapsed_from_pending() {
        let elapsed = TtlIndexEntry::new(100, 0, ValueType::String, Bytes::from_static(b"k"));
        let pending = TtlIndexEntry::new(101, 0, ValueType::String, Bytes::from_static(b"k"));
        let bound = TtlIndexEntry::upper_bound(100);
        assert!(elapsed.encoded() < &bound);
        assert!(pending.encoded() >= &bound);
    }
}
