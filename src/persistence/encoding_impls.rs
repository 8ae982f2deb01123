//! `Encode`/`Decode` impls the shared [`crate::encoding`] module doesn't
//! provide, plus the small on-disk record types this module serializes.

use crate::arena::{SlotId, SlotMeta};
use crate::encoding::{Decode, Encode, EncodingError, decode_vec, encode_vec};

impl Encode for f32 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_bits().to_le_bytes());
        Ok(())
    }
}

impl Decode for f32 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (bits, consumed) = u32::decode_from(buf)?;
        Ok((f32::from_bits(bits), consumed))
    }
}

/// A concrete `Vec<f32>` impl, distinct from the `Vec<u8>` specialization
/// and the generic `encode_vec`/`decode_vec` free functions — needed so
/// `Option<Vec<f32>>` (the original-vector region's element type) can use
/// the blanket `Option<T: Decode>` impl.
impl Encode for Vec<f32> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encode_vec(self, buf)
    }
}

impl Decode for Vec<f32> {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        decode_vec::<f32>(buf)
    }
}

/// A `(label, slot)` binding from the label directory (region C).
impl Encode for (u64, u32) {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.0.encode_to(buf)?;
        self.1.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for (u64, u32) {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (label, n1) = u64::decode_from(buf)?;
        let (slot, n2) = u32::decode_from(&buf[n1..])?;
        Ok(((label, slot), n1 + n2))
    }
}

/// One slot's metadata, as persisted in region A.
pub(super) struct StoredMeta {
    pub label: u64,
    pub level: u32,
    pub tombstone: bool,
    pub allocated: bool,
    pub reused: bool,
}

impl From<SlotMeta> for StoredMeta {
    fn from(m: SlotMeta) -> Self {
        StoredMeta {
            label: m.label,
            level: m.level,
            tombstone: m.tombstone,
            allocated: m.allocated,
            reused: m.reused,
        }
    }
}

impl From<StoredMeta> for SlotMeta {
    fn from(m: StoredMeta) -> Self {
        SlotMeta {
            label: m.label,
            level: m.level,
            tombstone: m.tombstone,
            allocated: m.allocated,
            reused: m.reused,
        }
    }
}

impl Encode for StoredMeta {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.label.encode_to(buf)?;
        self.level.encode_to(buf)?;
        self.tombstone.encode_to(buf)?;
        self.allocated.encode_to(buf)?;
        self.reused.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for StoredMeta {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (label, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (level, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (tombstone, n) = bool::decode_from(&buf[offset..])?;
        offset += n;
        let (allocated, n) = bool::decode_from(&buf[offset..])?;
        offset += n;
        let (reused, n) = bool::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            StoredMeta { label, level, tombstone, allocated, reused },
            offset,
        ))
    }
}

/// One slot's vector plus its neighbor lists, as persisted in region B.
pub(super) struct StoredSlotBody {
    pub vector: Vec<f32>,
    pub links: Vec<Vec<SlotId>>,
}

impl Encode for StoredSlotBody {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encode_vec(&self.vector, buf)?;
        len_prefixed_links(&self.links, buf)?;
        Ok(())
    }
}

impl Decode for StoredSlotBody {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (vector, n) = decode_vec::<f32>(&buf[offset..])?;
        offset += n;
        let (links, n) = decode_links(&buf[offset..])?;
        offset += n;
        Ok((StoredSlotBody { vector, links }, offset))
    }
}

fn len_prefixed_links(links: &[Vec<SlotId>], buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    let layer_count = u32::try_from(links.len())
        .map_err(|_| EncodingError::LengthOverflow("too many layers".into()))?;
    layer_count.encode_to(buf)?;
    for layer in links {
        encode_vec(layer, buf)?;
    }
    Ok(())
}

fn decode_links(buf: &[u8]) -> Result<(Vec<Vec<SlotId>>, usize), EncodingError> {
    let (layer_count, mut offset) = u32::decode_from(buf)?;
    let mut layers = Vec::with_capacity(layer_count as usize);
    for _ in 0..layer_count {
        let (layer, n) = decode_vec::<SlotId>(&buf[offset..])?;
        offset += n;
        layers.push(layer);
    }
    Ok((layers, offset))
}
