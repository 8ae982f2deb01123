//! Persistence — component F.
//!
//! Two modes, both built on the same block format: a CRC-checksummed
//! header followed by four independently-checksummed regions (see
//! `DESIGN.md` for where this block format comes from):
//!
//! - Region A: per-slot metadata (label, level, tombstone/allocated/reused
//!   bits), one entry per slot in ascending slot-id order.
//! - Region B: per-slot vector plus per-layer neighbor lists, same order.
//! - Region C: the label directory, as `(label, slot)` pairs sorted by
//!   slot id (so two saves of the same state are byte-identical
//!   regardless of the in-memory hash map's iteration order).
//! - Region D: original (pre-normalization) vectors, present only when
//!   the index was configured with `store_original`; otherwise an empty
//!   region.
//!
//! **Snapshot** mode writes all of this as one file. **Persistent** mode
//! splits it into a `header.bin` and a `regions.bin` inside a directory.
//! This crate does not track dirty state at byte-range granularity the
//! way a real mmapped page table would; `persist_dirty` instead rewrites
//! `regions.bin` in full whenever any slot is dirty (see `DESIGN.md` for
//! why this trade was made and what it costs).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;
use memmap2::Mmap;

use crate::arena::{Arena, SlotMeta};
use crate::config::{IndexConfig, PersistenceMode, SpaceKind};
use crate::encoding::{Decode, Encode, EncodingError, decode_vec, encode_vec};
use crate::error::{IndexError, Result, write_lock};
use crate::graph::{EntryPoint, Graph};
use crate::labels::LabelDirectory;

mod encoding_impls;
use encoding_impls::{StoredMeta, StoredSlotBody};

#[cfg(test)]
mod tests;

const MAGIC: [u8; 4] = *b"HNS0";
const VERSION: u32 = 1;

const FLAG_COSINE: u32 = 1 << 0;
const FLAG_STORE_ORIGINAL: u32 = 1 << 1;
const FLAG_ALLOW_REPLACE_DELETED: u32 = 1 << 2;
/// Set for raw (non-normalized) inner-product spaces so reload can tell
/// them apart from `L2` — cosine already has its own bit, so only this
/// one was missing to make `SpaceKind` round-trip exactly.
const FLAG_INNER_PRODUCT: u32 = 1 << 3;

struct Header {
    dim: u32,
    m: u32,
    ef_construction: u32,
    capacity: u64,
    element_count: u64,
    enter_slot: i64,
    enter_level: i32,
    seed: u64,
    flags: u32,
}

impl Header {
    fn encode_fields(&self, crc: u32, buf: &mut Vec<u8>) -> std::result::Result<(), EncodingError> {
        MAGIC.encode_to(buf)?;
        VERSION.encode_to(buf)?;
        self.dim.encode_to(buf)?;
        self.m.encode_to(buf)?;
        self.ef_construction.encode_to(buf)?;
        self.capacity.encode_to(buf)?;
        self.element_count.encode_to(buf)?;
        self.enter_slot.encode_to(buf)?;
        self.enter_level.encode_to(buf)?;
        self.seed.encode_to(buf)?;
        self.flags.encode_to(buf)?;
        crc.encode_to(buf)?;
        Ok(())
    }

    /// Encodes with the CRC field zeroed, hashes, re-encodes with the real
    /// CRC, then hashes the whole thing again for an outer trailing CRC —
    /// the same "zero, re-encode, hash, compare" technique used elsewhere
    /// in this crate's persistence format.
    fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut zeroed = Vec::new();
        self.encode_fields(0, &mut zeroed)?;
        let mut hasher = Crc32::new();
        hasher.update(&zeroed);
        let inner_crc = hasher.finalize();

        let mut header_bytes = Vec::new();
        self.encode_fields(inner_crc, &mut header_bytes)?;

        let mut hasher = Crc32::new();
        hasher.update(&header_bytes);
        let outer_crc = hasher.finalize();

        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&outer_crc.to_le_bytes());
        Ok(())
    }

    fn read(buf: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let (magic, n) = <[u8; 4]>::decode_from(&buf[offset..])?;
        offset += n;
        if magic != MAGIC {
            return Err(IndexError::Corruption("bad header magic".into()));
        }
        let (version, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        if version != VERSION {
            return Err(IndexError::Corruption(format!(
                "unsupported on-disk version {version}"
            )));
        }
        let (dim, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (m, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (ef_construction, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (capacity, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (element_count, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (enter_slot, n) = i64::decode_from(&buf[offset..])?;
        offset += n;
        let (enter_level, n) = i32::decode_from(&buf[offset..])?;
        offset += n;
        let (seed, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (flags, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (inner_crc, n) = u32::decode_from(&buf[offset..])?;
        offset += n;

        let header_bytes_len = offset;
        let mut hasher = Crc32::new();
        hasher.update(&buf[..header_bytes_len]);
        let expected_outer = hasher.finalize();

        let (outer_crc, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        if outer_crc != expected_outer {
            return Err(IndexError::Corruption("header outer CRC mismatch".into()));
        }

        let mut zeroed = Vec::new();
        let zero_header = Header {
            dim,
            m,
            ef_construction,
            capacity,
            element_count,
            enter_slot,
            enter_level,
            seed,
            flags,
        };
        zero_header.encode_fields(0, &mut zeroed)?;
        let mut hasher = Crc32::new();
        hasher.update(&zeroed);
        if hasher.finalize() != inner_crc {
            return Err(IndexError::Corruption("header inner CRC mismatch".into()));
        }

        Ok((zero_header, offset))
    }
}

fn write_checksummed_block(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| IndexError::Corruption("region too large to encode".into()))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(data);
    let mut hasher = Crc32::new();
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(())
}

fn read_checksummed_block<'a>(buf: &'a [u8], name: &str) -> Result<(&'a [u8], usize)> {
    if buf.len() < 4 {
        return Err(IndexError::Corruption(format!("{name}: truncated length")));
    }
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let mut offset = 4;
    if buf.len() < offset + len + 4 {
        return Err(IndexError::Corruption(format!("{name}: truncated body")));
    }
    let data = &buf[offset..offset + len];
    offset += len;
    let stored_crc = u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]);
    offset += 4;
    let mut hasher = Crc32::new();
    hasher.update(data);
    if hasher.finalize() != stored_crc {
        return Err(IndexError::Corruption(format!("{name}: checksum mismatch")));
    }
    Ok((data, offset))
}

fn space_kind_from_flags(flags: u32) -> Result<SpaceKind> {
    Ok(if flags & FLAG_COSINE != 0 {
        SpaceKind::Cosine
    } else if flags & FLAG_INNER_PRODUCT != 0 {
        SpaceKind::InnerProduct
    } else {
        SpaceKind::L2
    })
}

/// Serializes the full in-memory state of `graph` into one buffer:
/// header + regions A-D.
fn encode_full_image(graph: &Graph, config: &IndexConfig) -> Result<Vec<u8>> {
    let capacity = graph.capacity()?;
    let entry = graph.entry_point()?;
    let flags = flags_for(config);

    let header = Header {
        dim: u32::try_from(config.dim)
            .map_err(|_| IndexError::InvalidArgument("dim exceeds u32".into()))?,
        m: u32::try_from(config.m).map_err(|_| IndexError::InvalidArgument("m exceeds u32".into()))?,
        ef_construction: u32::try_from(config.ef_construction)
            .map_err(|_| IndexError::InvalidArgument("ef_construction exceeds u32".into()))?,
        capacity: capacity as u64,
        element_count: graph.next_slot_count() as u64,
        enter_slot: entry.map(|e| e.slot as i64).unwrap_or(-1),
        enter_level: entry.map(|e| e.level as i32).unwrap_or(-1),
        seed: config.seed,
        flags,
    };

    let mut out = Vec::new();
    header.write(&mut out)?;

    let mut region_a = Vec::new();
    let mut region_b = Vec::new();
    let mut region_c = Vec::new();
    let mut metas: Vec<SlotMeta> = Vec::with_capacity(capacity);
    for id in 0..capacity as u32 {
        metas.push(graph.arena.meta(id)?);
    }
    encode_vec(
        &metas.iter().map(|&m| StoredMeta::from(m)).collect::<Vec<_>>(),
        &mut region_a,
    )?;

    let mut bodies: Vec<StoredSlotBody> = Vec::with_capacity(capacity);
    for id in 0..capacity as u32 {
        bodies.push(StoredSlotBody {
            vector: graph.arena.vector(id)?,
            links: graph.arena.links(id)?,
        });
    }
    encode_vec(&bodies, &mut region_b)?;

    let mut label_pairs = graph.label_pairs()?;
    label_pairs.sort_unstable_by_key(|&(_, slot)| slot);
    encode_vec(&label_pairs, &mut region_c)?;

    let mut region_d = Vec::new();
    if config.store_original {
        let mut originals: Vec<Option<Vec<f32>>> = Vec::with_capacity(capacity);
        for id in 0..capacity as u32 {
            originals.push(graph.arena.original(id)?);
        }
        encode_vec(&originals, &mut region_d)?;
    }

    write_checksummed_block(&mut out, &region_a)?;
    write_checksummed_block(&mut out, &region_b)?;
    write_checksummed_block(&mut out, &region_c)?;
    write_checksummed_block(&mut out, &region_d)?;

    Ok(out)
}

fn flags_for(config: &IndexConfig) -> u32 {
    let mut flags = 0;
    match config.space {
        SpaceKind::Cosine => flags |= FLAG_COSINE,
        SpaceKind::InnerProduct => flags |= FLAG_INNER_PRODUCT,
        SpaceKind::L2 => {}
    }
    if config.store_original {
        flags |= FLAG_STORE_ORIGINAL;
    }
    if config.allow_replace_deleted {
        flags |= FLAG_ALLOW_REPLACE_DELETED;
    }
    flags
}

struct DecodedImage {
    config: IndexConfig,
    arena: Arena,
    labels: LabelDirectory,
    entry: Option<EntryPoint>,
    next_slot: u32,
    tombstones: Vec<crate::arena::SlotId>,
}

fn decode_full_image(buf: &[u8], persistence: PersistenceMode) -> Result<DecodedImage> {
    let (header, mut offset) = Header::read(buf)?;
    let space = space_kind_from_flags(header.flags)?;
    let store_original = header.flags & FLAG_STORE_ORIGINAL != 0;
    let allow_replace_deleted = header.flags & FLAG_ALLOW_REPLACE_DELETED != 0;

    let (region_a, n) = read_checksummed_block(&buf[offset..], "region A (slot metadata)")?;
    offset += n;
    let (region_b, n) = read_checksummed_block(&buf[offset..], "region B (vectors/links)")?;
    offset += n;
    let (region_c, n) = read_checksummed_block(&buf[offset..], "region C (label directory)")?;
    offset += n;
    let (region_d, _n) = read_checksummed_block(&buf[offset..], "region D (original vectors)")?;

    let (metas, _) = decode_vec::<StoredMeta>(region_a)?;
    let (bodies, _) = decode_vec::<StoredSlotBody>(region_b)?;
    let (label_pairs, _) = decode_vec::<(u64, u32)>(region_c)?;
    let originals: Vec<Option<Vec<f32>>> = if store_original {
        decode_vec::<Option<Vec<f32>>>(region_d)?.0
    } else {
        Vec::new()
    };

    let capacity = header.capacity as usize;
    if metas.len() != capacity || bodies.len() != capacity {
        return Err(IndexError::Corruption(
            "slot region length does not match header capacity".into(),
        ));
    }

    let arena = Arena::new(capacity, header.dim as usize, store_original);
    let mut tombstones = Vec::new();
    for (id, (meta, body)) in metas.into_iter().zip(bodies.into_iter()).enumerate() {
        let id = id as u32;
        let slot_meta: SlotMeta = meta.into();
        for neighbors in &body.links {
            for &nb in neighbors {
                if nb as usize >= capacity {
                    return Err(IndexError::Corruption(format!(
                        "slot {id} links to out-of-range slot {nb}"
                    )));
                }
            }
        }
        if slot_meta.allocated && slot_meta.tombstone {
            tombstones.push(id);
        }
        let original = if store_original { originals.get(id as usize).cloned().flatten() } else { None };
        arena.set_vector(id, body.vector, original)?;
        arena.with_meta_mut(id, |m| *m = slot_meta)?;
        let handle = arena.slot_handle(id)?;
        *write_lock(&handle.links, "links")? = body.links;
    }

    let labels = LabelDirectory::from_pairs(label_pairs);

    let entry = if header.enter_slot >= 0 {
        Some(EntryPoint { slot: header.enter_slot as u32, level: header.enter_level as u32 })
    } else {
        None
    };

    let config = IndexConfig {
        dim: header.dim as usize,
        space,
        m: header.m as usize,
        ef_construction: header.ef_construction as usize,
        seed: header.seed,
        allow_replace_deleted,
        store_original,
        persistence,
    };

    Ok(DecodedImage {
        config,
        arena,
        labels,
        entry,
        next_slot: header.element_count as u32,
        tombstones,
    })
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = tmp_path_for(path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Maps `path` read-only. Memory safe because the file is never written to
/// after this point, the mapping itself is read-only, and every region read
/// off it goes through `read_checksummed_block`'s bounds checks before any
/// byte is interpreted.
fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// `save(path)`. Writes the full image atomically.
pub fn save_snapshot(graph: &Graph, config: &IndexConfig, path: &Path) -> Result<()> {
    let bytes = encode_full_image(graph, config)?;
    atomic_write(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "saved snapshot");
    Ok(())
}

/// `load(path, ...)` for snapshot mode. Rebuilds a [`Graph`] from the
/// on-disk image; `check_integrity` is left for the caller (`Index::load`)
/// to invoke, per §4.D `[ADD]`.
pub fn load_snapshot(path: &Path, persistence: PersistenceMode) -> Result<(IndexConfig, Graph)> {
    let mmap = mmap_file(path)?;
    let image = decode_full_image(&mmap, persistence)?;
    let graph = Graph::from_parts(
        &image.config,
        image.arena,
        image.labels,
        image.entry,
        image.next_slot,
        image.tombstones,
    );
    graph.mark_all_allocated_dirty()?;
    tracing::info!(path = %path.display(), "loaded snapshot");
    Ok((image.config, graph))
}

fn header_path(dir: &Path) -> PathBuf {
    dir.join("header.bin")
}

fn regions_path(dir: &Path) -> PathBuf {
    dir.join("regions.bin")
}

/// `persist_dirty()` for persistent mode. Rewrites `regions.bin` in full
/// whenever any slot is dirty, then atomically updates `header.bin` — see
/// the module doc and `DESIGN.md` for why this isn't true page-level
/// dirty tracking.
pub fn persist_dirty(graph: &Graph, config: &IndexConfig, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let dirty = graph.take_dirty()?;
    // The very first flush has to write a full image even with nothing
    // dirty, or a zero-mutation index (e.g. just-initialized, capacity 0)
    // would have no header/regions pair for `load_persistent` to read back.
    let first_write = !header_path(dir).exists();
    if !dirty.is_empty() || first_write {
        let bytes = encode_full_image(graph, config)?;
        // The regions are self-contained after the header in the combined
        // image; split them off so header.bin and regions.bin can each be
        // rewritten atomically on their own.
        let (_header, header_len) = Header::read(&bytes)?;
        atomic_write(&regions_path(dir), &bytes[header_len..])?;
        atomic_write(&header_path(dir), &bytes[..header_len])?;
        tracing::debug!(dirty = dirty.len(), dir = %dir.display(), first_write, "flushed dirty pages");
    } else {
        tracing::trace!(dir = %dir.display(), "persist_dirty: nothing dirty");
    }
    Ok(())
}

/// `load(path, ..., persistent=true)`. Reads `header.bin` + `regions.bin`
/// back from `dir`.
pub fn load_persistent(dir: &Path) -> Result<(IndexConfig, Graph)> {
    let header_mmap = mmap_file(&header_path(dir))?;
    let regions_mmap = mmap_file(&regions_path(dir))?;
    let mut combined = Vec::with_capacity(header_mmap.len() + regions_mmap.len());
    combined.extend_from_slice(&header_mmap);
    combined.extend_from_slice(&regions_mmap);

    let image = decode_full_image(&combined, PersistenceMode::Persistent { dir: dir.to_path_buf() })?;
    let graph = Graph::from_parts(
        &image.config,
        image.arena,
        image.labels,
        image.entry,
        image.next_slot,
        image.tombstones,
    );
    graph.mark_all_allocated_dirty()?;
    tracing::info!(dir = %dir.display(), "loaded persistent index");
    Ok((image.config, graph))
}
