//! packfile codec: reader for v2 packs (whole, OFS-delta and REF-delta
//! entries) and a writer that emits whole objects only

use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{object_digest, sha1_digest, Hasher, ObjectId};
use crate::object::Kind;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
const PACK_VERSION: u32 = 2;
const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = 20;

const TYPE_OFS_DELTA: u8 = 6;
const TYPE_REF_DELTA: u8 = 7;

/// how a pack entry refers to its delta base
#[derive(Clone, Debug, PartialEq, Eq)]
enum BaseRef {
    None,
    ById(ObjectId),
    ByDistance(u64),
}

/// decoded pack entry header
#[derive(Clone, Debug)]
struct EntryHeader {
    type_code: u8,
    inflated_size: u64,
    header_len: usize,
    base: BaseRef,
}

/// resolves delta bases that live outside the pack (loose or another pack);
/// returns (kind, content)
pub type BaseResolver<'a> = dyn Fn(&ObjectId) -> Result<(Kind, Vec<u8>)> + 'a;

/// an open packfile held in memory
pub struct Pack {
    data: Vec<u8>,
}

impl Pack {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_path(path)?;
        Self::parse(data)
    }

    /// validate header, object count and SHA-1 trailer
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(Error::MalformedPack("pack too short".into()));
        }
        if &data[..4] != PACK_SIGNATURE {
            return Err(Error::MalformedPack("bad pack signature".into()));
        }
        let version = BigEndian::read_u32(&data[4..8]);
        if version != 2 && version != 3 {
            return Err(Error::MalformedPack(format!("pack version {version}")));
        }
        let trailer = ObjectId::from_slice(&data[data.len() - TRAILER_LEN..])?;
        let computed = sha1_digest(&data[..data.len() - TRAILER_LEN]);
        if trailer != computed {
            return Err(Error::MalformedPack("pack checksum mismatch".into()));
        }
        Ok(Self { data })
    }

    pub fn object_count(&self) -> u32 {
        BigEndian::read_u32(&self.data[8..12])
    }

    /// the validated pack bytes, trailer included
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// SHA-1 trailer of the pack
    pub fn pack_sha(&self) -> ObjectId {
        ObjectId::from_slice(&self.data[self.data.len() - TRAILER_LEN..]).expect("validated")
    }

    /// load and fully resolve the object at a pack offset
    pub fn object_at(&self, offset: u64, external: &BaseResolver) -> Result<(Kind, Vec<u8>)> {
        self.object_at_depth(offset, external, 0)
    }

    fn object_at_depth(
        &self,
        offset: u64,
        external: &BaseResolver,
        depth: u32,
    ) -> Result<(Kind, Vec<u8>)> {
        // delta chains in valid packs are short; 512 is far past any real one
        if depth > 512 {
            return Err(Error::MalformedPack("delta chain too deep".into()));
        }
        let offset = offset as usize;
        let header = decode_entry_header(&self.data, offset)?;
        let data_start = offset + header.header_len;
        let (payload, _) = inflate_at(&self.data, data_start, header.inflated_size)?;

        match header.base {
            BaseRef::None => {
                let kind = Kind::from_pack_type(header.type_code)?;
                Ok((kind, payload))
            }
            BaseRef::ByDistance(distance) => {
                let base_offset = (offset as u64)
                    .checked_sub(distance)
                    .ok_or_else(|| Error::MalformedPack("ofs-delta before pack start".into()))?;
                let (kind, base) = self.object_at_depth(base_offset, external, depth + 1)?;
                Ok((kind, apply_delta(&base, &payload)?))
            }
            BaseRef::ById(base_id) => {
                let (kind, base) = external(&base_id)?;
                Ok((kind, apply_delta(&base, &payload)?))
            }
        }
    }

    /// walk the whole pack, resolving every entry.
    ///
    /// returns (id, kind, content, entry offset, crc32-of-entry-bytes) per
    /// object, in pack order; used to build the idx after a fetch.
    pub fn index_entries(&self, external: &BaseResolver) -> Result<Vec<PackEntry>> {
        let count = self.object_count() as usize;
        let end = self.data.len() - TRAILER_LEN;

        // first pass: offsets and extents
        let mut extents = Vec::with_capacity(count);
        let mut offset = HEADER_LEN;
        for _ in 0..count {
            if offset >= end {
                return Err(Error::MalformedPack("pack truncated".into()));
            }
            let header = decode_entry_header(&self.data, offset)?;
            let data_start = offset + header.header_len;
            let (_, consumed) = inflate_at(&self.data, data_start, header.inflated_size)?;
            let next = data_start + consumed;
            extents.push((offset, next));
            offset = next;
        }
        if offset != end {
            return Err(Error::MalformedPack("trailing garbage in pack".into()));
        }

        let mut entries = Vec::with_capacity(count);
        for (start, next) in extents {
            let (kind, content) = self.object_at(start as u64, external)?;
            let id = object_digest(kind.as_str(), &content);
            let mut crc = crc32fast::Hasher::new();
            crc.update(&self.data[start..next]);
            entries.push(PackEntry {
                id,
                kind,
                content,
                offset: start as u64,
                crc: crc.finalize(),
            });
        }
        Ok(entries)
    }
}

/// one fully resolved pack entry
pub struct PackEntry {
    pub id: ObjectId,
    pub kind: Kind,
    pub content: Vec<u8>,
    pub offset: u64,
    pub crc: u32,
}

fn decode_entry_header(data: &[u8], offset: usize) -> Result<EntryHeader> {
    let mut pos = offset;
    let first = *data
        .get(pos)
        .ok_or_else(|| Error::MalformedPack("entry header truncated".into()))?;
    pos += 1;
    let type_code = (first >> 4) & 0x07;
    let mut size = (first & 0x0f) as u64;
    let mut shift = 4;
    let mut byte = first;
    while byte & 0x80 != 0 {
        byte = *data
            .get(pos)
            .ok_or_else(|| Error::MalformedPack("size encoding truncated".into()))?;
        pos += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    let base = match type_code {
        TYPE_REF_DELTA => {
            if pos + 20 > data.len() {
                return Err(Error::MalformedPack("ref-delta base truncated".into()));
            }
            let id = ObjectId::from_slice(&data[pos..pos + 20])?;
            pos += 20;
            BaseRef::ById(id)
        }
        TYPE_OFS_DELTA => {
            let (distance, n) = decode_ofs_distance(&data[pos..])?;
            pos += n;
            BaseRef::ByDistance(distance)
        }
        _ => BaseRef::None,
    };

    Ok(EntryHeader {
        type_code,
        inflated_size: size,
        header_len: pos - offset,
        base,
    })
}

/// big-endian base-128 with +1 accumulation per continuation byte
fn decode_ofs_distance(data: &[u8]) -> Result<(u64, usize)> {
    let mut byte = *data
        .first()
        .ok_or_else(|| Error::MalformedPack("ofs encoding truncated".into()))?;
    let mut value = (byte & 0x7f) as u64;
    let mut n = 1;
    while byte & 0x80 != 0 {
        byte = *data
            .get(n)
            .ok_or_else(|| Error::MalformedPack("ofs encoding truncated".into()))?;
        value = ((value + 1) << 7) | (byte & 0x7f) as u64;
        n += 1;
    }
    Ok((value, n))
}

/// inflate one zlib stream starting at `start`; returns (bytes, consumed)
fn inflate_at(data: &[u8], start: usize, expected: u64) -> Result<(Vec<u8>, usize)> {
    if start > data.len() {
        return Err(Error::MalformedPack("entry data out of range".into()));
    }
    let mut decompress = Decompress::new(true);
    let mut out = Vec::with_capacity(expected as usize);
    loop {
        let status = decompress
            .decompress_vec(&data[start + decompress.total_in() as usize..], &mut out, FlushDecompress::Finish)
            .map_err(|e| Error::MalformedPack(format!("zlib: {e}")))?;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if out.len() == out.capacity() {
                    out.reserve(8192);
                } else if decompress.total_in() as usize + start >= data.len() {
                    return Err(Error::MalformedPack("zlib stream truncated".into()));
                }
            }
        }
    }
    if out.len() as u64 != expected {
        return Err(Error::MalformedPack(format!(
            "inflated size mismatch: header says {expected}, got {}",
            out.len()
        )));
    }
    Ok((out, decompress.total_in() as usize))
}

/// apply a git delta stream to a base; output must match the declared size
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let base_size = read_delta_varint(delta, &mut pos)?;
    let result_size = read_delta_varint(delta, &mut pos)?;
    if base_size as usize != base.len() {
        return Err(Error::MalformedPack(format!(
            "delta base size mismatch: expected {base_size}, got {}",
            base.len()
        )));
    }

    let mut out = Vec::with_capacity(result_size as usize);
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;
        if cmd & 0x80 != 0 {
            // copy from base: low nibble selects offset bytes, next 3 bits size bytes
            let mut offset = 0usize;
            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or_else(|| Error::MalformedPack("delta copy truncated".into()))?;
                    offset |= (byte as usize) << (8 * i);
                    pos += 1;
                }
            }
            let mut size = 0usize;
            for i in 0..3 {
                if cmd & (1 << (4 + i)) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or_else(|| Error::MalformedPack("delta copy truncated".into()))?;
                    size |= (byte as usize) << (8 * i);
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            let end = offset
                .checked_add(size)
                .filter(|&e| e <= base.len())
                .ok_or_else(|| Error::MalformedPack("delta copy out of range".into()))?;
            out.extend_from_slice(&base[offset..end]);
        } else if cmd != 0 {
            // insert the next cmd bytes literally
            let end = pos + cmd as usize;
            if end > delta.len() {
                return Err(Error::MalformedPack("delta insert truncated".into()));
            }
            out.extend_from_slice(&delta[pos..end]);
            pos = end;
        } else {
            return Err(Error::MalformedPack("delta command 0".into()));
        }
    }

    if out.len() as u64 != result_size {
        return Err(Error::MalformedPack(format!(
            "delta result size mismatch: expected {result_size}, got {}",
            out.len()
        )));
    }
    Ok(out)
}

fn read_delta_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| Error::MalformedPack("delta varint truncated".into()))?;
        *pos += 1;
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// encode an entry header for a whole (non-delta) object
fn encode_entry_header(kind: Kind, size: usize) -> Vec<u8> {
    let mut size = size as u64;
    let mut first = (kind.pack_type() << 4) | (size & 0x0f) as u8;
    size >>= 4;
    let mut out = Vec::with_capacity(4);
    if size != 0 {
        first |= 0x80;
    }
    out.push(first);
    while size != 0 {
        let mut byte = (size & 0x7f) as u8;
        size >>= 7;
        if size != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}

/// serialize a pack of whole objects, in the given order.
///
/// returns the full pack bytes (including SHA-1 trailer) and an
/// (id, offset, crc32) triple per entry, ready for `write_idx`.
pub fn encode_pack<F>(ids: &[ObjectId], get: F) -> Result<(Vec<u8>, Vec<(ObjectId, u64, u32)>)>
where
    F: Fn(&ObjectId) -> Result<(Kind, Vec<u8>)>,
{
    let mut out = Vec::new();
    out.extend_from_slice(PACK_SIGNATURE);
    out.write_u32::<BigEndian>(PACK_VERSION).expect("vec write");
    out.write_u32::<BigEndian>(ids.len() as u32).expect("vec write");

    let mut entries = Vec::with_capacity(ids.len());
    for id in ids {
        let (kind, content) = get(id)?;
        let offset = out.len() as u64;
        let mut entry = encode_entry_header(kind, content.len());
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&content).expect("write to vec");
        entry.extend_from_slice(&encoder.finish().expect("finish to vec"));

        let mut crc = crc32fast::Hasher::new();
        crc.update(&entry);
        entries.push((*id, offset, crc.finalize()));
        out.extend_from_slice(&entry);
    }

    let mut hasher = Hasher::new();
    hasher.update(&out);
    let pack_sha = hasher.finalize();
    out.extend_from_slice(pack_sha.as_bytes());
    Ok((out, entries))
}
