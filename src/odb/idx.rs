//! pack index v2: fanout + sorted names + crc32 + offsets, trailing
//! pack/idx SHA-1s

use std::io::Cursor;
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{Hasher, ObjectId};

const IDX_SIGNATURE: [u8; 4] = [0xff, b't', b'O', b'c'];
const IDX_VERSION: u32 = 2;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// parsed pack index v2
pub struct PackIndex {
    fanout: [u32; 256],
    names: Vec<ObjectId>,
    offsets: Vec<u64>,
    pack_sha: ObjectId,
}

impl PackIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_path(path)?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 + 256 * 4 + 40 {
            return Err(Error::MalformedPack("idx too short".into()));
        }
        if data[..4] != IDX_SIGNATURE {
            return Err(Error::MalformedPack("bad idx signature".into()));
        }
        let mut cursor = Cursor::new(&data[4..]);
        let version = cursor.read_u32::<BigEndian>().expect("len checked");
        if version != IDX_VERSION {
            return Err(Error::MalformedPack(format!("idx version {version}")));
        }

        let mut fanout = [0u32; 256];
        for slot in fanout.iter_mut() {
            *slot = cursor.read_u32::<BigEndian>().expect("len checked");
        }
        let count = fanout[255] as usize;

        let names_start = 8 + 256 * 4;
        let crc_start = names_start + count * 20;
        let offsets_start = crc_start + count * 4;
        let large_start = offsets_start + count * 4;
        let trailer_start = data.len() - 40;
        if large_start > trailer_start {
            return Err(Error::MalformedPack("idx truncated".into()));
        }

        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let at = names_start + i * 20;
            names.push(ObjectId::from_slice(&data[at..at + 20])?);
        }

        let mut raw_offsets = Vec::with_capacity(count);
        let mut cursor = Cursor::new(&data[offsets_start..offsets_start + count * 4]);
        for _ in 0..count {
            raw_offsets.push(cursor.read_u32::<BigEndian>().expect("len checked"));
        }

        let mut offsets = Vec::with_capacity(count);
        for raw in raw_offsets {
            if raw & LARGE_OFFSET_FLAG == 0 {
                offsets.push(raw as u64);
            } else {
                let slot = (raw & !LARGE_OFFSET_FLAG) as usize;
                let at = large_start + slot * 8;
                if at + 8 > trailer_start {
                    return Err(Error::MalformedPack("idx large offset out of range".into()));
                }
                let mut cursor = Cursor::new(&data[at..at + 8]);
                offsets.push(cursor.read_u64::<BigEndian>().expect("len checked"));
            }
        }

        let pack_sha = ObjectId::from_slice(&data[trailer_start..trailer_start + 20])?;

        Ok(Self {
            fanout,
            names,
            offsets,
            pack_sha,
        })
    }

    pub fn object_count(&self) -> usize {
        self.names.len()
    }

    pub fn pack_sha(&self) -> ObjectId {
        self.pack_sha
    }

    /// pack offset for an object, or None if not in this index
    pub fn lookup(&self, id: &ObjectId) -> Option<u64> {
        let first = id.first_byte() as usize;
        let lo = if first == 0 {
            0
        } else {
            self.fanout[first - 1] as usize
        };
        let hi = self.fanout[first] as usize;
        let slice = &self.names[lo..hi];
        slice
            .binary_search(id)
            .ok()
            .map(|i| self.offsets[lo + i])
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lookup(id).is_some()
    }

    /// ids in index order
    pub fn ids(&self) -> &[ObjectId] {
        &self.names
    }

    /// ids whose hex starts with prefix; the fanout bounds the scan once the
    /// prefix pins the first byte
    pub fn prefix_matches(&self, prefix: &str) -> Vec<ObjectId> {
        let prefix = prefix.to_ascii_lowercase();
        let (lo, hi) = if prefix.len() >= 2 {
            match u8::from_str_radix(&prefix[..2], 16) {
                Ok(first) => {
                    let first = first as usize;
                    let lo = if first == 0 {
                        0
                    } else {
                        self.fanout[first - 1] as usize
                    };
                    (lo, self.fanout[first] as usize)
                }
                Err(_) => return Vec::new(),
            }
        } else {
            (0, self.names.len())
        };
        self.names[lo..hi]
            .iter()
            .filter(|id| id.to_hex().starts_with(&prefix))
            .copied()
            .collect()
    }
}

/// serialize an idx v2 for `entries` = (id, pack offset, crc32), in any
/// order; returns the idx bytes including both trailers
pub fn encode_idx(pack_sha: &ObjectId, entries: &[(ObjectId, u64, u32)]) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by_key(|(id, _, _)| *id);

    let mut fanout = [0u32; 256];
    for (id, _, _) in &sorted {
        fanout[id.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }

    let mut out = Vec::new();
    out.extend_from_slice(&IDX_SIGNATURE);
    out.write_u32::<BigEndian>(IDX_VERSION).expect("vec write");
    for count in fanout {
        out.write_u32::<BigEndian>(count).expect("vec write");
    }
    for (id, _, _) in &sorted {
        out.extend_from_slice(id.as_bytes());
    }
    for (_, _, crc) in &sorted {
        out.write_u32::<BigEndian>(*crc).expect("vec write");
    }
    let mut large = Vec::new();
    for (_, offset, _) in &sorted {
        if *offset < LARGE_OFFSET_FLAG as u64 {
            out.write_u32::<BigEndian>(*offset as u32).expect("vec write");
        } else {
            let slot = large.len() as u32;
            large.push(*offset);
            out.write_u32::<BigEndian>(LARGE_OFFSET_FLAG | slot)
                .expect("vec write");
        }
    }
    for offset in large {
        out.write_u64::<BigEndian>(offset).expect("vec write");
    }
    out.extend_from_slice(pack_sha.as_bytes());

    let mut hasher = Hasher::new();
    hasher.update(&out);
    let idx_sha = hasher.finalize();
    out.extend_from_slice(idx_sha.as_bytes());
    out
}

/// write an idx v2 file atomically next to its pack
pub fn write_idx(path: &Path, pack_sha: &ObjectId, entries: &[(ObjectId, u64, u32)]) -> Result<()> {
    let bytes = encode_idx(pack_sha, entries);
    let dir = path.parent().expect("idx path has a parent");
    std::fs::create_dir_all(dir).with_path(dir)?;
    let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, &bytes).with_path(&tmp)?;
    std::fs::rename(&tmp, path).with_path(path)?;
    Ok(())
}
