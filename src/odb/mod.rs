//! object database: loose objects plus read-only packfiles behind one
//! load/store/exists/prefix-resolve surface

pub mod idx;
pub mod loose;
pub mod pack;

pub use idx::{write_idx, PackIndex};
pub use pack::{apply_delta, encode_pack, Pack};

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{is_full_hex, ObjectId, MIN_PREFIX_LEN};
use crate::object::{frame, split_frame, Kind, Object};

struct PackHandle {
    pack_path: PathBuf,
    index: PackIndex,
    data: RefCell<Option<Rc<Pack>>>,
}

/// unified object database for one repository.
///
/// loose is checked before packs; among packs the first hit wins. the pack
/// list is a process-local cache invalidated by `rescan_packs` after any
/// `objects/pack` mutation.
pub struct ObjectStore {
    objects_dir: PathBuf,
    packs: RefCell<Vec<Rc<PackHandle>>>,
}

impl ObjectStore {
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        let store = Self {
            objects_dir: objects_dir.into(),
            packs: RefCell::new(Vec::new()),
        };
        store.rescan_packs();
        store
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.objects_dir.join("pack")
    }

    /// reload the pack list from `objects/pack/*.idx`; drops cached pack data
    pub fn rescan_packs(&self) {
        let mut packs = Vec::new();
        let pack_dir = self.pack_dir();
        if let Ok(read_dir) = std::fs::read_dir(&pack_dir) {
            for entry in read_dir.flatten() {
                let idx_path = entry.path();
                if idx_path.extension().map(|e| e == "idx") != Some(true) {
                    continue;
                }
                let pack_path = idx_path.with_extension("pack");
                if !pack_path.is_file() {
                    continue;
                }
                match PackIndex::open(&idx_path) {
                    Ok(index) => packs.push(Rc::new(PackHandle {
                        pack_path,
                        index,
                        data: RefCell::new(None),
                    })),
                    Err(e) => warn!(idx = %idx_path.display(), error = %e, "skipping unreadable pack index"),
                }
            }
        }
        debug!(count = packs.len(), dir = %pack_dir.display(), "scanned packs");
        *self.packs.borrow_mut() = packs;
    }

    fn pack_data(&self, handle: &Rc<PackHandle>) -> Result<Rc<Pack>> {
        if let Some(pack) = handle.data.borrow().as_ref() {
            return Ok(Rc::clone(pack));
        }
        let pack = Rc::new(Pack::open(&handle.pack_path)?);
        *handle.data.borrow_mut() = Some(Rc::clone(&pack));
        Ok(pack)
    }

    /// true if the object exists loose or in any pack
    pub fn exists(&self, id: &ObjectId) -> bool {
        if loose::exists(&self.objects_dir, id) {
            return true;
        }
        self.packs
            .borrow()
            .iter()
            .any(|handle| handle.index.contains(id))
    }

    /// true if the object exists in some pack index (gc prune test)
    pub fn is_packed(&self, id: &ObjectId) -> bool {
        self.packs
            .borrow()
            .iter()
            .any(|handle| handle.index.contains(id))
    }

    /// load an object's kind and content bytes
    pub fn load_content(&self, id: &ObjectId) -> Result<(Kind, Vec<u8>)> {
        if loose::exists(&self.objects_dir, id) {
            let framed = loose::read_framed(&self.objects_dir, id)?;
            let (kind, content) = split_frame(&framed)?;
            return Ok((kind, content.to_vec()));
        }
        let hit = {
            let packs = self.packs.borrow();
            packs.iter().find_map(|handle| {
                handle
                    .index
                    .lookup(id)
                    .map(|offset| (Rc::clone(handle), offset))
            })
        };
        if let Some((handle, offset)) = hit {
            let pack = self.pack_data(&handle)?;
            return pack.object_at(offset, &|base| self.load_content(base));
        }
        Err(Error::ObjectNotFound(id.to_hex()))
    }

    /// load and parse an object
    pub fn load(&self, id: &ObjectId) -> Result<Object> {
        let (kind, content) = self.load_content(id)?;
        Object::parse(kind, &content)
    }

    /// raw framed bytes (`"<kind> <size>\0" + content`), loose or packed
    pub fn load_framed(&self, id: &ObjectId) -> Result<Vec<u8>> {
        let (kind, content) = self.load_content(id)?;
        Ok(frame(kind, &content))
    }

    /// write an object loose; returns its id. idempotent.
    pub fn store(&self, object: &Object) -> Result<ObjectId> {
        let id = object.id();
        loose::write_framed(&self.objects_dir, &id, &object.frame())?;
        Ok(id)
    }

    /// write raw content of a known kind loose
    pub fn store_content(&self, kind: Kind, content: &[u8]) -> Result<ObjectId> {
        let id = crate::hash::object_digest(kind.as_str(), content);
        loose::write_framed(&self.objects_dir, &id, &frame(kind, content))?;
        Ok(id)
    }

    /// ingest a received pack: validate, write pack + idx under
    /// `objects/pack/`, and rescan. returns the number of objects indexed.
    pub fn ingest_pack(&self, bytes: Vec<u8>) -> Result<usize> {
        let pack = Pack::parse(bytes)?;
        let pack_sha = pack.pack_sha();
        let pack_dir = self.pack_dir();
        std::fs::create_dir_all(&pack_dir).with_path(&pack_dir)?;

        let tmp = pack_dir.join(format!("tmp-{}.pack", uuid::Uuid::new_v4()));
        std::fs::write(&tmp, pack.bytes()).with_path(&tmp)?;
        let entries = match pack.index_entries(&|base| self.load_content(base)) {
            Ok(entries) => entries,
            Err(e) => {
                // partial packs never survive an abort
                let _ = std::fs::remove_file(&tmp);
                return Err(e);
            }
        };

        let pack_path = pack_dir.join(format!("pack-{}.pack", pack_sha.to_hex()));
        let idx_path = pack_dir.join(format!("pack-{}.idx", pack_sha.to_hex()));
        std::fs::rename(&tmp, &pack_path).with_path(&pack_path)?;

        let triples: Vec<_> = entries
            .iter()
            .map(|e| (e.id, e.offset, e.crc))
            .collect();
        write_idx(&idx_path, &pack_sha, &triples)?;
        debug!(pack = %pack_path.display(), objects = triples.len(), "indexed pack");
        self.rescan_packs();
        Ok(triples.len())
    }

    /// every id matching a hex prefix, across loose and all packs
    pub fn prefix_matches(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        let mut matches = loose::prefix_matches(&self.objects_dir, &prefix)?;
        for handle in self.packs.borrow().iter() {
            for id in handle.index.prefix_matches(&prefix) {
                if !matches.contains(&id) {
                    matches.push(id);
                }
            }
        }
        matches.sort();
        Ok(matches)
    }

    /// resolve a hex prefix (>= 4 chars) to a unique object id
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId> {
        if is_full_hex(prefix) {
            let id = ObjectId::from_hex(&prefix.to_ascii_lowercase())?;
            if self.exists(&id) {
                return Ok(id);
            }
            return Err(Error::ObjectNotFound(prefix.to_string()));
        }
        if prefix.len() < MIN_PREFIX_LEN || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::ObjectNotFound(prefix.to_string()));
        }
        let matches = self.prefix_matches(prefix)?;
        match matches.len() {
            0 => Err(Error::ObjectNotFound(prefix.to_string())),
            1 => Ok(matches[0]),
            _ => Err(Error::AmbiguousPrefix(prefix.to_string())),
        }
    }

    /// all loose object ids
    pub fn list_loose(&self) -> Result<Vec<ObjectId>> {
        loose::list_all(&self.objects_dir)
    }

    /// drop a loose object (gc prune)
    pub fn remove_loose(&self, id: &ObjectId) -> Result<()> {
        loose::remove(&self.objects_dir, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Blob;
    use tempfile::tempdir;

    fn blob(data: &[u8]) -> Object {
        Object::Blob(Blob::new(data.to_vec()))
    }

    #[test]
    fn test_store_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let obj = blob(b"hello\n");
        let id = store.store(&obj).unwrap();
        assert!(store.exists(&id));
        assert_eq!(store.load(&id).unwrap(), obj);
        assert_eq!(store.load_framed(&id).unwrap(), b"blob 6\0hello\n");
    }

    #[test]
    fn test_missing_object() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let id = ObjectId::from_bytes([7; 20]);
        assert!(!store.exists(&id));
        assert!(matches!(store.load(&id), Err(Error::ObjectNotFound(_))));
    }

    #[test]
    fn test_resolve_prefix() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let id = store.store(&blob(b"hello\n")).unwrap();
        let hex = id.to_hex();

        assert_eq!(store.resolve_prefix(&hex).unwrap(), id);
        assert_eq!(store.resolve_prefix(&hex[..6]).unwrap(), id);
        assert!(matches!(
            store.resolve_prefix(&hex[..3]),
            Err(Error::ObjectNotFound(_))
        ));
        assert!(matches!(
            store.resolve_prefix("0000"),
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_ingest_pack_and_load() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        // source objects live only inside the pack
        let contents: Vec<Vec<u8>> = vec![b"one\n".to_vec(), b"two two\n".to_vec()];
        let objects: Vec<_> = contents
            .iter()
            .map(|c| (crate::hash::object_digest("blob", c), c.clone()))
            .collect();
        let ids: Vec<_> = objects.iter().map(|(id, _)| *id).collect();
        let (bytes, _) = encode_pack(&ids, |id| {
            let (_, content) = objects.iter().find(|(oid, _)| oid == id).unwrap();
            Ok((Kind::Blob, content.clone()))
        })
        .unwrap();

        let indexed = store.ingest_pack(bytes).unwrap();
        assert_eq!(indexed, 2);
        for (id, content) in &objects {
            assert!(store.exists(id));
            assert!(!loose::exists(dir.path(), id));
            let (kind, got) = store.load_content(id).unwrap();
            assert_eq!(kind, Kind::Blob);
            assert_eq!(&got, content);
        }
    }

    #[test]
    fn test_prefix_resolution_spans_packs() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let content = b"packed only\n".to_vec();
        let id = crate::hash::object_digest("blob", &content);
        let (bytes, _) =
            encode_pack(&[id], |_| Ok((Kind::Blob, content.clone()))).unwrap();
        store.ingest_pack(bytes).unwrap();

        let hex = id.to_hex();
        assert_eq!(store.resolve_prefix(&hex[..6]).unwrap(), id);
    }

    #[test]
    fn test_rescan_picks_up_new_packs() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        // second handle writes a pack; first sees it only after rescan
        let other = ObjectStore::new(dir.path());
        let content = b"late arrival\n".to_vec();
        let id = crate::hash::object_digest("blob", &content);
        let (bytes, _) =
            encode_pack(&[id], |_| Ok((Kind::Blob, content.clone()))).unwrap();
        other.ingest_pack(bytes).unwrap();

        assert!(!store.exists(&id));
        store.rescan_packs();
        assert!(store.exists(&id));
    }
}
