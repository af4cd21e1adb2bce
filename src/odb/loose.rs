//! loose object storage: one zlib-deflated file per object under
//! `objects/<aa>/<38 hex>`

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::ObjectId;

/// filesystem path of a loose object
pub fn object_path(objects_dir: &Path, id: &ObjectId) -> PathBuf {
    let (dir, file) = id.to_path_components();
    objects_dir.join(dir).join(file)
}

/// true if the object exists loose
pub fn exists(objects_dir: &Path, id: &ObjectId) -> bool {
    object_path(objects_dir, id).exists()
}

/// read a loose object; returns the inflated framed bytes
pub fn read_framed(objects_dir: &Path, id: &ObjectId) -> Result<Vec<u8>> {
    let path = object_path(objects_dir, id);
    let compressed = fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ObjectNotFound(id.to_hex())
        } else {
            Error::Io { path, source: e }
        }
    })?;
    inflate(&compressed).map_err(|_| Error::MalformedObject(format!("bad zlib stream for {id}")))
}

/// write framed bytes as a loose object.
///
/// staged in a temp file in the target directory, fsynced, then renamed.
/// an existing file wins: content addressing makes concurrent writes of the
/// same id idempotent.
pub fn write_framed(objects_dir: &Path, id: &ObjectId, framed: &[u8]) -> Result<()> {
    let path = object_path(objects_dir, id);
    if path.exists() {
        return Ok(());
    }
    let dir = path.parent().expect("object path has a parent");
    fs::create_dir_all(dir).with_path(dir)?;

    let tmp_path = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    {
        let mut tmp = File::create(&tmp_path).with_path(&tmp_path)?;
        let mut encoder = ZlibEncoder::new(&mut tmp, Compression::default());
        encoder.write_all(framed).with_path(&tmp_path)?;
        encoder.finish().with_path(&tmp_path)?;
        tmp.sync_all().with_path(&tmp_path)?;
    }
    if path.exists() {
        // lost the race; the other writer's bytes are equivalent
        let _ = fs::remove_file(&tmp_path);
        return Ok(());
    }
    fs::rename(&tmp_path, &path).with_path(&path)?;
    Ok(())
}

/// delete a loose object if present (used by gc prune)
pub fn remove(objects_dir: &Path, id: &ObjectId) -> Result<()> {
    let path = object_path(objects_dir, id);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io { path, source: e }),
    }
}

/// all loose ids whose hex starts with prefix (>= 2 chars)
pub fn prefix_matches(objects_dir: &Path, prefix: &str) -> Result<Vec<ObjectId>> {
    let prefix = prefix.to_ascii_lowercase();
    let mut matches = Vec::new();
    let dirs: Vec<String> = if prefix.len() >= 2 {
        vec![prefix[..2].to_string()]
    } else {
        return Ok(matches);
    };
    for dir_name in dirs {
        let dir = objects_dir.join(&dir_name);
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir).with_path(&dir)? {
            let entry = entry.with_path(&dir)?;
            let name = entry.file_name().to_string_lossy().to_string();
            let full = format!("{dir_name}{name}");
            if full.len() == 40 && full.starts_with(&prefix) {
                if let Ok(id) = ObjectId::from_hex(&full) {
                    matches.push(id);
                }
            }
        }
    }
    matches.sort();
    Ok(matches)
}

/// walk every loose object id in the store
pub fn list_all(objects_dir: &Path) -> Result<Vec<ObjectId>> {
    let mut ids = Vec::new();
    if !objects_dir.is_dir() {
        return Ok(ids);
    }
    for entry in fs::read_dir(objects_dir).with_path(objects_dir)? {
        let entry = entry.with_path(objects_dir)?;
        let dir_name = entry.file_name().to_string_lossy().to_string();
        if dir_name.len() != 2 || !entry.path().is_dir() {
            continue;
        }
        for file in fs::read_dir(entry.path()).with_path(entry.path())? {
            let file = file.with_path(entry.path())?;
            let name = file.file_name().to_string_lossy().to_string();
            if let Ok(id) = ObjectId::from_hex(&format!("{dir_name}{name}")) {
                ids.push(id);
            }
        }
    }
    ids.sort();
    Ok(ids)
}

/// inflate a zlib stream fully
pub fn inflate(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// deflate bytes with the given compression level
pub fn deflate(data: &[u8], level: Compression) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(data).expect("write to vec");
    encoder.finish().expect("finish to vec")
}
