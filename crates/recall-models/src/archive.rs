// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Archive extraction for model artifacts.
//!
//! ZIP, TAR, and gzip-wrapped TAR are supported. The format is sniffed from
//! magic bytes, not the file name. All functions here block and are meant
//! for `spawn_blocking`.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive entry escapes destination: {0}")]
    UnsafePath(String),
}

/// Container format detected from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn sniff(path: &Path) -> Result<ArchiveFormat, ArchiveError> {
    let mut head = [0u8; 4];
    let mut file = File::open(path)?;
    let n = read_up_to(&mut file, &mut head)?;
    Ok(if n >= 4 && head == ZIP_MAGIC {
        ArchiveFormat::Zip
    } else if n >= 2 && head[..2] == GZIP_MAGIC {
        ArchiveFormat::TarGz
    } else {
        ArchiveFormat::Tar
    })
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Extract `archive` into `dest`, returning the number of files written.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    std::fs::create_dir_all(dest)?;
    match sniff(archive)? {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::TarGz => {
            let decoder = flate2::read::GzDecoder::new(File::open(archive)?);
            extract_tar(decoder, dest)
        }
        ArchiveFormat::Tar => extract_tar(File::open(archive)?, dest),
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let mut files = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ArchiveError::UnsafePath(entry.name().to_string()));
        };
        let out = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
        files += 1;
    }
    Ok(files)
}

fn extract_tar(reader: impl Read, dest: &Path) -> Result<usize, ArchiveError> {
    let mut tar = tar::Archive::new(reader);
    let mut files = 0;
    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if !is_contained(&path) {
            return Err(ArchiveError::UnsafePath(path.display().to_string()));
        }
        let is_file = entry.header().entry_type().is_file();
        if !entry.unpack_in(dest)? {
            return Err(ArchiveError::UnsafePath(path.display().to_string()));
        }
        if is_file {
            files += 1;
        }
    }
    Ok(files)
}

/// True when `path` is relative and never climbs out of its root.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

const FLATTEN_TMP: &str = ".flatten-tmp";

/// If `dir` holds exactly one entry, a directory containing `marker_file`,
/// move that directory's children up into `dir`.
///
/// Returns true when flattening happened.
pub fn flatten_single_root(dir: &Path, marker_file: &str) -> Result<bool, ArchiveError> {
    let entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    let [only] = entries.as_slice() else {
        return Ok(false);
    };
    if !only.is_dir() || !only.join(marker_file).exists() {
        return Ok(false);
    }
    // A child may share the root's name, so the root moves aside first.
    let parked = dir.join(FLATTEN_TMP);
    std::fs::rename(only, &parked)?;
    for child in std::fs::read_dir(&parked)? {
        let child = child?;
        std::fs::rename(child.path(), dir.join(child.file_name()))?;
    }
    std::fs::remove_dir(&parked)?;
    Ok(true)
}

/// Move every entry of `from` into `to`, replacing existing files.
pub fn merge_into(from: &Path, to: &Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() && target.is_dir() {
            merge_into(&entry.path(), &target)?;
            std::fs::remove_dir(entry.path())?;
            continue;
        }
        if target.is_dir() {
            std::fs::remove_dir_all(&target)?;
        } else if target.exists() {
            std::fs::remove_file(&target)?;
        }
        std::fs::rename(entry.path(), &target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn sniffs_by_magic_bytes() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("misnamed.tar");
        write_zip(&zip_path, &[("a.txt", b"a")]);
        assert_eq!(sniff(&zip_path).unwrap(), ArchiveFormat::Zip);

        let gz_path = dir.path().join("lib.bin");
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&tar_bytes(&[("x", b"x")])).unwrap();
        std::fs::write(&gz_path, enc.finish().unwrap()).unwrap();
        assert_eq!(sniff(&gz_path).unwrap(), ArchiveFormat::TarGz);

        let tar_path = dir.path().join("plain");
        std::fs::write(&tar_path, tar_bytes(&[("x", b"x")])).unwrap();
        assert_eq!(sniff(&tar_path).unwrap(), ArchiveFormat::Tar);
    }

    #[test]
    fn zip_extracts_nested_paths() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("w.zip");
        write_zip(
            &archive,
            &[("model-config.json", b"{}"), ("shards/params_shard_0.bin", b"\x00\x01")],
        );
        let out = dir.path().join("out");
        assert_eq!(extract(&archive, &out).unwrap(), 2);
        assert_eq!(std::fs::read(out.join("shards/params_shard_0.bin")).unwrap(), b"\x00\x01");
    }

    #[test]
    fn zip_traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", b"gotcha")]);
        let out = dir.path().join("out");
        assert!(matches!(extract(&archive, &out), Err(ArchiveError::UnsafePath(_))));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn tar_with_trailing_padding_extracts() {
        let dir = tempdir().unwrap();
        let mut bytes = tar_bytes(&[("lib/tokenizer.json", b"{\"v\":1}")]);
        bytes.extend(std::iter::repeat_n(0u8, 4096));
        let archive = dir.path().join("lib.tar");
        std::fs::write(&archive, bytes).unwrap();

        let out = dir.path().join("out");
        assert_eq!(extract(&archive, &out).unwrap(), 1);
        assert_eq!(
            std::fs::read_to_string(out.join("lib/tokenizer.json")).unwrap(),
            "{\"v\":1}"
        );
    }

    #[test]
    fn tar_traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        let name = b"../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(3);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &b"bad"[..]).unwrap();
        let archive = dir.path().join("evil.tar");
        std::fs::write(&archive, builder.into_inner().unwrap()).unwrap();

        let out = dir.path().join("out");
        assert!(matches!(extract(&archive, &out), Err(ArchiveError::UnsafePath(_))));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn flatten_moves_single_root_up() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("Qwen2.5-0.5B");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("model-config.json"), "{}").unwrap();
        std::fs::write(nested.join("params_shard_0.bin"), "w").unwrap();

        assert!(flatten_single_root(dir.path(), "model-config.json").unwrap());
        assert!(dir.path().join("model-config.json").exists());
        assert!(dir.path().join("params_shard_0.bin").exists());
        assert!(!nested.exists());
    }

    #[test]
    fn flatten_handles_child_named_like_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("m");
        std::fs::create_dir_all(root.join("m")).unwrap();
        std::fs::write(root.join("model-config.json"), "{}").unwrap();
        std::fs::write(root.join("m/extra.txt"), "x").unwrap();

        assert!(flatten_single_root(dir.path(), "model-config.json").unwrap());
        assert!(dir.path().join("model-config.json").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("m/extra.txt")).unwrap(), "x");
        assert!(!dir.path().join(FLATTEN_TMP).exists());
    }

    #[test]
    fn flatten_leaves_multi_entry_trees_alone() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a/model-config.json"), "{}").unwrap();
        std::fs::write(dir.path().join("README"), "hi").unwrap();
        assert!(!flatten_single_root(dir.path(), "model-config.json").unwrap());

        let other = tempdir().unwrap();
        std::fs::create_dir_all(other.path().join("lib")).unwrap();
        std::fs::write(other.path().join("lib/any.so"), "x").unwrap();
        assert!(!flatten_single_root(other.path(), "model-config.json").unwrap());
    }

    #[test]
    fn merge_replaces_and_recurses() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        std::fs::create_dir_all(from.join("lib")).unwrap();
        std::fs::create_dir_all(to.join("lib")).unwrap();
        std::fs::write(from.join("lib/new.txt"), "new").unwrap();
        std::fs::write(from.join("top.txt"), "v2").unwrap();
        std::fs::write(to.join("lib/old.txt"), "old").unwrap();
        std::fs::write(to.join("top.txt"), "v1").unwrap();

        merge_into(&from, &to).unwrap();
        assert_eq!(std::fs::read_to_string(to.join("top.txt")).unwrap(), "v2");
        assert!(to.join("lib/old.txt").exists());
        assert!(to.join("lib/new.txt").exists());
    }
}
