//! Layer application.
//!
//! A layer is a tar archive, usually gzip-compressed, applied on top of a
//! root directory. Entries overwrite what earlier layers placed. Whiteout
//! markers (`.wh.<name>` and the opaque `.wh..wh..opq`) delete content from
//! earlier layers instead of being written out.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use corral_common::error::{CorralError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Outcome of applying one layer archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedLayer {
    /// Size of the archive on disk, in bytes.
    pub size_bytes: u64,
    /// Entries written under the root.
    pub entries: usize,
    /// Whiteout markers honoured.
    pub whiteouts: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum Whiteout {
    /// Hide the entry at this root-relative path.
    Entry(PathBuf),
    /// Empty the directory at this root-relative path.
    Opaque(PathBuf),
}

/// Applies the layer archive at `archive` on top of `root`.
///
/// Compression is detected from the archive's leading bytes, not its name.
/// Permission bits are preserved and existing files are overwritten. Entries
/// that would land outside `root` are skipped.
///
/// # Errors
///
/// Returns `CorralError::Extract` if the archive cannot be read or decoded,
/// or an entry cannot be written, and `CorralError::Filesystem` if `root`
/// cannot be created.
pub fn apply_layer(archive: &Path, root: &Path) -> Result<AppliedLayer> {
    let fail = |source: io::Error| CorralError::Extract {
        archive: archive.to_path_buf(),
        source,
    };
    tracing::info!(
        archive = %archive.display(),
        root = %root.display(),
        "applying layer"
    );

    fs::create_dir_all(root).map_err(|e| CorralError::filesystem(root, e))?;

    let mut file = File::open(archive).map_err(fail)?;
    let size_bytes = file.metadata().map_err(fail)?.len();
    let reader: Box<dyn Read> = if starts_with_gzip_magic(&mut file).map_err(fail)? {
        Box::new(flate2::read::GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut tarball = tar::Archive::new(reader);
    tarball.set_preserve_permissions(true);
    tarball.set_overwrite(true);

    let mut applied = AppliedLayer {
        size_bytes,
        entries: 0,
        whiteouts: 0,
    };
    for entry in tarball.entries().map_err(fail)? {
        let mut entry = entry.map_err(fail)?;
        let path = entry.path().map_err(fail)?.into_owned();

        if let Some(whiteout) = classify(&path) {
            if apply_whiteout(root, &whiteout).map_err(fail)? {
                applied.whiteouts += 1;
            }
            continue;
        }

        if entry.unpack_in(root).map_err(fail)? {
            applied.entries += 1;
        } else {
            tracing::warn!(path = %path.display(), "skipped entry outside the root");
        }
    }

    tracing::info!(
        size = applied.size_bytes,
        entries = applied.entries,
        whiteouts = applied.whiteouts,
        "layer applied"
    );
    Ok(applied)
}

/// Reports whether `file` begins with the gzip magic and rewinds it.
fn starts_with_gzip_magic(file: &mut File) -> io::Result<bool> {
    let mut magic = [0_u8; 2];
    let read = file.read(&mut magic)?;
    let _ = file.seek(SeekFrom::Start(0))?;
    Ok(read == magic.len() && magic == GZIP_MAGIC)
}

/// Recognises whiteout markers, yielding the root-relative path they act on.
///
/// Markers whose path escapes the root are not recognised and fall through
/// to `unpack_in`, which refuses them.
fn classify(path: &Path) -> Option<Whiteout> {
    let name = path.file_name()?.to_str()?;
    let parent = confined(path.parent().unwrap_or_else(|| Path::new("")))?;
    if name == OPAQUE_WHITEOUT {
        return Some(Whiteout::Opaque(parent));
    }
    let hidden = name.strip_prefix(WHITEOUT_PREFIX)?;
    if hidden.is_empty() || hidden == "." || hidden == ".." {
        return None;
    }
    Some(Whiteout::Entry(parent.join(hidden)))
}

/// Normalises an archive path to plain components, rejecting `..`.
fn confined(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Returns `root/relative` if no directory between them is a symlink.
fn resolve_in_root(root: &Path, relative: &Path) -> io::Result<Option<PathBuf>> {
    for ancestor in relative.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        match fs::symlink_metadata(root.join(ancestor)) {
            Ok(meta) if meta.file_type().is_symlink() => return Ok(None),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(Some(root.join(relative)))
}

/// Removes a file, symlink or directory tree without following symlinks.
fn remove_path(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn apply_whiteout(root: &Path, whiteout: &Whiteout) -> io::Result<bool> {
    match whiteout {
        Whiteout::Entry(relative) => {
            let Some(target) = resolve_in_root(root, relative)? else {
                return Ok(false);
            };
            let meta = match fs::symlink_metadata(&target) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(e),
            };
            remove_path(&target, &meta)?;
            tracing::debug!(path = %target.display(), "whiteout removed entry");
            Ok(true)
        }
        Whiteout::Opaque(relative) => {
            let Some(dir) = resolve_in_root(root, relative)? else {
                return Ok(false);
            };
            match fs::symlink_metadata(&dir) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(e),
            }
            for child in fs::read_dir(&dir)? {
                let child = child?;
                remove_path(&child.path(), &child.metadata()?)?;
            }
            tracing::debug!(path = %dir.display(), "opaque whiteout cleared directory");
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    enum Item<'a> {
        File(&'a str, &'a [u8], u32),
        Dir(&'a str),
        Symlink(&'a str, &'a str),
    }

    fn build_tar<W: io::Write>(sink: W, items: &[Item<'_>]) -> W {
        let mut builder = tar::Builder::new(sink);
        for item in items {
            let mut header = tar::Header::new_gnu();
            match *item {
                Item::File(path, data, mode) => {
                    header.set_size(data.len() as u64);
                    header.set_mode(mode);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, path, data)
                        .expect("failed to append file");
                }
                Item::Dir(path) => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, path, io::empty())
                        .expect("failed to append dir");
                }
                Item::Symlink(path, target) => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    header
                        .set_link_name(target)
                        .expect("failed to set link name");
                    header.set_cksum();
                    builder
                        .append_data(&mut header, path, io::empty())
                        .expect("failed to append symlink");
                }
            }
        }
        builder.into_inner().expect("failed to finish tar")
    }

    fn write_layer_gz(dir: &Path, name: &str, items: &[Item<'_>]) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).expect("failed to create archive");
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let encoder = build_tar(encoder, items);
        let _ = encoder.finish().expect("failed to finish gzip");
        path
    }

    fn write_layer_plain(dir: &Path, name: &str, items: &[Item<'_>]) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).expect("failed to create archive");
        let _ = build_tar(file, items);
        path
    }

    #[test]
    fn apply_gzip_layer_creates_expected_files() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let archive = write_layer_gz(
            dir.path(),
            "layer.tar.gz",
            &[
                Item::Dir("etc"),
                Item::File("etc/hostname", b"hello from gzipped layer", 0o644),
            ],
        );
        let root = dir.path().join("root");

        let applied = apply_layer(&archive, &root).expect("apply failed");
        assert_eq!(applied.entries, 2);
        assert!(applied.size_bytes > 0);
        let content = fs::read_to_string(root.join("etc/hostname")).expect("read failed");
        assert_eq!(content, "hello from gzipped layer");
    }

    #[test]
    fn apply_detects_plain_tar_by_content() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let archive = write_layer_plain(
            dir.path(),
            "misnamed.tar.gz",
            &[Item::File("hello.txt", b"hello from layer", 0o644)],
        );
        let root = dir.path().join("root");

        let _ = apply_layer(&archive, &root).expect("apply failed");
        let content = fs::read_to_string(root.join("hello.txt")).expect("read failed");
        assert_eq!(content, "hello from layer");
    }

    #[test]
    fn apply_preserves_executable_bits() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let archive = write_layer_gz(
            dir.path(),
            "layer.tar.gz",
            &[Item::File("tool", b"#!/bin/sh\n", 0o755)],
        );
        let root = dir.path().join("root");

        let _ = apply_layer(&archive, &root).expect("apply failed");
        let mode = fs::metadata(root.join("tool")).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn later_layer_overwrites_earlier() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let lower = write_layer_gz(
            dir.path(),
            "lower.tar.gz",
            &[Item::File("motd", b"lower", 0o644), Item::File("keep", b"kept", 0o644)],
        );
        let upper = write_layer_gz(dir.path(), "upper.tar.gz", &[Item::File("motd", b"upper", 0o644)]);
        let root = dir.path().join("root");

        let _ = apply_layer(&lower, &root).expect("lower");
        let _ = apply_layer(&upper, &root).expect("upper");

        assert_eq!(fs::read_to_string(root.join("motd")).expect("read"), "upper");
        assert_eq!(fs::read_to_string(root.join("keep")).expect("read"), "kept");
    }

    #[test]
    fn whiteout_removes_file_and_symlink_from_lower_layer() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let lower = write_layer_gz(
            dir.path(),
            "lower.tar.gz",
            &[
                Item::Dir("etc"),
                Item::File("etc/secret", b"gone soon", 0o600),
                Item::Symlink("dangling", "nowhere"),
            ],
        );
        let upper = write_layer_gz(
            dir.path(),
            "upper.tar.gz",
            &[
                Item::File("etc/.wh.secret", b"", 0o644),
                Item::File(".wh.dangling", b"", 0o644),
            ],
        );
        let root = dir.path().join("root");

        let _ = apply_layer(&lower, &root).expect("lower");
        let applied = apply_layer(&upper, &root).expect("upper");

        assert_eq!(applied.whiteouts, 2);
        assert_eq!(applied.entries, 0);
        assert!(root.join("etc").is_dir());
        assert!(!root.join("etc/secret").exists());
        assert!(!root.join("etc/.wh.secret").exists());
        assert!(fs::symlink_metadata(root.join("dangling")).is_err());
    }

    #[test]
    fn whiteout_of_directory_removes_tree() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let lower = write_layer_gz(
            dir.path(),
            "lower.tar.gz",
            &[Item::Dir("cache"), Item::File("cache/blob", b"x", 0o644)],
        );
        let upper = write_layer_gz(dir.path(), "upper.tar.gz", &[Item::File(".wh.cache", b"", 0o644)]);
        let root = dir.path().join("root");

        let _ = apply_layer(&lower, &root).expect("lower");
        let _ = apply_layer(&upper, &root).expect("upper");
        assert!(!root.join("cache").exists());
    }

    #[test]
    fn opaque_whiteout_empties_directory_but_keeps_it() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let lower = write_layer_gz(
            dir.path(),
            "lower.tar.gz",
            &[
                Item::Dir("opt"),
                Item::File("opt/a", b"a", 0o644),
                Item::Dir("opt/sub"),
                Item::File("opt/sub/b", b"b", 0o644),
            ],
        );
        let upper = write_layer_gz(
            dir.path(),
            "upper.tar.gz",
            &[
                Item::File("opt/.wh..wh..opq", b"", 0o644),
                Item::File("opt/new", b"new", 0o644),
            ],
        );
        let root = dir.path().join("root");

        let _ = apply_layer(&lower, &root).expect("lower");
        let _ = apply_layer(&upper, &root).expect("upper");

        let mut names: Vec<_> = fs::read_dir(root.join("opt"))
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().into_string().expect("utf8"))
            .collect();
        names.sort();
        assert_eq!(names, ["new"]);
    }

    #[test]
    fn whiteout_for_missing_entry_is_ignored() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let archive = write_layer_gz(dir.path(), "layer.tar.gz", &[Item::File(".wh.ghost", b"", 0o644)]);
        let root = dir.path().join("root");

        let applied = apply_layer(&archive, &root).expect("apply");
        assert_eq!(applied.whiteouts, 0);
        assert!(!root.join(".wh.ghost").exists());
    }

    #[test]
    fn garbage_archive_is_extract_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let archive = dir.path().join("garbage.tar.gz");
        fs::write(&archive, [0x1f, 0x8b, 0x00, 0x01, 0x02, 0x03]).expect("write");

        let result = apply_layer(&archive, &dir.path().join("root"));
        assert!(matches!(result, Err(CorralError::Extract { .. })));
    }

    #[test]
    fn missing_archive_is_extract_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let result = apply_layer(&dir.path().join("missing.tar.gz"), &dir.path().join("out"));
        assert!(matches!(result, Err(CorralError::Extract { .. })));
    }

    #[test]
    fn classify_recognises_markers() {
        assert_eq!(
            classify(Path::new("etc/.wh.passwd")),
            Some(Whiteout::Entry(PathBuf::from("etc/passwd")))
        );
        assert_eq!(
            classify(Path::new("./var/.wh..wh..opq")),
            Some(Whiteout::Opaque(PathBuf::from("var")))
        );
        assert_eq!(classify(Path::new("etc/passwd")), None);
        assert_eq!(classify(Path::new(".hidden")), None);
        assert_eq!(classify(Path::new("../.wh.escape")), None);
    }

    #[test]
    fn resolve_refuses_paths_through_symlinks() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let root = dir.path().join("root");
        fs::create_dir_all(&root).expect("mkdir");
        std::os::unix::fs::symlink(dir.path(), root.join("escape")).expect("symlink");

        let resolved = resolve_in_root(&root, Path::new("escape/victim")).expect("resolve");
        assert_eq!(resolved, None);
    }
}
