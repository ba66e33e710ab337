use crate::ArchiveError;
use hoist_dist::{escape_id, BuildModule, DiffId};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Build the layer tar for one module inside `out_dir`, returning the tar
/// path and its content hash.
///
/// The module's content root lands under
/// `cnb/<kind>s/<escaped-id>/<version>/`, which is where downstream
/// consumers expect to find a packaged module's filesystem.
pub fn module_layer_tar(
    out_dir: &Path,
    module: &dyn BuildModule,
) -> Result<(PathBuf, DiffId), ArchiveError> {
    let info = &module.descriptor().info;
    let tar_path = out_dir.join(format!("{}-{}.tar", escape_id(&info.id), info.version));
    let prefix = format!(
        "cnb/{}/{}/{}",
        module.kind().dir_name(),
        escape_id(&info.id),
        info.version
    );
    write_dir_tar(&tar_path, module.content_root(), &prefix)?;
    let diff_id = layer_diff_id(&tar_path)?;
    debug!(
        "layer tar for {} at {} ({diff_id})",
        info.full_name(),
        tar_path.display()
    );
    Ok((tar_path, diff_id))
}

/// Content hash of an uncompressed layer tar.
pub fn layer_diff_id(tar_path: &Path) -> Result<DiffId, ArchiveError> {
    Ok(DiffId::new(format!("sha256:{}", file_sha256(tar_path)?)))
}

/// Streaming sha256 of a file, hex-encoded.
pub fn file_sha256(path: &Path) -> Result<String, ArchiveError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Create a deterministic tar archive of a directory tree at `dest`.
///
/// A non-empty `prefix` (`a/b/c`, no trailing slash) is prepended to every
/// entry, with synthetic directory entries emitted for each prefix level.
///
/// Determinism guarantees:
/// - Entries sorted lexicographically by relative path
/// - All timestamps set to 0 (Unix epoch)
/// - All ownership set to 0:0 (root:root)
/// - Permissions preserved as-is from source
pub fn write_dir_tar(dest: &Path, source_dir: &Path, prefix: &str) -> Result<(), ArchiveError> {
    let mut entries = collect_entries(source_dir, source_dir)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ar = tar::Builder::new(BufWriter::new(File::create(dest)?));
    ar.follow_symlinks(false);

    if !prefix.is_empty() {
        let mut ancestor = String::new();
        for part in prefix.split('/') {
            ancestor.push_str(part);
            ancestor.push('/');
            append_synthetic_dir(&mut ar, &ancestor)?;
        }
    }

    for (rel_path, full_path) in &entries {
        let name = if prefix.is_empty() {
            rel_path.clone()
        } else {
            format!("{prefix}/{rel_path}")
        };

        let ft = match full_path.symlink_metadata() {
            Ok(m) => m.file_type(),
            Err(e) => {
                warn!("skipping {name}: metadata error: {e}");
                continue;
            }
        };

        if ft.is_file() {
            append_file(&mut ar, &name, full_path)?;
        } else if ft.is_dir() {
            append_dir(&mut ar, &name, full_path)?;
        } else if ft.is_symlink() {
            append_symlink(&mut ar, &name, full_path)?;
        } else {
            warn!("skipping unsupported file type: {name}");
        }
    }

    let mut inner = ar.into_inner()?;
    inner.flush()?;
    Ok(())
}

/// Extract a tar archive to a target directory.
pub fn unpack_tar(tar_path: &Path, target_dir: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(target_dir)?;
    let mut ar = tar::Archive::new(BufReader::new(File::open(tar_path)?));
    ar.set_preserve_permissions(true);
    ar.set_preserve_mtime(false);
    ar.set_unpack_xattrs(false);
    ar.unpack(target_dir)?;
    Ok(())
}

/// Recursively collect (relative_path, full_path) pairs from a directory tree.
fn collect_entries(root: &Path, current: &Path) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
    let mut result = Vec::new();
    if !current.exists() {
        return Ok(result);
    }
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let full = entry.path();
        let rel = full
            .strip_prefix(root)
            .map_err(|e| ArchiveError::Io(std::io::Error::other(format!("path strip: {e}"))))?
            .to_string_lossy()
            .to_string();

        let meta = full.symlink_metadata()?;
        if meta.is_dir() {
            result.push((rel.clone(), full.clone()));
            result.extend(collect_entries(root, &full)?);
        } else {
            result.push((rel, full));
        }
    }
    Ok(result)
}

fn make_header(full_path: &Path, entry_type: tar::EntryType) -> Result<tar::Header, ArchiveError> {
    let meta = full_path.symlink_metadata()?;
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(meta.permissions().mode());
    Ok(header)
}

fn append_synthetic_dir<W: Write>(
    ar: &mut tar::Builder<W>,
    path: &str,
) -> Result<(), ArchiveError> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(0o755);
    header.set_size(0);
    header.set_cksum();
    ar.append_data(&mut header, path, &[] as &[u8])?;
    Ok(())
}

fn append_file<W: Write>(
    ar: &mut tar::Builder<W>,
    name: &str,
    full_path: &Path,
) -> Result<(), ArchiveError> {
    let data = fs::read(full_path)?;
    let mut header = make_header(full_path, tar::EntryType::Regular)?;
    header.set_size(data.len() as u64);
    header.set_cksum();
    ar.append_data(&mut header, name, data.as_slice())?;
    Ok(())
}

fn append_dir<W: Write>(
    ar: &mut tar::Builder<W>,
    name: &str,
    full_path: &Path,
) -> Result<(), ArchiveError> {
    let mut header = make_header(full_path, tar::EntryType::Directory)?;
    header.set_size(0);
    header.set_cksum();
    let path = if name.ends_with('/') {
        name.to_owned()
    } else {
        format!("{name}/")
    };
    ar.append_data(&mut header, &path, &[] as &[u8])?;
    Ok(())
}

fn append_symlink<W: Write>(
    ar: &mut tar::Builder<W>,
    name: &str,
    full_path: &Path,
) -> Result<(), ArchiveError> {
    let target = fs::read_link(full_path)?;
    let mut header = make_header(full_path, tar::EntryType::Symlink)?;
    header.set_size(0);
    header.set_cksum();
    ar.append_link(&mut header, name, &target)?;
    Ok(())
}
