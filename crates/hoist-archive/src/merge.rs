use crate::ArchiveError;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Concatenate the entries of several layer tars into one archive.
///
/// Entries keep their original headers. Duplicate directory entries (every
/// module tar carries its own `cnb/` ancestry) collapse to a single entry;
/// regular files are appended as-is since distinct modules never share file
/// paths inside a layer.
pub fn merge_tars(dest: &Path, sources: &[PathBuf]) -> Result<(), ArchiveError> {
    let mut ar = tar::Builder::new(BufWriter::new(File::create(dest)?));
    let mut seen_dirs: BTreeSet<String> = BTreeSet::new();

    for source in sources {
        let mut archive = tar::Archive::new(BufReader::new(File::open(source)?));
        for entry in archive.entries()? {
            let mut entry = entry?;
            let mut header = entry.header().clone();
            let path = entry.path()?.into_owned();
            let entry_type = header.entry_type();

            if entry_type == tar::EntryType::Directory {
                let name = path.to_string_lossy().to_string();
                if !seen_dirs.insert(name) {
                    continue;
                }
                ar.append_data(&mut header, &path, &[] as &[u8])?;
            } else if entry_type == tar::EntryType::Symlink || entry_type == tar::EntryType::Link {
                let target = entry.link_name()?.ok_or_else(|| {
                    ArchiveError::InvalidLayout(format!(
                        "link entry '{}' in '{}' has no target",
                        path.display(),
                        source.display()
                    ))
                })?;
                ar.append_link(&mut header, &path, &target)?;
            } else {
                ar.append_data(&mut header, &path, &mut entry)?;
            }
        }
    }

    let mut inner = ar.into_inner()?;
    inner.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{layer_diff_id, unpack_tar, write_dir_tar};
    use std::fs;

    fn module_tar(out: &Path, name: &str, file: &str, content: &str) -> PathBuf {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join(file), content).unwrap();
        let tar_path = out.join(format!("{name}.tar"));
        write_dir_tar(&tar_path, src.path(), &format!("cnb/buildpacks/{name}/1.0.0")).unwrap();
        tar_path
    }

    #[test]
    fn merged_tar_contains_all_module_trees() {
        let out = tempfile::tempdir().unwrap();
        let a = module_tar(out.path(), "a", "run.sh", "a-content");
        let b = module_tar(out.path(), "b", "run.sh", "b-content");

        let merged = out.path().join("merged.tar");
        merge_tars(&merged, &[a, b]).unwrap();

        let dst = tempfile::tempdir().unwrap();
        unpack_tar(&merged, dst.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dst.path().join("cnb/buildpacks/a/1.0.0/run.sh")).unwrap(),
            "a-content"
        );
        assert_eq!(
            fs::read_to_string(dst.path().join("cnb/buildpacks/b/1.0.0/run.sh")).unwrap(),
            "b-content"
        );
    }

    #[test]
    fn merge_is_deterministic() {
        let out = tempfile::tempdir().unwrap();
        let a = module_tar(out.path(), "a", "f", "x");
        let b = module_tar(out.path(), "b", "f", "y");

        let m1 = out.path().join("m1.tar");
        let m2 = out.path().join("m2.tar");
        merge_tars(&m1, &[a.clone(), b.clone()]).unwrap();
        merge_tars(&m2, &[a, b]).unwrap();

        assert_eq!(layer_diff_id(&m1).unwrap(), layer_diff_id(&m2).unwrap());
    }

    #[test]
    fn merge_order_changes_hash() {
        let out = tempfile::tempdir().unwrap();
        let a = module_tar(out.path(), "a", "f", "x");
        let b = module_tar(out.path(), "b", "f", "y");

        let ab = out.path().join("ab.tar");
        let ba = out.path().join("ba.tar");
        merge_tars(&ab, &[a.clone(), b.clone()]).unwrap();
        merge_tars(&ba, &[b, a]).unwrap();

        assert_ne!(layer_diff_id(&ab).unwrap(), layer_diff_id(&ba).unwrap());
    }

    #[test]
    fn merge_preserves_symlinks() {
        let out = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("real"), "data").unwrap();
        std::os::unix::fs::symlink("real", src.path().join("alias")).unwrap();
        let tar_path = out.path().join("links.tar");
        write_dir_tar(&tar_path, src.path(), "").unwrap();

        let merged = out.path().join("merged.tar");
        merge_tars(&merged, &[tar_path]).unwrap();

        let dst = tempfile::tempdir().unwrap();
        unpack_tar(&merged, dst.path()).unwrap();
        let link = dst.path().join("alias");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(link).unwrap(), "data");
    }
}
