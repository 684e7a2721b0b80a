// ABOUTME: Filesystem helpers over whole directory trees.
// ABOUTME: Content digests, recursive copies, and swap-in replacement of a live tree.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// SHA-256 over every entry's relative path, kind and content, in sorted
/// order. Two trees with the same digest are byte-identical.
pub fn tree_digest(root: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut entries = Vec::new();
    collect(root, root, &mut entries)?;
    entries.sort();

    for relative in entries {
        let path = root.join(&relative);
        let meta = fs::symlink_metadata(&path)?;
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);

        if meta.file_type().is_symlink() {
            hasher.update(b"l");
            hasher.update(fs::read_link(&path)?.to_string_lossy().as_bytes());
        } else if meta.is_dir() {
            hasher.update(b"d");
        } else {
            hasher.update(b"f");
            let content = fs::read(&path)?;
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(&content);
        }
        hasher.update([0u8]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .to_path_buf();
        let is_dir = entry.file_type()?.is_dir();
        out.push(relative);
        if is_dir {
            collect(root, &path, out)?;
        }
    }
    Ok(())
}

/// Copy `src` into `dst` recursively. Symlinks are recreated, not followed.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    copy_tree_except(src, dst, &[])
}

/// [`copy_tree`], skipping top-level entries of `src` named in `skip`.
pub fn copy_tree_except(src: &Path, dst: &Path, skip: &[String]) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if skip.iter().any(|k| entry.file_name() == k.as_str()) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(&from)?, &to)?;
        } else if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Remove every top-level entry of `dir` whose name is not in `keep`.
pub fn clear_dir_except(dir: &Path, keep: &[String]) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if keep.iter().any(|k| entry.file_name() == k.as_str()) {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Sibling path of `dir` used for staging, e.g. `/opt/.app.restore`.
pub fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tree".to_string());
    dir.with_file_name(format!(".{}.{}", name, suffix))
}

/// Swap `staged` in as `live`, whatever state `live` is in (or if it is
/// missing). The old tree is removed afterwards.
pub fn replace_dir(staged: &Path, live: &Path) -> io::Result<()> {
    let discard = sibling(live, "discard");
    if discard.exists() {
        fs::remove_dir_all(&discard)?;
    }

    if live.exists() {
        fs::rename(live, &discard)?;
    }

    if let Err(e) = fs::rename(staged, live) {
        // Put the previous tree back so the host is no worse off.
        if discard.exists() {
            let _ = fs::rename(&discard, live);
        }
        return Err(e);
    }

    if discard.exists() {
        fs::remove_dir_all(&discard)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn digest_is_order_independent_and_content_sensitive() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write(a.path(), "x/one.txt", "1");
        write(a.path(), "two.txt", "2");
        write(b.path(), "two.txt", "2");
        write(b.path(), "x/one.txt", "1");

        assert_eq!(
            tree_digest(a.path()).unwrap(),
            tree_digest(b.path()).unwrap()
        );

        write(b.path(), "x/one.txt", "changed");
        assert_ne!(
            tree_digest(a.path()).unwrap(),
            tree_digest(b.path()).unwrap()
        );
    }

    #[test]
    fn digest_sees_renames() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write(a.path(), "a.txt", "same");
        write(b.path(), "b.txt", "same");
        assert_ne!(
            tree_digest(a.path()).unwrap(),
            tree_digest(b.path()).unwrap()
        );
    }

    #[test]
    fn copy_tree_reproduces_digest() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write(src.path(), "app.py", "print('hi')");
        write(src.path(), "templates/index.html", "<html/>");
        std::os::unix::fs::symlink("app.py", src.path().join("link.py")).unwrap();

        let target = dst.path().join("copy");
        copy_tree(src.path(), &target).unwrap();
        assert_eq!(
            tree_digest(src.path()).unwrap(),
            tree_digest(&target).unwrap()
        );
    }

    #[test]
    fn clear_dir_keeps_listed_entries() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "venv/bin/python", "");
        write(dir.path(), "app.py", "");
        write(dir.path(), "static/site.css", "");

        clear_dir_except(dir.path(), &["venv".to_string()]).unwrap();

        assert!(dir.path().join("venv/bin/python").exists());
        assert!(!dir.path().join("app.py").exists());
        assert!(!dir.path().join("static").exists());
    }

    #[test]
    fn replace_dir_swaps_and_handles_missing_live() {
        let parent = tempfile::tempdir().unwrap();
        let live = parent.path().join("app");
        let staged = parent.path().join("staged");
        write(&staged, "new.txt", "new");

        replace_dir(&staged, &live).unwrap();
        assert!(live.join("new.txt").exists());
        assert!(!staged.exists());

        write(&staged, "newer.txt", "newer");
        replace_dir(&staged, &live).unwrap();
        assert!(live.join("newer.txt").exists());
        assert!(!live.join("new.txt").exists());
        assert!(!sibling(&live, "discard").exists());
    }
}
