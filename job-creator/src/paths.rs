//! Computes and ensures the `output_mount_path` each job variant writes to.
//!
//! Grounded in `jobcreator/utils.py`'s `create_ceph_mount_path_autoreduction`
//! / `create_ceph_mount_path_simple`: a path is computed on the local
//! filesystem view of the shared storage (the `local_mount_root`, e.g.
//! `/ceph`), created if missing, then re-rooted under the path the container
//! actually mounts the volume at (the `container_mount_root`, e.g.
//! `/isis/instrument`).

use std::path::{Path, PathBuf};

use jobcontroller_core::model::SimpleOwner;

/// Where the creator process can see the shared filesystem locally, and
/// where the main container mounts the same filesystem. These differ because
/// the creator runs with direct (possibly NFS) access to the store, while
/// the job it submits accesses it purely through the volume mount.
#[derive(Debug, Clone)]
pub struct MountRoots {
    pub local: PathBuf,
    pub container: PathBuf,
}

impl Default for MountRoots {
    fn default() -> Self {
        MountRoots {
            local: PathBuf::from("/ceph"),
            container: PathBuf::from("/isis/instrument"),
        }
    }
}

fn relativise(roots: &MountRoots, local_path: &Path) -> PathBuf {
    let relative = local_path.strip_prefix(&roots.local).unwrap_or(local_path);
    roots.container.join(relative)
}

/// `/<mount-root>/<instrument>/RBNumber/RB<rb>/autoreduced`, creating the
/// directory (substituting `unknown` for the RB folder when its parent is
/// absent) before returning the container-relative path.
pub fn autoreduction_output_path(roots: &MountRoots, instrument: &str, rb_number: &str) -> std::io::Result<PathBuf> {
    let mut local_path = roots
        .local
        .join(instrument)
        .join("RBNumber")
        .join(format!("RB{rb_number}"))
        .join("autoreduced");

    if !local_path.exists() {
        let rb_folder = local_path.parent().map(Path::to_path_buf);
        if let Some(rb_folder) = rb_folder {
            if !rb_folder.exists() {
                let unknown_folder = rb_folder.with_file_name("unknown");
                local_path = unknown_folder.join("autoreduced");
            }
        }
        if !local_path.exists() {
            std::fs::create_dir_all(&local_path)?;
        }
    }

    Ok(relativise(roots, &local_path))
}

/// `/<mount-root>/GENERIC/autoreduce/{UserNumbers|ExperimentNumbers}/<id>`,
/// creating the directory before returning the container-relative path.
pub fn simple_output_path(roots: &MountRoots, owner: &SimpleOwner) -> std::io::Result<PathBuf> {
    let subdir = match owner {
        SimpleOwner::User(_) => "UserNumbers",
        SimpleOwner::Experiment(_) => "ExperimentNumbers",
    };
    let local_path = roots.local.join("GENERIC").join("autoreduce").join(subdir).join(owner.id());

    if !local_path.exists() {
        std::fs::create_dir_all(&local_path)?;
    }

    Ok(relativise(roots, &local_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots(tmp: &Path) -> MountRoots {
        MountRoots {
            local: tmp.to_path_buf(),
            container: PathBuf::from("/isis/instrument"),
        }
    }

    #[test]
    fn autoreduction_path_re_roots_under_container_mount() {
        let tmp = tempdir();
        let roots = roots(tmp.path());
        // The RB-number folder already exists (created when the run landed);
        // only the `autoreduced` subfolder needs creating.
        std::fs::create_dir_all(tmp.path().join("mari/RBNumber/RB42")).unwrap();

        let path = autoreduction_output_path(&roots, "mari", "42").unwrap();
        assert_eq!(path, PathBuf::from("/isis/instrument/mari/RBNumber/RB42/autoreduced"));
        assert!(tmp.path().join("mari/RBNumber/RB42/autoreduced").exists());
    }

    #[test]
    fn missing_rb_folder_substitutes_unknown() {
        let tmp = tempdir();
        let roots = roots(tmp.path());
        // Nothing has been pre-created for this RB number, so the RB folder
        // itself is absent and the path falls back to "unknown".
        let path = autoreduction_output_path(&roots, "loq", "99999999").unwrap();
        assert_eq!(path, PathBuf::from("/isis/instrument/loq/RBNumber/unknown/autoreduced"));
    }

    #[test]
    fn simple_path_for_user_number() {
        let tmp = tempdir();
        let roots = roots(tmp.path());
        let path = simple_output_path(&roots, &SimpleOwner::User("u7".to_string())).unwrap();
        assert_eq!(path, PathBuf::from("/isis/instrument/GENERIC/autoreduce/UserNumbers/u7"));
    }

    #[test]
    fn simple_path_for_experiment_number() {
        let tmp = tempdir();
        let roots = roots(tmp.path());
        let path = simple_output_path(&roots, &SimpleOwner::Experiment("RB42".to_string())).unwrap();
        assert_eq!(
            path,
            PathBuf::from("/isis/instrument/GENERIC/autoreduce/ExperimentNumbers/RB42")
        );
    }

    fn tempdir() -> TempDir {
        TempDir::new()
    }

    struct TempDir(PathBuf);
    impl TempDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!(
                "jobcreator-paths-test-{}-{}",
                std::process::id(),
                ADDR.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            ));
            std::fs::create_dir_all(&path).unwrap();
            TempDir(path)
        }
        fn path(&self) -> &Path {
            &self.0
        }
    }
    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
    static ADDR: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
}
