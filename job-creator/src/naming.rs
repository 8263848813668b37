//! `job_name` generation and the derived per-resource names that hang off it.
//!
//! Grounded in `jobcreator/main.py`'s `f"run-{filename.lower()}-{uuid.uuid4().hex}"`
//! / `f"run-owner{owner_id.lower()}-requested-{uuid.uuid4().hex}"` and the 50
//! character truncation applied before any resource suffix is appended.

use rand::Rng;

const MAX_JOB_NAME_LEN: usize = 50;
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Random hex suffix with entropy equivalent to the source's `uuid4().hex`
/// suffix usage.
fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..12).map(|_| HEX_DIGITS[rng.random_range(0..16)] as char).collect()
}

fn truncate(name: String) -> String {
    if name.len() > MAX_JOB_NAME_LEN {
        name[..MAX_JOB_NAME_LEN].to_string()
    } else {
        name
    }
}

/// `job_name` for the autoreduction and rerun paths: `run-<filename>-<hex>`.
pub fn job_name_for_run(filename: &str) -> String {
    truncate(format!("run-{}-{}", filename.to_lowercase(), random_suffix()))
}

/// `job_name` for the simple path: `run-owner<owner_id>-requested-<hex>`.
pub fn job_name_for_owner(owner_id: &str) -> String {
    truncate(format!(
        "run-owner{}-requested-{}",
        owner_id.to_lowercase(),
        random_suffix()
    ))
}

pub fn archive_pv_name(job_name: &str) -> String {
    format!("{job_name}-archive-pv-smb")
}
pub fn archive_pvc_name(job_name: &str) -> String {
    format!("{job_name}-archive-pvc")
}
pub fn extras_pv_name(job_name: &str) -> String {
    format!("{job_name}-extras-pv")
}
pub fn extras_pvc_name(job_name: &str) -> String {
    format!("{job_name}-extras-pvc")
}
pub fn output_pv_name(job_name: &str) -> String {
    format!("{job_name}-output-pv")
}
pub fn output_pvc_name(job_name: &str) -> String {
    format!("{job_name}-output-pvc")
}
pub fn instrument_pv_name(job_name: &str, instrument: &str) -> String {
    format!("{job_name}-{}-pv-smb", instrument.to_lowercase())
}
pub fn instrument_pvc_name(job_name: &str, instrument: &str) -> String {
    format!("{job_name}-{}-pvc", instrument.to_lowercase())
}

/// Derives `filename` from a `filepath`, matching Python's `Path(filepath).stem`:
/// the final path segment with its last extension removed.
pub fn filename_stem(filepath: &str) -> String {
    let basename = filepath.rsplit(['/', '\\']).next().unwrap_or(filepath);
    match basename.rfind('.') {
        Some(0) => basename.to_string(),
        Some(index) => basename[..index].to_string(),
        None => basename.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_matches_expected_pattern() {
        let name = job_name_for_run("run123");
        assert!(name.starts_with("run-run123-"));
        assert!(name.len() <= MAX_JOB_NAME_LEN);
    }

    #[test]
    fn owner_job_name_matches_expected_pattern() {
        let name = job_name_for_owner("U7");
        assert!(name.starts_with("run-owneru7-requested-"));
    }

    #[test]
    fn two_back_to_back_names_are_distinct() {
        let a = job_name_for_run("run123");
        let b = job_name_for_run("run123");
        assert_ne!(a, b);
    }

    #[test]
    fn long_filenames_are_truncated_to_fifty_chars() {
        let long_filename = "x".repeat(100);
        let name = job_name_for_run(&long_filename);
        assert_eq!(name.len(), MAX_JOB_NAME_LEN);
    }

    #[test]
    fn derived_resource_names_are_unique_per_job() {
        let a = job_name_for_run("run123");
        let b = job_name_for_run("run123");
        assert_ne!(archive_pv_name(&a), archive_pv_name(&b));
    }

    #[test]
    fn filename_stem_strips_directory_and_extension() {
        assert_eq!(filename_stem("/archive/mari/RB1234/MAR123.nxs"), "MAR123");
    }

    #[test]
    fn filename_stem_handles_no_extension() {
        assert_eq!(filename_stem("MAR123"), "MAR123");
    }

    #[test]
    fn filename_stem_handles_dotfile() {
        assert_eq!(filename_stem("/a/.hidden"), ".hidden");
    }
}
