//! Integration tests for `gitr multi-pack-index write`/`verify`.

mod common;

use common::{git, gitr, setup_linear_history};
use tempfile::TempDir;

#[test]
fn write_then_verify_roundtrips() {
    let dir = TempDir::new().unwrap();
    setup_linear_history(dir.path(), 20);
    // Force at least two packs for the merge to have something to do.
    git(dir.path(), &["repack", "-d"]);
    std::fs::write(dir.path().join("extra.txt"), b"more content\n").unwrap();
    git(dir.path(), &["add", "extra.txt"]);
    git(dir.path(), &["commit", "-m", "extra"]);
    git(dir.path(), &["repack", "-d"]);

    let write_result = gitr(dir.path(), &["multi-pack-index", "write"]);
    assert_eq!(
        write_result.exit_code, 0,
        "write should succeed.\nstdout: {}\nstderr: {}",
        write_result.stdout, write_result.stderr
    );

    let midx_path = dir.path().join(".git/objects/pack/multi-pack-index");
    assert!(midx_path.is_file(), "multi-pack-index file should exist after write");

    let verify_result = gitr(dir.path(), &["multi-pack-index", "verify"]);
    assert_eq!(
        verify_result.exit_code, 0,
        "verify should succeed on a freshly written file.\nstdout: {}\nstderr: {}",
        verify_result.stdout, verify_result.stderr
    );
}

#[test]
fn verify_without_a_file_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    setup_linear_history(dir.path(), 2);

    let result = gitr(dir.path(), &["multi-pack-index", "verify"]);
    assert_ne!(result.exit_code, 0, "verify should fail when no multi-pack-index exists");
    assert!(
        !result.stderr.contains("unrecognized") && !result.stderr.contains("unknown subcommand"),
        "gitr should recognize 'multi-pack-index verify'.\nstderr: {}",
        result.stderr
    );
}

#[test]
fn write_with_no_packs_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    setup_linear_history(dir.path(), 1);

    let result = gitr(dir.path(), &["multi-pack-index", "write"]);
    assert_eq!(result.exit_code, 0);
    let midx_path = dir.path().join(".git/objects/pack/multi-pack-index");
    assert!(!midx_path.is_file(), "no packs means no multi-pack-index should be written");
}
