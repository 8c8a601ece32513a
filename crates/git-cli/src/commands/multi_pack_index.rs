//! `gitr multi-pack-index` — write and verify a multi-pack index.

use std::io::{self, Write};

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use git_pack::index::PackIndex;
use git_pack::midx::{self, MidxFile, MidxWriteOptions, PackIndexMerger, PackIndexSource};
use git_utils::progress::Progress;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct MultiPackIndexArgs {
    #[command(subcommand)]
    action: MultiPackIndexAction,
}

#[derive(Subcommand)]
enum MultiPackIndexAction {
    /// Write a multi-pack-index from every pack in objects/pack
    Write,
    /// Verify the multi-pack-index's structure and trailing checksum
    Verify,
}

pub fn run(args: &MultiPackIndexArgs, cli: &Cli) -> Result<i32> {
    match &args.action {
        MultiPackIndexAction::Write => run_write(cli),
        MultiPackIndexAction::Verify => run_verify(cli),
    }
}

fn run_write(cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;
    let pack_dir = repo.odb().objects_dir().join("pack");

    let mut idx_paths: Vec<_> = match std::fs::read_dir(&pack_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "idx"))
            .collect(),
        Err(_) => Vec::new(),
    };
    idx_paths.sort();

    if idx_paths.is_empty() {
        eprintln!("No packs found in {}", pack_dir.display());
        return Ok(0);
    }

    let mut packs: Vec<(String, Box<dyn PackIndexSource>)> = Vec::with_capacity(idx_paths.len());
    for idx_path in idx_paths {
        let pack_name = idx_path
            .with_extension("pack")
            .file_name()
            .expect("idx path always has a file name")
            .to_string_lossy()
            .into_owned();
        let index = PackIndex::open(&idx_path)?;
        packs.push((pack_name, Box::new(index) as Box<dyn PackIndexSource>));
    }

    let hash_algo = repo.odb().hash_algo();
    let merger = PackIndexMerger::new(hash_algo, packs)?;

    let mut progress = Progress::new("Writing multi-pack-index", Some(merger.unique_object_count() as u64));
    let cancelled = || false;
    let mut monitor = midx::ProgressMonitor::new(&mut progress, &cancelled);

    let report = midx::write_to_path(&mut monitor, &pack_dir, &merger, &MidxWriteOptions::default())?;

    eprintln!(
        "Writing multi-pack-index: {} objects across {} packs, {} bytes",
        report.object_count,
        report.pack_names.len(),
        report.bytes_written
    );

    Ok(0)
}

fn run_verify(cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;
    let midx_path = repo.odb().objects_dir().join("pack").join("multi-pack-index");

    if !midx_path.is_file() {
        bail!("no multi-pack-index file found at {}", midx_path.display());
    }

    let midx = MidxFile::open_from_path(&midx_path)?;
    midx.verify()?;

    let stderr = io::stderr();
    let mut err = stderr.lock();
    for warning in midx.warnings() {
        writeln!(err, "warning: {warning:?}")?;
    }

    writeln!(
        err,
        "multi-pack-index OK: {} objects across {} packs",
        midx.object_count(),
        midx.pack_count()
    )?;

    Ok(0)
}
