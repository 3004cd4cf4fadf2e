extern crate mhktools;

use log::error;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mhktools::archive::Archive;
use mhktools::extract;

fn collect_archives(path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    if !path.is_dir() {
        return Ok(vec![ path.to_path_buf() ]);
    }
    let mut archives = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        let is_mhk = entry_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("mhk"))
            .unwrap_or(false);
        if entry_path.is_file() && is_mhk {
            archives.push(entry_path);
        }
    }
    archives.sort();
    Ok(archives)
}

fn main() -> Result<(), std::io::Error> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        panic!("usage: {} mhk-file-or-dir out-path", args[0]);
    }
    let in_path = Path::new(&args[1]);
    let out_path = Path::new(&args[2]);

    for archive_path in collect_archives(in_path)? {
        println!("{}", archive_path.display());
        let archive = match Archive::load(&archive_path) {
            Ok(archive) => archive,
            Err(err) => {
                // a broken container kills this archive, not the run
                error!("{}: {:?}", archive_path.display(), err);
                continue;
            }
        };
        let stem = archive_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("archive");
        let dest = out_path.join(stem);
        fs::create_dir_all(&dest)?;
        match extract::extract_archive(&archive, &dest) {
            Ok(stats) => {
                println!("  {} written, {} skipped, {} failed",
                    stats.written, stats.skipped, stats.failed);
            }
            Err(err) => error!("{}: {:?}", archive_path.display(), err),
        }
    }
    Ok(())
}
