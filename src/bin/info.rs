extern crate mhktools;

use std::env;
use std::path::Path;

use mhktools::archive::{Archive, ArchiveError};

fn main() -> Result<(), ArchiveError> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        panic!("usage: {} path/archive.mhk", args[0]);
    }

    let archive = Archive::load(Path::new(&args[1]))?;
    for (tag, type_info) in archive.types.iter() {
        println!("{} ({} resources)", tag, type_info.resources.len());
        for (id, resource) in type_info.resources.iter() {
            match archive.file_info(resource) {
                Ok(file) => match &resource.name {
                    Some(name) => {
                        println!("  {:5} offset {:8} size {:8}  {}", id, file.offset, file.size, name);
                    }
                    None => {
                        println!("  {:5} offset {:8} size {:8}", id, file.offset, file.size);
                    }
                },
                Err(err) => println!("  {:5} !! {:?}", id, err),
            }
        }
    }
    Ok(())
}
