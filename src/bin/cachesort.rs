//! cachesort: sort every index and factor file of a cache in place.
//!
//! Usage: cachesort <cache_path>

use std::process::ExitCode;

use aliquot::FactorCache;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(cache_path) = args.first() else {
        eprintln!("Usage: cachesort <cache_path>");
        return ExitCode::FAILURE;
    };

    println!("Sorting cache at: {cache_path}");
    let result = FactorCache::open(cache_path).and_then(|cache| cache.sort());
    match result {
        Ok(()) => {
            println!("Done sorting cache.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
