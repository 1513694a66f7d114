//! cachecheck: look up a product in a factor cache and verify that the
//! stored factorization reproduces it.
//!
//! Usage: cachecheck <cache_path> <product>

use std::process::ExitCode;

use num_bigint::BigUint;

use aliquot::FactorCache;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("Usage: cachecheck <cache_path> <product>");
        return ExitCode::FAILURE;
    }

    let cache_path = &args[0];
    let value = match args[1].parse::<BigUint>() {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Invalid product: {}", args[1]);
            return ExitCode::FAILURE;
        }
    };

    let result = FactorCache::open(cache_path).and_then(|cache| cache.lookup(&value));
    match result {
        Ok(Some(factors)) => {
            println!("Product {value} exists in cache.");
            println!("Factors: {factors}");

            let computed = factors.product();
            if computed == value {
                println!("Verification: PASSED (product = {computed})");
                ExitCode::SUCCESS
            } else {
                println!("Verification: FAILED (expected {value}, got {computed})");
                ExitCode::FAILURE
            }
        }
        Ok(None) => {
            println!("Product {value} does not exist in cache.");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
