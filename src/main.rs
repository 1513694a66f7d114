//! aliquot: print the aliquot sequence of a number.
//!
//! Usage: aliquot [options] <number>
//! Options:
//!   -p <file>   Load prime gaps from file
//!   -c <path>   Factor cache directory
//!   -t <N>      Worker threads (default: all cores)
//!   -h, --help  Show this help message

use std::path::PathBuf;
use std::process::ExitCode;

use num_bigint::BigUint;

use aliquot::{aliquot_sequence, default_threads, load_prime_gaps};

const USAGE: &str = "\
Usage: aliquot [options] <number>
Options:
  -p <file>   Load prime gaps from file
  -c <path>   Factor cache directory
  -t <N>      Worker threads (default: all cores)
  -h, --help  Show this help message";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }

    let mut cache_path: Option<PathBuf> = None;
    let mut num_threads = default_threads();
    let mut number: Option<BigUint> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-p" if i + 1 < args.len() => {
                i += 1;
                if let Err(err) = load_prime_gaps(&args[i]) {
                    eprintln!("Failed to load prime gaps from {}: {}", args[i], err);
                    return ExitCode::FAILURE;
                }
            }
            "-c" if i + 1 < args.len() => {
                i += 1;
                cache_path = Some(PathBuf::from(&args[i]));
            }
            "-t" if i + 1 < args.len() => {
                i += 1;
                match args[i].parse::<usize>() {
                    Ok(n) if n > 0 => num_threads = n,
                    _ => {
                        eprintln!("Invalid thread count: {}", args[i]);
                        return ExitCode::FAILURE;
                    }
                }
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            arg => match arg.parse::<BigUint>() {
                Ok(n) => number = Some(n),
                Err(_) => {
                    eprintln!("Invalid number: {arg}");
                    return ExitCode::FAILURE;
                }
            },
        }
        i += 1;
    }

    let Some(number) = number.filter(|n| *n > BigUint::from(0u32)) else {
        eprintln!("Please provide a valid number greater than 0.");
        return ExitCode::FAILURE;
    };

    println!("Aliquot sequence for {number}:");
    match aliquot_sequence(&number, cache_path.as_deref(), true, num_threads) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error during prime factorization: {err}");
            ExitCode::FAILURE
        }
    }
}
