//! factorgen: bulk-generate a factor cache by enumerating products of
//! primes from a range. Records are appended unsorted and the cache is
//! sorted once at the end.
//!
//! Usage: factorgen [options] <output>
//! Options:
//!   -m <N>    Minimum prime to use for factorization (default 7)
//!   -M <N>    Maximum prime to use for factorization (default 65537)
//!   -f <N>    Minimum number of factors (default 2)
//!   -F <N>    Maximum number of factors (default 4)
//!   -2 <N>    Set smallest factor value to 2^N
//!   -n <N>    Set smallest factor value to N

use std::process::ExitCode;

use num_bigint::BigUint;

use aliquot::cache::WIDTH_BITS;
use aliquot::{is_probably_prime, CacheInfo, FactorCache, PrimeFactors, Result};

const USAGE: &str = "\
Usage: factorgen [options] <output>
Options:
  -m <N>    Minimum prime to use for factorization (default 7)
  -M <N>    Maximum prime to use for factorization (default 65537)
  -f <N>    Minimum number of factors (default 2)
  -F <N>    Maximum number of factors (default 4)
  -2 <N>    Set smallest factor value to 2^N
  -n <N>    Set smallest factor value to N";

struct Config {
    min_prime: u64,
    max_prime: u64,
    min_factors: usize,
    max_factors: usize,
    smallest_factor: u64,
    output: String,
}

fn parse_args(args: &[String]) -> std::result::Result<Config, ExitCode> {
    if args.is_empty() {
        eprintln!("{USAGE}");
        return Err(ExitCode::FAILURE);
    }

    let mut config = Config {
        min_prime: 7,
        max_prime: 65537,
        min_factors: 2,
        max_factors: 4,
        smallest_factor: 1007,
        output: String::new(),
    };

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "-h" || arg == "--help" {
            println!("{USAGE}");
            return Err(ExitCode::SUCCESS);
        }
        if let "-m" | "-M" | "-f" | "-F" | "-2" | "-n" = arg {
            i += 1;
            let Some(value) = args.get(i).and_then(|v| v.parse::<u64>().ok()) else {
                eprintln!("Invalid or missing value for {arg}");
                return Err(ExitCode::FAILURE);
            };
            match arg {
                "-m" => config.min_prime = value,
                "-M" => config.max_prime = value,
                "-f" => config.min_factors = value as usize,
                "-F" => config.max_factors = value as usize,
                "-2" => config.smallest_factor = 1u64 << value,
                _ => config.smallest_factor = value,
            }
        } else {
            config.output = arg.to_string();
            break;
        }
        i += 1;
    }

    if config.output.is_empty() {
        eprintln!("Error: Output file not specified.");
        return Err(ExitCode::FAILURE);
    }

    // Keep the endpoints odd so the prime walk starts on candidates
    if config.min_prime % 2 == 0 {
        config.min_prime += 1;
    }
    if config.max_prime % 2 == 0 {
        config.max_prime -= 1;
    }

    if config.smallest_factor < config.min_prime || config.smallest_factor > config.max_prime {
        eprintln!("Error: Smallest factor must be between min_prime and max_prime.");
        return Err(ExitCode::FAILURE);
    }

    Ok(config)
}

/// Advance one odometer position; the first digit wraps to `start_index`,
/// the rest to 0. Returns false when every digit has wrapped.
fn advance(indices: &mut [usize], num_primes: usize, start_index: usize) -> bool {
    for digit in (0..indices.len()).rev() {
        indices[digit] += 1;
        if indices[digit] < num_primes {
            return true;
        }
        indices[digit] = if digit == 0 { start_index } else { 0 };
    }
    false
}

fn generate(config: &Config) -> Result<()> {
    // Collect the primes in [min_prime, max_prime]
    let mut primes: Vec<u64> = Vec::new();
    let mut candidate = config.min_prime;
    while candidate <= config.max_prime {
        if is_probably_prime(&BigUint::from(candidate), 25) {
            primes.push(candidate);
        }
        candidate += 2;
    }
    let num_primes = primes.len();
    log::info!(
        "{} primes in [{}, {}]",
        num_primes,
        config.min_prime,
        config.max_prime
    );

    // The first chosen factor is constrained to >= smallest_factor
    let start_index = primes
        .iter()
        .position(|&p| p >= config.smallest_factor)
        .unwrap_or(num_primes);

    let cache = FactorCache::open(&config.output)?;

    let mut total_products: u64 = 0;
    for k in config.min_factors.max(1)..=config.max_factors {
        let per_k = ((num_primes - start_index) as u64)
            .saturating_mul((num_primes as u64).saturating_pow(k as u32 - 1));
        total_products = total_products.saturating_add(per_k);
    }
    eprintln!("Generating approximately {total_products} products...");

    let mut calculated: u64 = 0;
    let mut factors = PrimeFactors::new();
    for num_factors in config.min_factors..=config.max_factors {
        if num_factors == 0 || start_index >= num_primes {
            continue;
        }
        let mut indices = vec![0usize; num_factors];
        indices[0] = start_index;
        loop {
            factors.clear();
            for &index in &indices {
                factors.add_factor(BigUint::from(primes[index]));
            }
            cache.append(&factors)?;
            calculated += 1;

            if calculated % 1_000_000 == 0 {
                eprint!(
                    "\r{}/{} {}/{} ({:.2}%)",
                    num_factors,
                    config.max_factors,
                    calculated,
                    total_products,
                    calculated as f64 / total_products as f64 * 100.0
                );
            }

            if !advance(&mut indices, num_primes, start_index) {
                break;
            }
        }
    }

    eprintln!();
    eprintln!("Generated {calculated} products.");
    eprintln!("Sorting cache files...");
    cache.sort()?;
    eprintln!("Done sorting cache files.");

    let stats = cache.stats()?;
    println!("Prime Factor Cache Stats:");
    println!("Cache Path: {}", config.output);
    println!("Entries: {}", stats.index_entries);
    for (num_factors, records) in &stats.factor_files {
        println!("Factors with {num_factors} primes: {records}");
    }

    cache.write_info(&CacheInfo {
        min_prime: config.min_prime,
        max_prime: config.max_prime,
        min_factors: config.min_factors as u64,
        max_factors: config.max_factors as u64,
        smallest_factor: config.smallest_factor,
        width: WIDTH_BITS as u64,
    })?;

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match generate(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
