//! primegen: precompute the gaps between primes and write them to a file
//! as LEB128-encoded bytes.
//!
//! Usage: primegen [options] <output_file>
//! Options:
//!   -2 <N>    Generate primes up to 2^N
//!   -n <N>    Generate primes up to N
//!   -c <N>    Generate first N primes

use std::fs::File;
use std::io::{BufWriter, Write};
use std::process::ExitCode;

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

use aliquot::gaps::encode_gap;
use aliquot::is_probably_prime;
use aliquot::wheel::{WHEEL30, WHEEL30_BITS_PER_GAP, WHEEL30_MASK};

const USAGE: &str = "\
Usage: primegen [options] <output_file>
Options:
  -2 <N>    Generate primes up to 2^N
  -n <N>    Generate primes up to N
  -c <N>    Generate first N primes";

fn human_readable_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut suffix = 0;
    while size >= 1024.0 && suffix < SUFFIXES.len() - 1 {
        size /= 1024.0;
        suffix += 1;
    }
    format!("{:.2} {}", size, SUFFIXES[suffix])
}

fn run() -> Result<ExitCode, std::io::Error> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        eprintln!("{USAGE}");
        return Ok(ExitCode::FAILURE);
    }

    let mut limit = BigUint::zero();
    let mut use_count = false;
    let mut output_file = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-2" if i + 1 < args.len() => {
                i += 1;
                let Ok(exp) = args[i].parse::<u32>() else {
                    eprintln!("Invalid exponent: {}", args[i]);
                    return Ok(ExitCode::FAILURE);
                };
                limit = BigUint::one() << exp;
            }
            "-n" if i + 1 < args.len() => {
                i += 1;
                let Ok(n) = args[i].parse::<BigUint>() else {
                    eprintln!("Invalid limit: {}", args[i]);
                    return Ok(ExitCode::FAILURE);
                };
                limit = n;
            }
            "-c" if i + 1 < args.len() => {
                i += 1;
                let Ok(n) = args[i].parse::<BigUint>() else {
                    eprintln!("Invalid count: {}", args[i]);
                    return Ok(ExitCode::FAILURE);
                };
                limit = n;
                use_count = true;
            }
            arg => {
                output_file = Some(arg.to_string());
                break;
            }
        }
        i += 1;
    }

    let Some(output_file) = output_file else {
        eprintln!("{USAGE}");
        return Ok(ExitCode::FAILURE);
    };

    let mut out = BufWriter::new(File::create(&output_file)?);
    let mut filesize: u64 = 0;

    // The wheel never visits 2, 3, or 5; write their gaps up front
    out.write_all(&[2, 1, 2])?;
    filesize += 3;

    let mut value = BigUint::one();
    let mut last = BigUint::from(5u32);
    let mut count = BigUint::zero();
    let mut ring = WHEEL30;
    let mut encoded = Vec::new();

    loop {
        let in_range = if use_count {
            count < limit
        } else {
            value <= limit
        };
        if !in_range {
            break;
        }

        let increment = u64::from(ring & WHEEL30_MASK);
        ring = ring.rotate_right(WHEEL30_BITS_PER_GAP);
        value += increment;

        // The wheel only skips multiples of 2, 3, 5; the rest still needs
        // a primality test
        if !is_probably_prime(&value, 25) {
            continue;
        }

        let gap = (&value - &last).to_u64().unwrap_or(0);
        last = value.clone();
        encoded.clear();
        encode_gap(gap, &mut encoded);
        out.write_all(&encoded)?;
        filesize += encoded.len() as u64;
        count += 1u32;

        if (&count % 100_000u32).is_zero() {
            let percent = if use_count {
                count.to_f64().unwrap_or(0.0) / limit.to_f64().unwrap_or(1.0) * 100.0
            } else {
                value.to_f64().unwrap_or(0.0) / limit.to_f64().unwrap_or(1.0) * 100.0
            };
            eprint!(
                "\r#: {} ({}), latest prime: {} ({:.2}%)",
                count,
                human_readable_size(filesize),
                value,
                percent
            );
        }
    }

    out.flush()?;
    eprintln!();
    eprintln!("Finished generating primes.");
    eprintln!("Output file size: {}", human_readable_size(filesize));
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
