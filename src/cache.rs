//! Persistent on-disk factorization cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/
//!   info.txt            key=value description of the generated range
//!   index/<B>.idx       sorted (product, factor_count) records, B = product mod 256
//!   factors_<K>.dat     sorted (product, (prime, exponent)^K) records
//! ```
//!
//! Products and primes are stored as fixed-width little-endian values of
//! [`WIDTH_BITS`] bits; counts are little-endian u64. Both file kinds are
//! kept sorted ascending by product so lookups are a pair of binary
//! searches reading one record per probe.

use std::cmp::Ordering;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write as IoWrite};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use num_bigint::BigUint;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::factors::PrimeFactors;

/// Fixed width of every product and prime stored in cache records. All
/// files in one cache share this width; `info.txt` records it so an
/// incompatible build is detected instead of misread.
pub const WIDTH_BITS: usize = 1024;
pub const WIDTH_BYTES: usize = WIDTH_BITS / 8;

const COUNT_BYTES: usize = 8;
const INDEX_RECORD_BYTES: usize = WIDTH_BYTES + COUNT_BYTES;

const fn factor_record_bytes(num_factors: usize) -> usize {
    WIDTH_BYTES + num_factors * (WIDTH_BYTES + COUNT_BYTES)
}

/// Whether a product fits the fixed record width.
pub fn fits_width(product: &BigUint) -> bool {
    product.bits() as usize <= WIDTH_BITS
}

fn product_bytes(value: &BigUint) -> Result<[u8; WIDTH_BYTES]> {
    let bytes = value.to_bytes_le();
    if bytes.len() > WIDTH_BYTES {
        return Err(Error::Validation(format!(
            "value {value} does not fit in {WIDTH_BITS}-bit cache records"
        )));
    }
    let mut buf = [0u8; WIDTH_BYTES];
    buf[..bytes.len()].copy_from_slice(&bytes);
    Ok(buf)
}

/// Compare two fixed-width little-endian products, most significant
/// byte first.
fn cmp_products(a: &[u8], b: &[u8]) -> Ordering {
    a.iter().rev().cmp(b.iter().rev())
}

fn read_count(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; COUNT_BYTES];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Contents of `info.txt`: the parameter range a generated cache covers,
/// plus the record width it was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub min_prime: u64,
    pub max_prime: u64,
    pub min_factors: u64,
    pub max_factors: u64,
    pub smallest_factor: u64,
    pub width: u64,
}

/// Per-file record counts, for diagnostics.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub index_entries: u64,
    /// (num_factors, records) for each existing factor file.
    pub factor_files: Vec<(usize, u64)>,
}

/// Handle to an on-disk factor cache. A closed handle turns every lookup
/// into a miss and every write into a no-op.
#[derive(Debug)]
pub struct FactorCache {
    root: Option<PathBuf>,
}

impl FactorCache {
    /// Open (creating directories as needed) a cache rooted at `path`.
    /// An existing `info.txt` written with a different record width is
    /// rejected.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(root.join("index"))?;
        let cache = FactorCache { root: Some(root) };
        if let Some(info) = cache.read_info()? {
            if info.width != WIDTH_BITS as u64 {
                return Err(Error::Validation(format!(
                    "cache was built with width {}, this build uses {}",
                    info.width, WIDTH_BITS
                )));
            }
        }
        Ok(cache)
    }

    /// A handle with no backing directory.
    pub fn closed() -> Self {
        FactorCache { root: None }
    }

    pub fn is_open(&self) -> bool {
        self.root.is_some()
    }

    fn index_path(&self, root: &Path, bucket: u8) -> PathBuf {
        root.join("index").join(format!("{bucket}.idx"))
    }

    fn factor_path(&self, root: &Path, num_factors: usize) -> PathBuf {
        root.join(format!("factors_{num_factors}.dat"))
    }

    fn info_path(&self, root: &Path) -> PathBuf {
        root.join("info.txt")
    }

    fn bucket_of(product: &BigUint) -> u8 {
        // Low byte of the little-endian product, i.e. product mod 256
        product.to_bytes_le()[0]
    }

    /// Look up the factorization of `product`. Misses (including a closed
    /// cache and products wider than the record width) are `Ok(None)`.
    pub fn lookup(&self, product: &BigUint) -> Result<Option<PrimeFactors>> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        if !fits_width(product) {
            return Ok(None);
        }
        let key = product_bytes(product)?;

        let index_path = self.index_path(root, Self::bucket_of(product));
        if !index_path.exists() {
            return Ok(None);
        }
        let mut record = [0u8; INDEX_RECORD_BYTES];
        let num_factors = {
            let mut file = File::open(&index_path)?;
            let num_records = file_records(&file, &index_path, INDEX_RECORD_BYTES)?;
            let mut found = None;
            let (mut lo, mut hi) = (0u64, num_records);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                file.seek(SeekFrom::Start(mid * INDEX_RECORD_BYTES as u64))?;
                file.read_exact(&mut record)?;
                match cmp_products(&record[..WIDTH_BYTES], &key) {
                    Ordering::Equal => {
                        found = Some(read_count(&record[WIDTH_BYTES..]) as usize);
                        break;
                    }
                    Ordering::Less => lo = mid + 1,
                    Ordering::Greater => hi = mid,
                }
            }
            match found {
                Some(k) => k,
                None => return Ok(None),
            }
        };

        let factor_path = self.factor_path(root, num_factors);
        let record_size = factor_record_bytes(num_factors);
        let mut file = File::open(&factor_path)?;
        let num_records = file_records(&file, &factor_path, record_size)?;
        let mut record = vec![0u8; record_size];
        let (mut lo, mut hi) = (0u64, num_records);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            file.seek(SeekFrom::Start(mid * record_size as u64))?;
            file.read_exact(&mut record)?;
            match cmp_products(&record[..WIDTH_BYTES], &key) {
                Ordering::Equal => {
                    let mut factors = PrimeFactors::new();
                    for i in 0..num_factors {
                        let off = WIDTH_BYTES + i * (WIDTH_BYTES + COUNT_BYTES);
                        let prime = BigUint::from_bytes_le(&record[off..off + WIDTH_BYTES]);
                        let count =
                            read_count(&record[off + WIDTH_BYTES..off + WIDTH_BYTES + COUNT_BYTES]);
                        factors.add_factor_pow(prime, count as usize);
                    }
                    return Ok(Some(factors));
                }
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        Ok(None)
    }

    /// Append a factorization and re-sort the two touched files, leaving
    /// the cache immediately searchable.
    pub fn insert(&self, factors: &PrimeFactors) -> Result<()> {
        if self.root.is_none() {
            return Ok(());
        }
        let product = factors.product();
        self.append(factors)?;
        self.sort_index(Self::bucket_of(&product))?;
        self.sort_factors(factors.distinct_count())?;
        Ok(())
    }

    /// Append a factorization without sorting. Bulk loaders use this and
    /// call [`FactorCache::sort`] once at the end; lookups against
    /// unsorted files are undefined.
    pub fn append(&self, factors: &PrimeFactors) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let product = factors.product();
        let key = product_bytes(&product)?;
        let num_factors = factors.distinct_count();

        let mut record = Vec::with_capacity(INDEX_RECORD_BYTES);
        record.extend_from_slice(&key);
        record.extend_from_slice(&(num_factors as u64).to_le_bytes());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.index_path(root, Self::bucket_of(&product)))?;
        file.write_all(&record)?;

        let mut record = Vec::with_capacity(factor_record_bytes(num_factors));
        record.extend_from_slice(&key);
        for (prime, count) in factors.iter() {
            record.extend_from_slice(&product_bytes(prime)?);
            record.extend_from_slice(&(count as u64).to_le_bytes());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.factor_path(root, num_factors))?;
        file.write_all(&record)?;
        Ok(())
    }

    fn sort_index(&self, bucket: u8) -> Result<bool> {
        match &self.root {
            Some(root) => sort_record_file(&self.index_path(root, bucket), INDEX_RECORD_BYTES),
            None => Ok(false),
        }
    }

    fn sort_factors(&self, num_factors: usize) -> Result<bool> {
        match &self.root {
            Some(root) => sort_record_file(
                &self.factor_path(root, num_factors),
                factor_record_bytes(num_factors),
            ),
            None => Ok(false),
        }
    }

    /// Sort every existing bucket index and factor file in place. Bucket
    /// files are independent and sorted in parallel.
    pub fn sort(&self) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        (0u16..256)
            .into_par_iter()
            .try_for_each(|bucket| self.sort_index(bucket as u8).map(|_| ()))?;
        for num_factors in self.factor_file_sizes(root)? {
            self.sort_factors(num_factors)?;
        }
        Ok(())
    }

    /// The K of every `factors_K.dat` present in the cache.
    fn factor_file_sizes(&self, root: &Path) -> Result<Vec<usize>> {
        let mut sizes = Vec::new();
        for entry in fs::read_dir(root)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(k) = name
                .strip_prefix("factors_")
                .and_then(|rest| rest.strip_suffix(".dat"))
                .and_then(|k| k.parse::<usize>().ok())
            {
                sizes.push(k);
            }
        }
        sizes.sort_unstable();
        Ok(sizes)
    }

    /// Record counts across all files.
    pub fn stats(&self) -> Result<CacheStats> {
        let Some(root) = &self.root else {
            return Ok(CacheStats::default());
        };
        let mut stats = CacheStats::default();
        for bucket in 0..=255u8 {
            let path = self.index_path(root, bucket);
            if path.exists() {
                let file = File::open(&path)?;
                stats.index_entries += file_records(&file, &path, INDEX_RECORD_BYTES)?;
            }
        }
        for num_factors in self.factor_file_sizes(root)? {
            let path = self.factor_path(root, num_factors);
            let file = File::open(&path)?;
            let records = file_records(&file, &path, factor_record_bytes(num_factors))?;
            stats.factor_files.push((num_factors, records));
        }
        Ok(stats)
    }

    /// Write `info.txt` describing the generated range.
    pub fn write_info(&self, info: &CacheInfo) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let mut file = File::create(self.info_path(root))?;
        writeln!(file, "min_prime={}", info.min_prime)?;
        writeln!(file, "max_prime={}", info.max_prime)?;
        writeln!(file, "min_factors={}", info.min_factors)?;
        writeln!(file, "max_factors={}", info.max_factors)?;
        writeln!(file, "smallest_factor={}", info.smallest_factor)?;
        writeln!(file, "width={}", info.width)?;
        Ok(())
    }

    /// Parse `info.txt`; `Ok(None)` when the cache has none.
    pub fn read_info(&self) -> Result<Option<CacheInfo>> {
        let Some(root) = &self.root else {
            return Ok(None);
        };
        let path = self.info_path(root);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let mut info = CacheInfo {
            min_prime: 0,
            max_prime: 0,
            min_factors: 0,
            max_factors: 0,
            smallest_factor: 0,
            width: WIDTH_BITS as u64,
        };
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let Some((k, v)) = line.split_once('=') else {
                return Err(Error::Validation(format!("malformed info.txt line: {line}")));
            };
            let value: u64 = v
                .trim()
                .parse()
                .map_err(|_| Error::Validation(format!("invalid info.txt value: {line}")))?;
            match k.trim() {
                "min_prime" => info.min_prime = value,
                "max_prime" => info.max_prime = value,
                "min_factors" => info.min_factors = value,
                "max_factors" => info.max_factors = value,
                "smallest_factor" => info.smallest_factor = value,
                "width" => info.width = value,
                other => {
                    log::warn!("ignoring unknown info.txt key {other}");
                }
            }
        }
        Ok(Some(info))
    }
}

/// Number of records in an open file, rejecting sizes that are not a
/// whole multiple of the record size.
fn file_records(file: &File, path: &Path, record_size: usize) -> Result<u64> {
    let len = file.metadata()?.len();
    if len % record_size as u64 != 0 {
        return Err(Error::Validation(format!(
            "{} is {} bytes, not a multiple of the {}-byte record",
            path.display(),
            len,
            record_size
        )));
    }
    Ok(len / record_size as u64)
}

/// Sort a record file in place by product via a writable memory map.
fn sort_record_file(path: &Path, record_size: usize) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    if len % record_size as u64 != 0 {
        return Err(Error::Validation(format!(
            "{} is {} bytes, not a multiple of the {}-byte record",
            path.display(),
            len,
            record_size
        )));
    }
    let mut map = unsafe { MmapMut::map_mut(&file)? };
    let snapshot = map.to_vec();
    let mut records: Vec<&[u8]> = snapshot.chunks_exact(record_size).collect();
    records.par_sort_unstable_by(|a, b| cmp_products(&a[..WIDTH_BYTES], &b[..WIDTH_BYTES]));
    for (slot, record) in map.chunks_exact_mut(record_size).zip(records) {
        slot.copy_from_slice(record);
    }
    map.flush()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;
    use tempfile::TempDir;

    fn factors_of(pairs: &[(u64, usize)]) -> PrimeFactors {
        let mut factors = PrimeFactors::new();
        for &(p, e) in pairs {
            factors.add_factor_pow(BigUint::from(p), e);
        }
        factors
    }

    #[test]
    fn test_insert_lookup_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = FactorCache::open(dir.path()).unwrap();

        let factors = factors_of(&[(2, 2), (5, 2)]);
        cache.insert(&factors).unwrap();

        let found = cache
            .lookup(&BigUint::from(100u32))
            .unwrap()
            .expect("inserted product must be found");
        assert_eq!(found, factors);
        assert_eq!(found.product(), BigUint::from(100u32));
    }

    #[test]
    fn test_lookup_miss() {
        let dir = TempDir::new().unwrap();
        let cache = FactorCache::open(dir.path()).unwrap();
        assert!(cache.lookup(&BigUint::from(100u32)).unwrap().is_none());

        cache.insert(&factors_of(&[(2, 2), (5, 2)])).unwrap();
        // 356 shares the bucket of 100 (both are 100 mod 256) but is absent
        assert!(cache.lookup(&BigUint::from(356u32)).unwrap().is_none());
        // 7 addresses a bucket file that does not exist at all
        assert!(cache.lookup(&BigUint::from(7u32)).unwrap().is_none());
    }

    #[test]
    fn test_closed_cache() {
        let cache = FactorCache::closed();
        assert!(!cache.is_open());
        assert!(cache.lookup(&BigUint::from(100u32)).unwrap().is_none());
        cache.insert(&factors_of(&[(2, 1)])).unwrap();
        cache.sort().unwrap();
    }

    #[test]
    fn test_bulk_append_then_sort() {
        let dir = TempDir::new().unwrap();
        let cache = FactorCache::open(dir.path()).unwrap();

        let sets = [
            factors_of(&[(101, 1), (103, 1)]),
            factors_of(&[(3, 4)]),
            factors_of(&[(7, 1), (11, 1), (13, 1)]),
            factors_of(&[(2, 10)]),
            factors_of(&[(5, 1), (7, 1)]),
        ];
        for factors in &sets {
            cache.append(factors).unwrap();
        }
        cache.sort().unwrap();

        for factors in &sets {
            let found = cache
                .lookup(&factors.product())
                .unwrap()
                .expect("all appended products must be found after sort");
            assert_eq!(&found, factors);
        }

        // Every index file must be non-decreasing by product
        for bucket in 0..=255u8 {
            let path = dir.path().join("index").join(format!("{bucket}.idx"));
            if !path.exists() {
                continue;
            }
            let data = fs::read(&path).unwrap();
            let mut last: Option<Vec<u8>> = None;
            for record in data.chunks_exact(INDEX_RECORD_BYTES) {
                let product = record[..WIDTH_BYTES].to_vec();
                if let Some(prev) = &last {
                    assert_ne!(
                        cmp_products(prev, &product),
                        Ordering::Greater,
                        "index bucket {} is not sorted",
                        bucket
                    );
                }
                last = Some(product);
            }
        }
    }

    #[test]
    fn test_record_size_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = FactorCache::open(dir.path()).unwrap();
        cache.insert(&factors_of(&[(2, 2), (5, 2)])).unwrap();

        // Truncate the bucket file to a non-record boundary
        let path = dir.path().join("index").join("100.idx");
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 1]).unwrap();

        let err = cache.lookup(&BigUint::from(100u32)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {err:?}");
        let err = cache.sort().unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {err:?}");
    }

    #[test]
    fn test_width_overflow() {
        let dir = TempDir::new().unwrap();
        let cache = FactorCache::open(dir.path()).unwrap();
        let huge = BigUint::one() << WIDTH_BITS;
        assert!(!fits_width(&huge));
        assert!(cache.lookup(&huge).unwrap().is_none());
        let mut factors = PrimeFactors::new();
        factors.add_factor(huge);
        let err = cache.insert(&factors).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_info_roundtrip_and_width_check() {
        let dir = TempDir::new().unwrap();
        let cache = FactorCache::open(dir.path()).unwrap();
        let info = CacheInfo {
            min_prime: 7,
            max_prime: 65537,
            min_factors: 2,
            max_factors: 4,
            smallest_factor: 1007,
            width: WIDTH_BITS as u64,
        };
        cache.write_info(&info).unwrap();
        assert_eq!(cache.read_info().unwrap(), Some(info));

        // Reopening with a different recorded width must fail
        let text = fs::read_to_string(dir.path().join("info.txt")).unwrap();
        fs::write(
            dir.path().join("info.txt"),
            text.replace(&format!("width={WIDTH_BITS}"), "width=512"),
        )
        .unwrap();
        let err = FactorCache::open(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_empty_factorization_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = FactorCache::open(dir.path()).unwrap();
        let empty = PrimeFactors::new();
        cache.insert(&empty).unwrap();
        let found = cache.lookup(&BigUint::one()).unwrap();
        assert_eq!(found, Some(empty));
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let cache = FactorCache::open(dir.path()).unwrap();
        cache.insert(&factors_of(&[(2, 1), (3, 1)])).unwrap();
        cache.insert(&factors_of(&[(5, 1), (7, 1)])).unwrap();
        cache.insert(&factors_of(&[(2, 4)])).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.index_entries, 3);
        assert_eq!(stats.factor_files, vec![(1, 1), (2, 2)]);
    }
}
