//! CRC-64 with the ECMA-182 polynomial, bit-reflected, with all-ones
//! initial value and final xor (the CRC-64/XZ parameter set).

use crc::{Crc, CRC_64_XZ};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Checksums the current contents of the file at `path`.
pub fn checksum_file(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let mut digest = CRC64.digest();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finalize())
}
