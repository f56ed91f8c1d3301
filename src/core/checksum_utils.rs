/*
 * Provides utility functions for calculating checksums of files.
 * Currently, it supports SHA256 checksum calculation. Payload copies made by
 * export and clone are verified with it, since the payload is opaque and has to
 * arrive byte-for-byte.
 */
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/*
 * Calculates the SHA256 checksum of a file and returns it as a hex-encoded string.
 *
 * Reads the file in chunks to handle potentially large files efficiently. If any
 * I/O error occurs during file reading or if the path does not point to a file,
 * an `io::Error` is returned.
 */
pub fn calculate_sha256_checksum(file_path: &Path) -> io::Result<String> {
    log::trace!(
        "ChecksumUtils: Calculating SHA256 checksum for: {:?}",
        file_path
    );
    if !file_path.is_file() {
        let err_msg = format!(
            "Path {:?} is not a file, cannot calculate checksum.",
            file_path
        );
        log::warn!("ChecksumUtils: {}", err_msg);
        return Err(io::Error::new(io::ErrorKind::InvalidInput, err_msg));
    }

    let file = File::open(file_path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0; 1024 * 4];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn files_have_same_content(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(calculate_sha256_checksum(a)? == calculate_sha256_checksum(b)?)
}
