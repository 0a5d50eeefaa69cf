use md5::{Digest, Md5};
use std::io::{self, Read, Seek, SeekFrom};
use tokio::runtime::{Handle, RuntimeFlavor};

/// Runs a synchronous pass over upload content off the async scheduler.
///
/// Uses `block_in_place` on a multi-threaded runtime. Elsewhere `f` runs inline,
/// since `block_in_place` panics on a current-thread runtime.
pub fn blocking_read<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Runs `f` against `reader` and rewinds it to offset 0 afterwards, whether or not `f` succeeded.
pub fn with_rewind<R, T, F>(reader: &mut R, f: F) -> io::Result<T>
where
    R: Seek + ?Sized,
    F: FnOnce(&mut R) -> io::Result<T>,
{
    let outcome = f(reader);
    let rewound = reader.seek(SeekFrom::Start(0));

    let value = outcome?;
    rewound?;
    Ok(value)
}

/// Computes the MD5 hex digest of the whole stream, reading `chunk_size` bytes at a time.
///
/// Hashing always starts from offset 0 and the stream is left at offset 0.
pub fn compute_checksum<R: Read + Seek + ?Sized>(
    reader: &mut R,
    chunk_size: usize,
) -> io::Result<String> {
    with_rewind(reader, |reader| {
        reader.seek(SeekFrom::Start(0))?;

        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; chunk_size.max(1)];
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    })
}

/// Compares a claimed checksum with a computed one.
///
/// Unless `case_sensitive` is set both sides are lowercased first.
pub fn checksums_match(claimed: &str, computed: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        claimed == computed
    } else {
        claimed.to_ascii_lowercase() == computed.to_ascii_lowercase()
    }
}
