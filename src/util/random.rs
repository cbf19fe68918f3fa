use base64::Engine;
use rand::RngCore;

/// 384 bits, comfortably above the HS256 block size.
pub const DEFAULT_SECRET_BYTES: usize = 48;

/// A URL-safe signing secret drawn from the thread-local CSPRNG.
pub fn random_secret(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}
