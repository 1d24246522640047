use blake2::Blake2b;
use digest::Digest;

pub fn blake2b_string(value: &str) -> String {
    let mut hasher = Blake2b::new();
    hasher.update(value);
    let result = hasher.finalize();
    hex::encode(&result[..])
}
