pub mod cipher;
pub mod keys;

pub use cipher::{content_hash, decrypt_bytes, derive_key, encrypt_bytes, generate_salt};
pub use keys::KeyMaterialRecord;
