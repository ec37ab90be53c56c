//! Identifier and password generation.
//!
//! The orchestrator owns generation policy: session ids and login names get
//! 48 bits of entropy rendered as 12 hex characters, passwords get 24 random
//! bytes rendered as url-safe base64. The provider receives the results as
//! inputs; the database never synthesises credentials.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroizing;

const ID_ENTROPY_BYTES: usize = 6;
const PASSWORD_ENTROPY_BYTES: usize = 24;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Fresh session id: `ses_` + 12 hex characters.
pub fn generate_session_id() -> String {
    format!("ses_{}", random_hex(ID_ENTROPY_BYTES))
}

/// Fresh login name: `gk_` + 12 hex characters.
///
/// Matches the pattern the bootstrap helpers enforce; total length 15.
pub fn generate_username() -> String {
    format!("gk_{}", random_hex(ID_ENTROPY_BYTES))
}

/// Fresh password: 24 random bytes as url-safe base64 (32 characters).
///
/// Zeroized on drop. The url-safe alphabet keeps the DSN encoding simple.
pub fn generate_password() -> Zeroizing<String> {
    let mut buf = [0u8; PASSWORD_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    Zeroizing::new(URL_SAFE_NO_PAD.encode(buf))
}
