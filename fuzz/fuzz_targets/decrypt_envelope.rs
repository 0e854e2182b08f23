#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static RING: Lazy<blob_decrypt::SecretKeyRing> = Lazy::new(|| {
    let key: &[u8] = include_bytes!("../../tests/fixtures/cv25519_secret_key.gpg");
    blob_decrypt::SecretKeyRing::from_reader(key).unwrap()
});

fuzz_target!(|data: &[u8]| {
    let _ = blob_decrypt::SecretKeyRing::from_reader(data);
    let _ = blob_decrypt::inspect_envelope(data);

    let mut out = Vec::new();
    let _ = blob_decrypt::decrypt_envelope(data, &mut out, &RING, "pass");
});
