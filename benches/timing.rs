use std::hint::black_box;
use std::io;
use std::time::Instant;

use blob_decrypt::{decrypt_envelope, decrypt_symmetric, derive_salted, SecretKeyRing};

const SALTED: &[u8] = include_bytes!("../tests/fixtures/salted_pattern.bin");
const SALTED_B64: &[u8] = include_bytes!("../tests/fixtures/salted_pattern.b64");
const RSA_KEY: &[u8] = include_bytes!("../tests/fixtures/rsa_secret_key.asc");
const CV25519_KEY: &[u8] = include_bytes!("../tests/fixtures/cv25519_secret_key.gpg");
const RSA_STREAM: &[u8] = include_bytes!("../tests/fixtures/rsa_pattern_stream.gpg");
const RSA_SMALL: &[u8] = include_bytes!("../tests/fixtures/rsa_secret.gpg");
const CV25519_SMALL: &[u8] = include_bytes!("../tests/fixtures/cv25519_secret.gpg");

fn time_it<F: FnMut()>(label: &str, iters: usize, mut f: F) {
    // warmup
    for _ in 0..(iters / 10).max(1) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();

    let per_iter = elapsed / (iters as u32);
    println!("{:<20} total={:?}  per_iter={:?}", label, elapsed, per_iter);
}

fn main() {
    let rsa = SecretKeyRing::from_reader(RSA_KEY).unwrap();
    let cv25519 = SecretKeyRing::from_reader(CV25519_KEY).unwrap();

    time_it("kdf_salted", 100_000, || {
        black_box(derive_salted(black_box("hunter2"), black_box(&[1, 2, 3, 4, 5, 6, 7, 8])));
    });

    time_it("symmetric_100k", 500, || {
        let n = decrypt_symmetric(black_box(SALTED), io::sink(), "hunter2", false, None).unwrap();
        black_box(n);
    });

    time_it("symmetric_b64_100k", 500, || {
        let n = decrypt_symmetric(black_box(SALTED_B64), io::sink(), "hunter2", true, None).unwrap();
        black_box(n);
    });

    time_it("wrong_password", 500, || {
        let r = decrypt_symmetric(black_box(SALTED), io::sink(), "hunter3", false, None);
        black_box(r.err());
    });

    // dominated by S2K (65536 bytes of SHA-1) and the RSA private operation
    time_it("envelope_rsa", 50, || {
        let n = decrypt_envelope(black_box(RSA_SMALL), io::sink(), &rsa, "pass").unwrap();
        black_box(n);
    });

    time_it("envelope_cv25519", 200, || {
        let n = decrypt_envelope(black_box(CV25519_SMALL), io::sink(), &cv25519, "pass").unwrap();
        black_box(n);
    });

    time_it("envelope_rsa_100k", 50, || {
        let n = decrypt_envelope(black_box(RSA_STREAM), io::sink(), &rsa, "pass").unwrap();
        black_box(n);
    });

    time_it("wrong_passphrase", 50, || {
        let r = decrypt_envelope(black_box(RSA_SMALL), io::sink(), &rsa, "nope");
        black_box(r.err());
    });

    println!("\nDone.");
}
