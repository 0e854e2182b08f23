//! OpenPGP envelopes produced by GnuPG 2.2.

mod common;

use std::fs::{self, File};
use std::io::BufWriter;

use blob_decrypt::{
    decrypt_envelope, inspect_envelope, output_name, Config, ContainerInfo, DecryptError, KeyId,
    Mode, SecretKeyRing, SecretSource, StaticSecrets,
};

use common::{
    cv25519_ring, fixture, pattern, rsa_ring, CV25519_SUBKEY, KEY_PASSPHRASE, RSA_PRIMARY, RSA_SUBKEY,
};

fn setup() -> SecretKeyRing {
    let mut ring = rsa_ring();
    let cv = cv25519_ring();
    for id in cv.key_ids() {
        ring.insert(cv.get(id).unwrap().clone());
    }
    ring
}

fn open(data: &[u8], ring: &SecretKeyRing, passphrase: &str) -> Result<Vec<u8>, DecryptError> {
    let mut out = Vec::new();
    let n = decrypt_envelope(data, &mut out, ring, passphrase)?;
    assert_eq!(n as usize, out.len());
    Ok(out)
}

/// Rewrite the recipient key id of a message whose first packet is an
/// old-format PKESK with a two-byte length.
fn readdress(mut data: Vec<u8>, id: u64) -> Vec<u8> {
    assert_eq!(data[0], 0x85);
    assert_eq!(data[3], 3);
    data[4..12].copy_from_slice(&id.to_be_bytes());
    data
}

#[test]
fn every_fixture_opens() {
    let ring = setup();
    for name in [
        "rsa_secret.gpg",
        "rsa_secret.asc",
        "rsa_uncompressed.gpg",
        "rsa_zlib.gpg",
        "rsa_no_mdc.gpg",
        "cv25519_secret.gpg",
        "multi_recipient.gpg",
    ] {
        let out = open(&fixture(name), &ring, KEY_PASSPHRASE)
            .unwrap_or_else(|e| panic!("{}: {}", name, e));
        assert_eq!(out, b"secret", "{}", name);
    }
}

#[test]
fn partial_length_stream() {
    let out = open(&fixture("rsa_pattern_stream.gpg"), &rsa_ring(), KEY_PASSPHRASE).unwrap();
    assert_eq!(out.len(), 100_000);
    assert_eq!(out, pattern(100_000));
}

#[test]
fn multi_recipient_uses_whichever_key_is_present() {
    let data = fixture("multi_recipient.gpg");
    assert_eq!(open(&data, &rsa_ring(), KEY_PASSPHRASE).unwrap(), b"secret");
    assert_eq!(open(&data, &cv25519_ring(), KEY_PASSPHRASE).unwrap(), b"secret");
}

#[test]
fn key_registered_under_alias() {
    let rsa = rsa_ring();
    let key = rsa.get(KeyId(RSA_SUBKEY)).unwrap().clone();
    let mut ring = SecretKeyRing::new();
    ring.insert_as(KeyId(0xDEADBEEF), key);

    let data = readdress(fixture("rsa_uncompressed.gpg"), 0xDEADBEEF);
    assert_eq!(open(&data, &ring, "pass").unwrap(), b"secret");
}

#[test]
fn no_matching_key() {
    let rsa = rsa_ring();
    let key = rsa.get(KeyId(RSA_SUBKEY)).unwrap().clone();
    let mut ring = SecretKeyRing::new();
    ring.insert_as(KeyId(0xFEEDFACE), key);

    let data = readdress(fixture("rsa_uncompressed.gpg"), 0xDEADBEEF);
    assert!(matches!(
        open(&data, &ring, "pass"),
        Err(DecryptError::NoMatchingPrivateKey)
    ));
    assert!(matches!(
        open(&fixture("rsa_secret.gpg"), &cv25519_ring(), "pass"),
        Err(DecryptError::NoMatchingPrivateKey)
    ));
    assert!(matches!(
        open(&fixture("rsa_secret.gpg"), &SecretKeyRing::new(), "pass"),
        Err(DecryptError::NoMatchingPrivateKey)
    ));
}

#[test]
fn wildcard_recipient_never_matches() {
    let rsa = rsa_ring();
    let key = rsa.get(KeyId(RSA_SUBKEY)).unwrap().clone();
    let mut ring = SecretKeyRing::new();
    ring.insert_as(KeyId(0), key);

    let data = readdress(fixture("rsa_uncompressed.gpg"), 0);
    assert!(matches!(
        open(&data, &ring, "pass"),
        Err(DecryptError::NoMatchingPrivateKey)
    ));
}

#[test]
fn wrong_passphrase_names_the_key() {
    let err = open(&fixture("rsa_secret.gpg"), &rsa_ring(), "not-pass").unwrap_err();
    match err {
        DecryptError::WrongPassphrase(id) => assert_eq!(id, KeyId(RSA_SUBKEY)),
        other => panic!("unexpected {:?}", other),
    }

    let err = open(&fixture("cv25519_secret.gpg"), &cv25519_ring(), "").unwrap_err();
    assert!(matches!(err, DecryptError::WrongPassphrase(id) if id == KeyId(CV25519_SUBKEY)));
}

/// `gpg --export-secret-subkeys`: the primary key is a gnu-dummy stub.
#[test]
fn subkeys_only_export() {
    let ring = SecretKeyRing::from_reader(&fixture("rsa_subkeys_only.gpg")[..]).unwrap();
    assert_eq!(ring.key_ids(), vec![KeyId(RSA_PRIMARY), KeyId(RSA_SUBKEY)]);

    let primary = ring.get(KeyId(RSA_PRIMARY)).unwrap();
    assert!(!primary.is_available());
    assert!(matches!(
        primary.unlock(KEY_PASSPHRASE),
        Err(DecryptError::UnsupportedFormat(_))
    ));
    assert!(ring.get(KeyId(RSA_SUBKEY)).unwrap().is_available());

    assert_eq!(open(&fixture("rsa_secret.gpg"), &ring, KEY_PASSPHRASE).unwrap(), b"secret");
    assert_eq!(
        open(&fixture("rsa_pattern_stream.gpg"), &ring, KEY_PASSPHRASE).unwrap(),
        pattern(100_000)
    );

    // addressed to the offline primary
    let data = readdress(fixture("rsa_uncompressed.gpg"), RSA_PRIMARY);
    assert!(matches!(
        open(&data, &ring, KEY_PASSPHRASE),
        Err(DecryptError::UnsupportedFormat(_))
    ));
}

#[test]
fn signed_message_is_rejected() {
    assert!(matches!(
        open(&fixture("rsa_signed.gpg"), &rsa_ring(), KEY_PASSPHRASE),
        Err(DecryptError::UnsupportedMessageType(_))
    ));
}

#[test]
fn tampered_mdc_fails_after_streaming() {
    let mut data = fixture("rsa_uncompressed.gpg");
    let last = data.len() - 1;
    data[last] ^= 0x01;

    let mut out = Vec::new();
    let result = decrypt_envelope(&data[..], &mut out, &rsa_ring(), KEY_PASSPHRASE);
    assert!(matches!(result, Err(DecryptError::IntegrityCheckFailed)));
    // caller's job to throw this away
    assert_eq!(out, b"secret");
}

#[test]
fn armor_checksum_mismatch() {
    let text = String::from_utf8(fixture("rsa_secret.asc")).unwrap();
    assert!(text.contains("\n=uQnH\n"));
    let tampered = text.replace("\n=uQnH\n", "\n=uQnI\n");
    assert!(matches!(
        open(tampered.as_bytes(), &rsa_ring(), KEY_PASSPHRASE),
        Err(DecryptError::MalformedHeader(_))
    ));
}

#[test]
fn truncated_message() {
    let data = fixture("rsa_pattern_stream.gpg");
    assert!(matches!(
        open(&data[..data.len() / 2], &rsa_ring(), KEY_PASSPHRASE),
        Err(DecryptError::IoTruncated(_))
    ));

    let data = fixture("rsa_uncompressed.gpg");
    assert!(matches!(
        open(&data[..100], &rsa_ring(), KEY_PASSPHRASE),
        Err(DecryptError::IoTruncated(_))
    ));
}

#[test]
fn garbage_is_malformed() {
    assert!(matches!(
        open(&[0xFF, 0x00, 0x01], &rsa_ring(), KEY_PASSPHRASE),
        Err(DecryptError::MalformedHeader(_))
    ));
    assert!(matches!(
        open(b"", &rsa_ring(), KEY_PASSPHRASE),
        Err(DecryptError::MalformedHeader(_))
    ));
}

#[test]
fn inspect_lists_recipients() {
    let info = match inspect_envelope(&fixture("multi_recipient.gpg")[..]).unwrap() {
        ContainerInfo::Envelope(info) => info,
        other => panic!("unexpected {:?}", other),
    };
    assert!(!info.armored);
    assert!(info.integrity_protected);
    assert_eq!(info.recipients, vec![KeyId(CV25519_SUBKEY), KeyId(RSA_SUBKEY)]);

    let info = match inspect_envelope(&fixture("rsa_secret.asc")[..]).unwrap() {
        ContainerInfo::Envelope(info) => info,
        other => panic!("unexpected {:?}", other),
    };
    assert!(info.armored);

    let info = match inspect_envelope(&fixture("rsa_no_mdc.gpg")[..]).unwrap() {
        ContainerInfo::Envelope(info) => info,
        other => panic!("unexpected {:?}", other),
    };
    assert!(!info.integrity_protected);
}

#[test]
fn ring_is_shared_across_threads() {
    let ring = setup();
    let rsa = fixture("rsa_secret.gpg");
    let cv = fixture("cv25519_secret.gpg");

    std::thread::scope(|s| {
        for i in 0..4 {
            let data = if i % 2 == 0 { &rsa } else { &cv };
            let ring = &ring;
            s.spawn(move || {
                assert_eq!(open(data, ring, KEY_PASSPHRASE).unwrap(), b"secret");
            });
        }
    });
}

#[test]
fn configured_envelope_run() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("secret-key.asc");
    fs::write(&key_path, fixture("rsa_secret_key.asc")).unwrap();

    let config = Config::from_lookup(|name| match name {
        "BLOB_DECRYPT_MODE" => Some("envelope".into()),
        "PRIVATE_KEY_PATH" => Some(key_path.to_string_lossy().into_owned()),
        "PASSPHRASE_SECRET_NAME" => Some("pgp-passphrase".into()),
        _ => None,
    })
    .unwrap();
    let (private_key_path, secret_name) = match config.mode {
        Mode::Envelope { private_key_path, passphrase_secret_name } => {
            (private_key_path, passphrase_secret_name)
        }
        other => panic!("unexpected {:?}", other),
    };

    let secrets = StaticSecrets::new().with("pgp-passphrase", KEY_PASSPHRASE);
    let passphrase = secrets.get_password(&secret_name).unwrap();
    let ring = SecretKeyRing::from_reader(File::open(private_key_path).unwrap()).unwrap();

    let out_path = dir.path().join(output_name("report.csv.gpg"));
    let sink = BufWriter::new(File::create(&out_path).unwrap());
    let n = decrypt_envelope(&fixture("rsa_secret.gpg")[..], sink, &ring, &passphrase).unwrap();

    assert_eq!(n, 6);
    assert!(out_path.ends_with("report.csv"));
    assert_eq!(fs::read(&out_path).unwrap(), b"secret");
}
