//! blob-decrypt CLI: decrypt OpenSSL containers and OpenPGP envelopes
//!
//! Usage:
//!   blob-decrypt symmetric --in <file> [--out <file>] [--base64] [--password-env <var>]
//!   blob-decrypt envelope --in <file> --key <keyring> [--out <file>] [--passphrase-env <var>]
//!   blob-decrypt inspect --in <file> [--base64]
//!   blob-decrypt env --in <file> [--out <file>]
//!
//! Environment:
//!   RUST_LOG                  - log filter, default "blob_decrypt=info"
//!   BLOB_DECRYPT_LOG_FORMAT   - "json" for structured logging, "pretty" for dev

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use blob_decrypt::{
    output_name, Config, ContainerInfo, EncryptionHeader, EnvSecretSource, Mode, SecretKeyRing,
    SecretSource,
};

const DEFAULT_PASSWORD_ENV: &str = "BLOB_DECRYPT_PASSWORD";
const DEFAULT_PASSPHRASE_ENV: &str = "BLOB_DECRYPT_PASSPHRASE";
const MB: f64 = 1024.0 * 1024.0;
/// Used when RUST_LOG is unset: our own events at info, dependencies silent.
const DEFAULT_LOG_FILTER: &str = "blob_decrypt=info";

fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let result = match args[1].as_str() {
        "symmetric" => cmd_symmetric(&args[2..]),
        "envelope" => cmd_envelope(&args[2..]),
        "inspect" => cmd_inspect(&args[2..]),
        "env" => cmd_env(&args[2..]),
        "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "--version" | "-V" => {
            println!("blob-decrypt {}", blob_decrypt::VERSION);
            Ok(())
        }
        cmd => {
            eprintln!("error: unknown command '{}'", cmd);
            print_usage();
            Err("unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let log_format = std::env::var("BLOB_DECRYPT_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"blob-decrypt: decrypt encrypted blobs

USAGE:
    blob-decrypt <COMMAND> [OPTIONS]

COMMANDS:
    symmetric   Decrypt an OpenSSL AES-256-CBC container (salted or legacy)
    envelope    Decrypt an OpenPGP message with a secret key ring
    inspect     Show container metadata (no decryption)
    env         Decrypt as configured by environment variables

EXAMPLES:
    # Password from $BLOB_DECRYPT_PASSWORD, writes report.csv
    blob-decrypt symmetric --in report.csv.enc

    # Base64 container, password from $VAULT_PW
    blob-decrypt symmetric --in report.b64 --base64 --password-env VAULT_PW --out report.csv

    # Passphrase from $BLOB_DECRYPT_PASSPHRASE, writes report.csv
    blob-decrypt envelope --in report.csv.gpg --key secret-key.asc

    # Mode and secret names from BLOB_DECRYPT_MODE, ENCRYPTION_SECRET_NAME,
    # INPUT_BASE64, PRIVATE_KEY_PATH, PASSPHRASE_SECRET_NAME
    blob-decrypt env --in report.csv.enc

    # Recipients of a message
    blob-decrypt inspect --in report.csv.gpg

OPTIONS:
    -h, --help       Print help
    -V, --version    Print version
"#
    );
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    key: Option<PathBuf>,
    secret_env: Option<String>,
    base64: bool,
}

fn parse_args(args: &[String], secret_flag: &str) -> Result<Args, Box<dyn std::error::Error>> {
    let mut parsed = Args::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--in" | "-i" => {
                i += 1;
                parsed.input = Some(PathBuf::from(args.get(i).ok_or("missing input path")?));
            }
            "--out" | "-o" => {
                i += 1;
                parsed.output = Some(PathBuf::from(args.get(i).ok_or("missing output path")?));
            }
            "--key" | "-k" => {
                i += 1;
                parsed.key = Some(PathBuf::from(args.get(i).ok_or("missing key path")?));
            }
            "--base64" => parsed.base64 = true,
            flag if flag == secret_flag => {
                i += 1;
                parsed.secret_env = Some(args.get(i).ok_or("missing variable name")?.clone());
            }
            _ => return Err(format!("unknown option: {}", args[i]).into()),
        }
        i += 1;
    }

    Ok(parsed)
}

/// Output path: explicit, or the input with its encryption extension
/// stripped.
fn resolve_output(input: &Path, output: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let out = match output {
        Some(out) => out,
        None => PathBuf::from(output_name(&input.to_string_lossy())),
    };
    if out == input {
        return Err("output path would overwrite input, pass --out".into());
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_symmetric(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(args, "--password-env")?;
    let input = args.input.ok_or("missing --in")?;
    let output = resolve_output(&input, args.output)?;
    let var = args.secret_env.unwrap_or_else(|| DEFAULT_PASSWORD_ENV.to_string());

    let password = EnvSecretSource::new().get_password(&var)?;
    run_symmetric(&input, &output, &password, args.base64)
}

fn cmd_envelope(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(args, "--passphrase-env")?;
    let input = args.input.ok_or("missing --in")?;
    let key = args.key.ok_or("missing --key")?;
    let output = resolve_output(&input, args.output)?;
    let var = args.secret_env.unwrap_or_else(|| DEFAULT_PASSPHRASE_ENV.to_string());

    // an unprotected key has an empty passphrase
    let passphrase = EnvSecretSource::new().get_secret(&var)?;
    run_envelope(&input, &output, &key, &passphrase)
}

fn cmd_env(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(args, "")?;
    let input = args.input.ok_or("missing --in")?;
    let output = resolve_output(&input, args.output)?;

    let config = Config::from_env()?;
    let secrets = EnvSecretSource::new();

    match config.mode {
        Mode::Symmetric { secret_name, base64 } => {
            let password = secrets.get_password(&secret_name)?;
            run_symmetric(&input, &output, &password, base64)
        }
        Mode::Envelope {
            private_key_path,
            passphrase_secret_name,
        } => {
            let passphrase = secrets.get_secret(&passphrase_secret_name)?;
            run_envelope(&input, &output, &private_key_path, &passphrase)
        }
    }
}

fn cmd_inspect(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(args, "")?;
    let input = args.input.ok_or("missing --in")?;

    let size = fs::metadata(&input)?.len();
    let envelope = if looks_like_envelope(&input)? {
        // a legacy IV can start with a high-bit byte too
        blob_decrypt::inspect_envelope(BufReader::new(File::open(&input)?))
            .map_err(|e| tracing::debug!(error = %e, "not an OpenPGP message"))
            .ok()
    } else {
        None
    };
    let info = match envelope {
        Some(info) => info,
        None => blob_decrypt::inspect_symmetric(BufReader::new(File::open(&input)?), args.base64)?,
    };

    match info {
        ContainerInfo::Symmetric(header) => {
            println!("Symmetric Container");
            println!("===================");
            println!("Cipher:          AES-256-CBC");
            match header {
                EncryptionHeader::Salted { salt } => {
                    println!("Header:          salted (EVP_BytesToKey, MD5)");
                    println!("Salt:            {}", hex(&salt));
                }
                EncryptionHeader::Legacy { iv } => {
                    println!("Header:          legacy (SHA-256 of password)");
                    println!("IV:              {}", hex(&iv));
                }
            }
        }
        ContainerInfo::Envelope(info) => {
            println!("OpenPGP Message");
            println!("===============");
            println!("Armored:         {}", info.armored);
            println!("Integrity:       {}", if info.integrity_protected { "MDC" } else { "none" });
            println!("Recipients:      {}", info.recipients.len());
            for id in &info.recipients {
                if id.is_wildcard() {
                    println!("  {} (anonymous)", id);
                } else {
                    println!("  {}", id);
                }
            }
        }
    }
    println!();
    println!("Total Size:      {} bytes", size);

    Ok(())
}

/// OpenPGP packets start with a high-bit byte, armor with "-----BEGIN PGP".
fn looks_like_envelope(path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    use std::io::Read;

    let mut head = [0u8; 14];
    let n = File::open(path)?.read(&mut head)?;
    let head = &head[..n];
    Ok(head.starts_with(b"-----BEGIN PGP")
        || (head.first().map_or(false, |b| b & 0x80 != 0) && !head.starts_with(b"Salted__")))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ---------------------------------------------------------------------------
// Decryption with partial-output cleanup
// ---------------------------------------------------------------------------

fn run_symmetric(
    input: &Path,
    output: &Path,
    password: &str,
    base64: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = processing(input)?;
    let source = BufReader::new(File::open(input)?);
    let sink = BufWriter::new(File::create(output)?);

    let mut progress = |bytes: u64| {
        tracing::info!(blob = %input.display(), processed_mb = bytes as f64 / MB, "progress");
    };
    let result = blob_decrypt::decrypt_symmetric(source, sink, password, base64, Some(&mut progress));
    finish(output, started, result)
}

fn run_envelope(
    input: &Path,
    output: &Path,
    key: &Path,
    passphrase: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ring = SecretKeyRing::from_reader(BufReader::new(File::open(key)?))?;
    tracing::debug!(keys = ring.len(), path = %key.display(), "loaded key ring");

    let started = processing(input)?;
    let source = BufReader::new(File::open(input)?);
    let sink = BufWriter::new(File::create(output)?);

    let result = blob_decrypt::decrypt_envelope(source, sink, &ring, passphrase);
    finish(output, started, result)
}

fn processing(input: &Path) -> Result<Instant, Box<dyn std::error::Error>> {
    let size = fs::metadata(input)?.len();
    tracing::info!(blob = %input.display(), size_mb = size as f64 / MB, "processing");
    Ok(Instant::now())
}

fn finish(
    output: &Path,
    started: Instant,
    result: Result<u64, blob_decrypt::DecryptError>,
) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(written) => {
            tracing::info!(
                output = %output.display(),
                size_mb = written as f64 / MB,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "decrypted"
            );
            Ok(())
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(output) {
                tracing::warn!(output = %output.display(), error = %rm, "could not remove partial output");
            }
            tracing::error!(error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "decryption failed");
            Err(e.into())
        }
    }
}
