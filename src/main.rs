use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
mod auth;
use filecrypt::digest::{self, Algorithm, Encoding};
use filecrypt::{CancelToken, KdfParams, KeySpec};
use std::path::PathBuf;
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Args)]
struct ScryptArgs {
    /// scrypt CPU/memory cost as log2(N) (default: 14)
    #[arg(long = "scrypt-log-n", env = "FILECRYPT_SCRYPT_LOG_N")]
    log_n: Option<u8>,

    /// scrypt block size r (default: 8)
    #[arg(long = "scrypt-r", env = "FILECRYPT_SCRYPT_R")]
    block_size: Option<u32>,

    /// scrypt parallelism p (default: 1)
    #[arg(long = "scrypt-p", env = "FILECRYPT_SCRYPT_P")]
    parallelism: Option<u32>,
}

impl ScryptArgs {
    fn to_kdf_params(&self) -> Result<KdfParams> {
        let default = KdfParams::default();

        Ok(KdfParams::new(
            self.log_n.unwrap_or(default.log_n()),
            self.block_size.unwrap_or(default.block_size()),
            self.parallelism.unwrap_or(default.parallelism()),
        )?)
    }
}

#[derive(Debug, clap::Args)]
struct CipherArgs {
    /// Salt mixed into key derivation
    #[arg(long, env = "FILECRYPT_SALT")]
    salt: String,

    /// AES key size in bits: 128, 192 or 256
    #[arg(long, default_value_t = 256, env = "FILECRYPT_KEY_SIZE")]
    size: u32,

    #[command(flatten)]
    scrypt: ScryptArgs,

    /// File to read
    input: PathBuf,

    /// File to write
    output: PathBuf,
}

impl CipherArgs {
    fn key_spec(&self, password: &str) -> Result<KeySpec> {
        let kdf = self.scrypt.to_kdf_params()?;
        Ok(KeySpec::new(password, &self.salt, self.size, kdf)?)
    }
}

#[derive(Debug, clap::Args)]
struct DigestArgs {
    /// Digest algorithm (md5, sha1, sha224..sha512, sha512-224, sha512-256, sha3-224..sha3-512)
    #[arg(short, long, default_value = "sha256")]
    algorithm: Algorithm,

    /// Output encoding (hex, base64, base64url, latin1)
    #[arg(short, long, default_value = "hex")]
    encoding: Encoding,

    /// File to digest
    input: PathBuf,
}

#[derive(Debug, Parser)]
#[command(name = "filecrypt")]
#[command(
    version,
    about = "Password-based file encryption with an embedded IV."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encrypts INPUT into OUTPUT
    #[command(arg_required_else_help = true)]
    Encrypt(CipherArgs),

    /// Decrypts INPUT into OUTPUT
    #[command(arg_required_else_help = true)]
    Decrypt(CipherArgs),

    /// Prints the digest of a file
    #[command(arg_required_else_help = true)]
    Hash(DigestArgs),

    /// Prints the keyed digest of a file
    #[command(arg_required_else_help = true)]
    Hmac {
        /// HMAC key
        #[arg(short, long, env = "FILECRYPT_HMAC_KEY")]
        key: String,

        #[command(flatten)]
        digest: DigestArgs,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cancel_on_interrupt() -> Result<CancelToken> {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    ctrlc::set_handler(move || handle.cancel()).context("failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    init_logging(args.verbose);

    match args.command {
        Commands::Encrypt(cipher) => {
            let password = auth::read_password(true)?;
            let spec = cipher.key_spec(&password)?;
            drop(password);
            let cancel = cancel_on_interrupt()?;
            let written = filecrypt::encrypt_file(&cipher.input, &cipher.output, &spec, &cancel)
                .context("encryption failed")?;
            debug!(written, "done");
            println!("encrypted '{}'", cipher.output.display());
        }
        Commands::Decrypt(cipher) => {
            let password = auth::read_password(false)?;
            let spec = cipher.key_spec(&password)?;
            drop(password);
            let cancel = cancel_on_interrupt()?;
            let written = filecrypt::decrypt_file(&cipher.input, &cipher.output, &spec, &cancel)
                .context("decryption failed")?;
            debug!(written, "done");
            println!("decrypted '{}'", cipher.output.display());
        }
        Commands::Hash(d) => {
            let out = digest::hash(d.algorithm, d.encoding, &d.input)
                .with_context(|| format!("failed to hash '{}'", d.input.display()))?;
            println!("{out}");
        }
        Commands::Hmac { key, digest: d } => {
            let out = digest::hmac(d.algorithm, key.as_bytes(), d.encoding, &d.input)
                .with_context(|| format!("failed to hmac '{}'", d.input.display()))?;
            println!("{out}");
        }
    }

    Ok(())
}
