//! locker: command-line tool for the document locker's master keystore and
//! envelopes.
//!
//! Output is JSON on stdout; logs and errors go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use locker_core::logging::{self, LogConfig};
use locker_crypto::{
    base64_encode, read_header, save_keystore, AccessContext, DocumentMetadata, EncryptedPayload,
    EnvelopeCodec, KdfParams, KeyPairProvider, KeyStoreSource, MasterKeyPair, OpenError,
    WrappedKey, DEFAULT_ALIAS, DEFAULT_KEY_BITS,
};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "locker")]
#[command(author, version, about = "Envelope encryption for the document locker")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Keystore location and credentials shared by the commands that load keys.
#[derive(clap::Args)]
struct KeystoreArgs {
    /// Keystore file
    #[arg(short, long, env = "LOCKER_KEYSTORE_PATH", default_value = "keystore.lks")]
    keystore: PathBuf,

    /// Alias of the key entry
    #[arg(short, long, env = "LOCKER_KEYSTORE_ALIAS", default_value = DEFAULT_ALIAS)]
    alias: String,

    /// Keystore password (min 12 characters)
    #[arg(short, long, env = "LOCKER_KEYSTORE_PASSWORD", hide_env_values = true)]
    password: String,
}

impl KeystoreArgs {
    fn load(&self) -> anyhow::Result<Arc<MasterKeyPair>> {
        KeyPairProvider::new(self.alias.as_str(), self.password.as_str())
            .load(&KeyStoreSource::File(self.keystore.clone()))
            .with_context(|| format!("loading keystore {}", self.keystore.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new RSA master keypair and write it to a keystore
    Keygen {
        #[command(flatten)]
        keystore: KeystoreArgs,

        /// RSA modulus size in bits
        #[arg(short, long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,

        /// Overwrite an existing keystore
        #[arg(long)]
        force: bool,
    },

    /// Show alias, creation time and public key fingerprint (no password needed)
    Inspect {
        /// Keystore file
        #[arg(short, long, env = "LOCKER_KEYSTORE_PATH", default_value = "keystore.lks")]
        keystore: PathBuf,
    },

    /// Encrypt a file; writes the ciphertext and a JSON envelope record
    Seal {
        #[command(flatten)]
        keystore: KeystoreArgs,

        /// Plaintext input file
        #[arg(short, long)]
        input: PathBuf,

        /// Ciphertext output file
        #[arg(short, long)]
        output: PathBuf,

        /// Envelope record output (nonce and wrapped key)
        #[arg(short, long)]
        envelope: PathBuf,
    },

    /// Decrypt a file as a given caller, after the access policy allows it
    Open {
        #[command(flatten)]
        keystore: KeystoreArgs,

        /// Ciphertext input file
        #[arg(short, long)]
        input: PathBuf,

        /// Envelope record written by `seal`
        #[arg(short, long)]
        envelope: PathBuf,

        /// Document metadata JSON (owner, visibility, allow-list)
        #[arg(short, long)]
        metadata: PathBuf,

        /// Caller user id
        #[arg(long)]
        caller: String,

        /// Caller role (admin, doctor, patient)
        #[arg(long)]
        role: Option<String>,

        /// Plaintext output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Envelope parameters stored next to the ciphertext.
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeRecord {
    nonce: String,
    wrapped_key: WrappedKey,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_config = LogConfig::from_lookup(|key| std::env::var(key).ok());
    let _guard = match logging::init(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Keygen {
            keystore,
            bits,
            force,
        } => cmd_keygen(&keystore, bits, force),
        Commands::Inspect { keystore } => cmd_inspect(&keystore),
        Commands::Seal {
            keystore,
            input,
            output,
            envelope,
        } => cmd_seal(&keystore, &input, &output, &envelope),
        Commands::Open {
            keystore,
            input,
            envelope,
            metadata,
            caller,
            role,
            output,
        } => cmd_open(
            &keystore,
            &input,
            &envelope,
            &metadata,
            AccessContext::from_claims(caller, role.as_deref()),
            &output,
        ),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_keygen(args: &KeystoreArgs, bits: usize, force: bool) -> anyhow::Result<()> {
    if args.keystore.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.keystore.display()
        );
    }

    let pair = MasterKeyPair::generate(bits)?;
    save_keystore(
        &pair,
        &args.keystore,
        &args.alias,
        &args.password,
        &KdfParams::default(),
    )
    .with_context(|| format!("writing keystore {}", args.keystore.display()))?;

    print_json(&serde_json::json!({
        "keystore": args.keystore.to_string_lossy(),
        "alias": args.alias,
        "bits": pair.bits(),
        "fingerprint": pair.fingerprint()?,
    }))
}

fn cmd_inspect(path: &Path) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading keystore {}", path.display()))?;
    let header = read_header(&bytes)?;

    print_json(&serde_json::json!({
        "keystore": path.to_string_lossy(),
        "version": header.version,
        "alias": header.alias,
        "kdf": header.kdf,
        "created_at": header.created_at,
        "fingerprint": header.certificate_fingerprint()?,
    }))
}

fn cmd_seal(
    args: &KeystoreArgs,
    input: &Path,
    output: &Path,
    envelope: &Path,
) -> anyhow::Result<()> {
    let codec = EnvelopeCodec::new(args.load()?);
    let plaintext =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;

    let sealed = codec.seal(&plaintext)?;
    std::fs::write(output, &sealed.payload.ciphertext)
        .with_context(|| format!("writing {}", output.display()))?;

    let record = EnvelopeRecord {
        nonce: base64_encode(&sealed.payload.nonce),
        wrapped_key: sealed.wrapped_key,
    };
    std::fs::write(envelope, serde_json::to_vec_pretty(&record)?)
        .with_context(|| format!("writing {}", envelope.display()))?;

    print_json(&serde_json::json!({
        "input": input.to_string_lossy(),
        "output": output.to_string_lossy(),
        "envelope": envelope.to_string_lossy(),
        "input_size": plaintext.len(),
        "output_size": sealed.payload.ciphertext.len(),
    }))
}

fn cmd_open(
    args: &KeystoreArgs,
    input: &Path,
    envelope: &Path,
    metadata: &Path,
    ctx: AccessContext,
    output: &Path,
) -> anyhow::Result<()> {
    let record: EnvelopeRecord = serde_json::from_slice(
        &std::fs::read(envelope).with_context(|| format!("reading {}", envelope.display()))?,
    )
    .context("parsing envelope record")?;
    let meta: DocumentMetadata = serde_json::from_slice(
        &std::fs::read(metadata).with_context(|| format!("reading {}", metadata.display()))?,
    )
    .context("parsing document metadata")?;

    let ciphertext =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let nonce = locker_crypto::base64_decode(&record.nonce).context("envelope nonce")?;
    let payload = EncryptedPayload::from_parts(ciphertext, &nonce)?;

    let codec = EnvelopeCodec::new(args.load()?);
    let plaintext = match codec.open(&payload, &record.wrapped_key, &ctx, &meta) {
        Ok(plaintext) => plaintext,
        Err(OpenError::AccessDenied) => bail!("access denied for role {}", ctx.role_label()),
        Err(OpenError::DecryptionFailed) => bail!("decryption failed"),
    };
    std::fs::write(output, &plaintext).with_context(|| format!("writing {}", output.display()))?;

    print_json(&serde_json::json!({
        "input": input.to_string_lossy(),
        "output": output.to_string_lossy(),
        "role": ctx.role_label(),
        "output_size": plaintext.len(),
    }))
}
