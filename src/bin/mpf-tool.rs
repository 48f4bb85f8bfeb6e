use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};
use structopt::StructOpt;

use merkle_forestry::config::Config;
use merkle_forestry::crypto::{hash_from_slice, Hash};
use merkle_forestry::init_logger;
use merkle_forestry::storage::kv_store::{NodeStore, RocksDBStore};
use merkle_forestry::storage::trie::nibbles::hex_prefix_to_bytes;
use merkle_forestry::storage::trie::{proof_to_aiken, proof_to_json, MpfTrie};

/// Metadata key holding the latest root; node keys are always 32 bytes
const ROOT_KEY: &[u8] = b"__mpf_root__";

#[derive(Debug, StructOpt)]
#[structopt(name = "mpf-tool", about = "Merkle Patricia Forestry command line tool")]
struct Opt {
    /// Configuration file
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Database path (overrides the configuration)
    #[structopt(long)]
    db_path: Option<String>,

    /// Read keys and values as hex instead of UTF-8
    #[structopt(long)]
    hex: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Insert or update a key
    Put { key: String, value: String },

    /// Print the value stored under a key
    Get { key: String },

    /// Remove a key
    Delete { key: String },

    /// Print the current root hash
    Root,

    /// Print a proof for a key
    Prove {
        key: String,

        /// Output format (hex, json, aiken)
        #[structopt(long, default_value = "hex")]
        format: String,
    },

    /// Check a hex proof against a root
    Verify {
        key: String,

        /// Hex-encoded CBOR proof
        proof: String,

        /// Expected value; omit to check exclusion
        #[structopt(long)]
        value: Option<String>,

        /// Expected root (defaults to the stored root)
        #[structopt(long)]
        root: Option<String>,
    },

    /// List stored entries
    Entries {
        /// Maximum number of entries (0 for all)
        #[structopt(long, default_value = "0")]
        limit: usize,

        /// Hex prefix of the hashed path
        #[structopt(long)]
        prefix: Option<String>,
    },

    /// Write a default configuration file
    GenerateConfig {
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
}

fn decode_input(input: &str, as_hex: bool) -> Result<Vec<u8>, Box<dyn Error>> {
    if as_hex {
        Ok(hex::decode(input)?)
    } else {
        Ok(input.as_bytes().to_vec())
    }
}

fn render_value(value: &[u8], as_hex: bool) -> String {
    if as_hex {
        return hex::encode(value);
    }
    match std::str::from_utf8(value) {
        Ok(s) => s.to_string(),
        Err(_) => hex::encode(value),
    }
}

fn load_root(store: &dyn NodeStore) -> Result<Option<Hash>, Box<dyn Error>> {
    Ok(store.get(ROOT_KEY)?.and_then(|bytes| hash_from_slice(&bytes)))
}

fn save_root(store: &dyn NodeStore, root: Option<Hash>) -> Result<(), Box<dyn Error>> {
    match root {
        Some(hash) => store.put(ROOT_KEY, &hash)?,
        None => store.delete(ROOT_KEY)?,
    }
    store.flush()?;
    Ok(())
}

fn parse_root(input: &str) -> Result<Hash, Box<dyn Error>> {
    let bytes = hex::decode(input)?;
    hash_from_slice(&bytes).ok_or_else(|| format!("root must be 32 bytes, got {}", bytes.len()).into())
}

fn run(opt: Opt) -> Result<(), Box<dyn Error>> {
    if let Command::GenerateConfig { output } = &opt.cmd {
        Config::generate_default(output)?;
        info!("Configuration written to {:?}", output);
        return Ok(());
    }

    let mut config = match &opt.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(db_path) = opt.db_path {
        config.storage.db_path = db_path;
    }

    let store: Arc<dyn NodeStore> = Arc::new(RocksDBStore::with_config(&config.storage)?);
    let mut trie = MpfTrie::from_config(store.clone(), &config.trie);
    trie.set_root_hash(load_root(store.as_ref())?);

    match opt.cmd {
        Command::Put { key, value } => {
            trie.put(&decode_input(&key, opt.hex)?, &decode_input(&value, opt.hex)?)?;
            save_root(store.as_ref(), trie.root_hash())?;
            info!("Stored {}", key);
        }
        Command::Get { key } => match trie.get(&decode_input(&key, opt.hex)?)? {
            Some(value) => println!("{}", render_value(&value, opt.hex)),
            None => {
                error!("Key not found: {}", key);
                std::process::exit(2);
            }
        },
        Command::Delete { key } => {
            trie.delete(&decode_input(&key, opt.hex)?)?;
            save_root(store.as_ref(), trie.root_hash())?;
            info!("Deleted {}", key);
        }
        Command::Root => match trie.root_hash() {
            Some(root) => println!("{}", hex::encode(root)),
            None => println!("empty"),
        },
        Command::Prove { key, format } => {
            let wire = trie.get_proof_wire(&decode_input(&key, opt.hex)?)?;
            match format.as_str() {
                "hex" => println!("{}", hex::encode(&wire)),
                "json" => println!("{}", serde_json::to_string_pretty(&proof_to_json(&wire)?)?),
                "aiken" => println!("{}", proof_to_aiken(&wire)?),
                other => return Err(format!("unknown proof format: {}", other).into()),
            }
        }
        Command::Verify { key, proof, value, root } => {
            let expected = match root {
                Some(root) => Some(parse_root(&root)?),
                None => trie.root_hash(),
            };
            let value = match value {
                Some(v) => Some(decode_input(&v, opt.hex)?),
                None => None,
            };
            let wire = hex::decode(&proof)?;
            let valid = trie.verify_proof_wire(
                expected.as_ref(),
                &decode_input(&key, opt.hex)?,
                value.as_deref(),
                value.is_some(),
                &wire,
            );
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                std::process::exit(1);
            }
        }
        Command::Entries { limit, prefix } => {
            let entries = match prefix {
                Some(prefix) => trie.scan_by_prefix(&hex_prefix_to_bytes(&prefix)?, limit)?,
                None if limit > 0 => trie.get_entries(limit)?,
                None => trie.get_all_entries()?,
            };
            for entry in entries {
                let key = entry
                    .key
                    .map(|k| render_value(&k, opt.hex))
                    .unwrap_or_else(|| "-".to_string());
                println!("{} {} {}", hex::encode(&entry.path), key, render_value(&entry.value, opt.hex));
            }
        }
        Command::GenerateConfig { .. } => {}
    }

    Ok(())
}

fn main() {
    // Initialize logger
    init_logger();

    // Parse command line arguments
    let opt = Opt::from_args();

    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}
