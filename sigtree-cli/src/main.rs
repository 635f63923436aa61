use clap::{Parser, Subcommand};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sigtree_auth::{signer_address, Authorizer, DomainSeparator, ORDER_CLAIM_TYPE};
use sigtree_hash::keccak256;
use sigtree_merkle::{verify_proof, MerkleTree};
use std::{fs, path::PathBuf};

#[derive(Parser)]
#[command(name = "sigtree", version, about = "Sorted-pair Merkle commitments with signed roots")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::Args)]
struct DomainArgs {
    /// Scheme name bound into the domain separator
    #[arg(long, default_value = "sigtree")]
    domain_name: String,
    /// Scheme version bound into the domain separator
    #[arg(long, default_value = "1")]
    domain_version: String,
    /// Verifying-context identity, 32 bytes hex
    #[arg(long, default_value = "0000000000000000000000000000000000000000000000000000000000000000")]
    context: String,
}

impl DomainArgs {
    fn separator(&self) -> DomainSeparator {
        let ctx = decode_fixed::<32>(&self.context, "context");
        DomainSeparator::new(&self.domain_name, &self.domain_version, &ctx)
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Build a tree from hex messages (one per line) and write root + proofs
    Build {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "bundle.bin")]
        out: PathBuf,
    },
    /// Print the sibling path for one message of a batch
    Prove {
        #[arg(long)]
        input: PathBuf,
        /// Message hex
        #[arg(long)]
        message: String,
    },
    /// Check one leaf / path / root triple
    Verify {
        /// Leaf hex
        #[arg(long)]
        leaf: String,
        /// Sibling hex, repeated in leaf-to-root order
        #[arg(long = "sibling")]
        siblings: Vec<String>,
        /// Root hex
        #[arg(long)]
        root: String,
    },
    /// Generate a secp256k1 keypair
    Keygen {},
    /// Sign the domain-separated digest of a root
    SignRoot {
        /// Signing key, 32 bytes hex
        #[arg(long)]
        key: String,
        /// Root hex
        #[arg(long)]
        root: String,
        #[command(flatten)]
        domain: DomainArgs,
    },
    /// Full composite check for one order claim
    Authorize {
        /// Order id, 32 bytes hex
        #[arg(long)]
        order: String,
        /// Account, 20 bytes hex
        #[arg(long)]
        account: String,
        /// Sibling hex, repeated in leaf-to-root order
        #[arg(long = "sibling")]
        siblings: Vec<String>,
        /// Root hex
        #[arg(long)]
        root: String,
        /// Signature over the root digest, 65 bytes hex
        #[arg(long)]
        signature: String,
        /// Expected signer address, 20 bytes hex
        #[arg(long)]
        signer: String,
        #[command(flatten)]
        domain: DomainArgs,
    },
}

#[derive(Serialize, Deserialize)]
struct BundleEntry {
    message: Vec<u8>,
    path: Vec<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct ProofBundle {
    root: Vec<u8>,
    entries: Vec<BundleEntry>,
}

fn main() {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Build { input, out } => {
            let messages = read_messages(&input);
            let mt = MerkleTree::build(&messages).expect("build tree");
            let root = mt.root().expect("root");
            let entries = messages
                .iter()
                .map(|m| BundleEntry {
                    message: m.clone(),
                    path: mt.proof(m).expect("proof"),
                })
                .collect();
            let bundle = ProofBundle { root: root.clone(), entries };
            let mut f = fs::File::create(&out).expect("create");
            bincode::serialize_into(&mut f, &bundle).expect("encode");
            println!("root={}", hex::encode(&root));
            println!("wrote {}", out.display());
        }
        Cmd::Prove { input, message } => {
            let messages = read_messages(&input);
            let mt = MerkleTree::build(&messages).expect("build tree");
            let target = hex::decode(message.trim()).expect("message hex");
            let path = mt.proof(&target).expect("proof");
            for sib in &path {
                println!("{}", hex::encode(sib));
            }
        }
        Cmd::Verify { leaf, siblings, root } => {
            let leaf = hex::decode(leaf.trim()).expect("leaf hex");
            let root = hex::decode(root.trim()).expect("root hex");
            let path: Vec<Vec<u8>> = siblings
                .iter()
                .map(|s| hex::decode(s.trim()).expect("sibling hex"))
                .collect();
            let ok = verify_proof(&leaf, &path, &root);
            println!("{}", if ok { "valid" } else { "invalid" });
        }
        Cmd::Keygen {} => {
            let key = SigningKey::random(&mut OsRng);
            let addr = signer_address(key.verifying_key());
            println!("sk={}", hex::encode(key.to_bytes()));
            println!("address={}", hex::encode(addr));
        }
        Cmd::SignRoot { key, root, domain } => {
            let key_bytes = decode_fixed::<32>(&key, "key");
            let key = SigningKey::from_slice(&key_bytes).expect("signing key");
            let root = hex::decode(root.trim()).expect("root hex");
            let auth = Authorizer::new(domain.separator());
            let sig = auth.sign_root(&key, &root).expect("sign");
            println!("{}", hex::encode(sig.to_bytes()));
        }
        Cmd::Authorize { order, account, siblings, root, signature, signer, domain } => {
            let order = decode_fixed::<32>(&order, "order");
            let account = decode_fixed::<20>(&account, "account");
            let signer = decode_fixed::<20>(&signer, "signer");
            let root = hex::decode(root.trim()).expect("root hex");
            let signature = hex::decode(signature.trim()).expect("signature hex");
            let path: Vec<Vec<u8>> = siblings
                .iter()
                .map(|s| hex::decode(s.trim()).expect("sibling hex"))
                .collect();
            let auth = Authorizer::new(domain.separator());
            let type_hash = keccak256(ORDER_CLAIM_TYPE);
            match auth.authorize(&type_hash, &[&order, &account], &path, &root, &signature, &signer) {
                Ok(()) => println!("authorized"),
                Err(e) => {
                    eprintln!("rejected: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn read_messages(path: &PathBuf) -> Vec<Vec<u8>> {
    let text = fs::read_to_string(path).expect("read input");
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| hex::decode(l).expect("message hex"))
        .collect()
}

fn decode_fixed<const N: usize>(hex_str: &str, what: &str) -> [u8; N] {
    let bytes = hex::decode(hex_str.trim()).expect(what);
    assert_eq!(bytes.len(), N, "{} must be {} bytes", what, N);
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    out
}
