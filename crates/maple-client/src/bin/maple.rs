//! MapleFile desktop agent CLI
//!
//! Exit codes: 0 on success, 1 on user error, 2 on remote failure.

use clap::{Parser, Subcommand};
use maple_client::{
    api::ApiClient,
    localdb::LocalStore,
    reconciler::Reconciler,
    session::{session_from_login, Keystore, Session},
    share, upload, ClientConfig, ClientError, UploadScheduler,
};
use maple_core::api::{CreateCollectionRequest, RegisterRequest, UpdateMeRequest};
use maple_core::{
    types::{CollectionType, PermissionLevel},
    Oid,
};
use maple_crypto::{aead, bundle::UserKeyBundle, envelope::WrappedKey, keys::SymmetricKey};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "maple")]
#[command(about = "End-to-end encrypted file sync")]
#[command(version)]
struct Cli {
    /// Service base URL
    #[arg(long, global = true, env = "MAPLE_SERVER_URL")]
    server: Option<String>,

    /// Data directory for the keystore and local database
    #[arg(long, global = true, env = "MAPLE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Account password (prefer --prompt-password on shared terminals)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Read the password from stdin
    #[arg(long, global = true)]
    prompt_password: bool,

    /// Enable debug logging
    #[arg(short, long, global = true, env = "MAPLE_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account; prints the recovery secret exactly once
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Request a login code by email
    Requestloginott {
        #[arg(long)]
        email: String,
    },
    /// Exchange a login code for a session
    Verifyloginott {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
    /// Refresh the session tokens (requires the password to unseal)
    Refreshtoken,
    /// Account profile
    Me {
        #[command(subcommand)]
        action: MeAction,
    },
    /// Folder and album operations
    Collections {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// File operations
    Files {
        #[command(subcommand)]
        action: FileAction,
    },
}

#[derive(Subcommand, Debug)]
enum MeAction {
    Get,
    Update {
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CollectionAction {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        parent: Option<Oid>,
        #[arg(long, default_value = "folder")]
        kind: String,
    },
    List,
    Share {
        #[arg(long)]
        id: Oid,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "read_only")]
        permission: String,
    },
    Delete {
        #[arg(long)]
        id: Oid,
    },
    Restore {
        #[arg(long)]
        id: Oid,
    },
    Move {
        #[arg(long)]
        id: Oid,
        #[arg(long)]
        parent: Option<Oid>,
    },
    Sync,
}

#[derive(Subcommand, Debug)]
enum FileAction {
    /// Encrypt and upload a file into a collection
    Add {
        #[arg(long)]
        collection: Oid,
        #[arg(long)]
        path: PathBuf,
    },
    /// Resume any interrupted uploads
    Upload,
    List {
        #[arg(long)]
        collection: Option<Oid>,
    },
    Download {
        #[arg(long)]
        id: Oid,
        #[arg(long)]
        out: PathBuf,
    },
    Delete {
        #[arg(long)]
        id: Oid,
    },
    /// Drop the local plaintext cache for a file
    Lock {
        #[arg(long)]
        id: Oid,
    },
    /// Re-cache the decrypted content locally
    Unlock {
        #[arg(long)]
        id: Oid,
    },
}

fn read_password(cli: &Cli) -> Result<String, ClientError> {
    if let Some(pw) = &cli.password {
        return Ok(pw.clone());
    }
    if cli.prompt_password {
        eprint!("password: ");
        std::io::stderr().flush().ok();
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(ClientError::Io)?;
        return Ok(line.trim_end_matches(['\r', '\n']).to_string());
    }
    Err(ClientError::NotLoggedIn(
        "this command needs --password or --prompt-password".to_string(),
    ))
}

fn config_from(cli: &Cli) -> ClientConfig {
    let mut config = match &cli.server {
        Some(url) => ClientConfig::new(url.clone()),
        None => ClientConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir.clone());
    }
    config
}

fn open_session(cli: &Cli, config: &ClientConfig) -> Result<Session, ClientError> {
    let saved = Keystore::new(config.keystore_path()).load()?;
    Session::unlock(saved, &read_password(cli)?)
}

fn permission_from(s: &str) -> Result<PermissionLevel, ClientError> {
    match s {
        "read_only" => Ok(PermissionLevel::ReadOnly),
        "read_write" => Ok(PermissionLevel::ReadWrite),
        "admin" => Ok(PermissionLevel::Admin),
        other => Err(ClientError::LocalState(format!(
            "unknown permission {other:?}; use read_only, read_write, or admin"
        ))),
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("maple_client={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: &Cli) -> Result<(), ClientError> {
    let config = config_from(cli);
    let keystore = Keystore::new(config.keystore_path());

    match &cli.command {
        Command::Register { email, name } => {
            let password = read_password(cli)?;
            let (bundle, recovery) = UserKeyBundle::generate(&password)?;
            let api = ApiClient::new(config.clone())?;
            let response = api
                .register(&RegisterRequest {
                    id: Oid::new(),
                    email: email.clone(),
                    name: name.clone(),
                    key_bundle: bundle,
                })
                .await?;

            println!("registered {} ({})", response.email, response.id);
            println!("verification id: {}", response.verification_id);
            println!("recovery secret (store it now, it will not be shown again):");
            println!("  {}", recovery.to_base64());
        }

        Command::Requestloginott { email } => {
            let api = ApiClient::new(config.clone())?;
            api.request_ott(email).await?;
            println!("login code sent to {email}");
        }

        Command::Verifyloginott { email, code } => {
            let password = read_password(cli)?;
            let api = ApiClient::new(config.clone())?;
            let login = api.verify_ott(email, code).await?;
            let saved = session_from_login(login, &password)?;
            keystore.save(&saved)?;
            println!("logged in as {} ({})", saved.email, saved.account_id);
        }

        Command::Refreshtoken => {
            let mut session = open_session(cli, &config)?;
            let api = ApiClient::new(config.clone())?;
            let grant = api.refresh_token(&session.saved.refresh_token).await?;
            session.apply_sealed_grant(&grant)?;
            keystore.save(&session.saved)?;
            println!(
                "tokens refreshed; access valid until {}",
                session.saved.access_expires_at
            );
        }

        Command::Me { action } => {
            let saved = keystore.load()?;
            let api = ApiClient::new(config.clone())?.with_token(saved.access_token.clone());
            match action {
                MeAction::Get => {
                    let me = api.me().await?;
                    println!("{} <{}>", me.name.as_deref().unwrap_or("(no name)"), me.email);
                    println!("id: {}", me.id);
                    println!("verification id: {}", me.key_bundle.verification_id);
                    if me.key_bundle.kdf_params_need_upgrade {
                        println!("note: KDF parameters need an upgrade; change your password to apply it");
                    }
                }
                MeAction::Update { name } => {
                    let me = api
                        .update_me(&UpdateMeRequest {
                            name: name.clone(),
                            key_bundle: None,
                        })
                        .await?;
                    println!("updated {}", me.email);
                }
            }
        }

        Command::Collections { action } => {
            run_collections(cli, &config, &keystore, action).await?;
        }

        Command::Files { action } => {
            run_files(cli, &config, &keystore, action).await?;
        }
    }
    Ok(())
}

async fn run_collections(
    cli: &Cli,
    config: &ClientConfig,
    keystore: &Keystore,
    action: &CollectionAction,
) -> Result<(), ClientError> {
    let saved = keystore.load()?;
    let api = ApiClient::new(config.clone())?.with_token(saved.access_token.clone());

    match action {
        CollectionAction::Create { name, parent, kind } => {
            let session = open_session(cli, config)?;
            let collection_type = match kind.as_str() {
                "folder" => CollectionType::Folder,
                "album" => CollectionType::Album,
                other => {
                    return Err(ClientError::LocalState(format!(
                        "unknown collection type {other:?}"
                    )))
                }
            };

            let collection_key = SymmetricKey::generate();
            let encrypted_name = aead::encrypt_string_field(&collection_key, name.as_bytes())?;
            let encrypted_collection_key =
                WrappedKey::wrap(&collection_key, session.keys().master_key(), 1)?;

            let created = api
                .create_collection(&CreateCollectionRequest {
                    id: Oid::new(),
                    parent_id: *parent,
                    collection_type,
                    encrypted_name,
                    encrypted_collection_key,
                })
                .await?;

            let mut local = LocalStore::open(config.localdb_path())?;
            local.upsert_collection(maple_client::localdb::LocalCollection {
                id: created.id,
                version: created.version,
                state: created.state,
                parent_id: created.parent_id,
                name: Some(name.clone()),
                encrypted_collection_key: created.encrypted_collection_key.clone(),
            });
            local.save()?;
            println!("created collection {}", created.id);
        }

        CollectionAction::List => {
            let local = LocalStore::open(config.localdb_path())?;
            let listing = api.list_collections().await?;
            for (label, group) in [("owned", &listing.owned), ("shared", &listing.shared)] {
                for c in group {
                    let name = local
                        .collection(c.id)
                        .and_then(|l| l.name.clone())
                        .unwrap_or_else(|| "(locked)".to_string());
                    println!("{}  {:30}  {}  v{}", c.id, name, label, c.version);
                }
            }
        }

        CollectionAction::Share { id, email, permission } => {
            let session = open_session(cli, config)?;
            let level = permission_from(permission)?;
            let updated = share::share_collection(&api, &session, *id, email, level).await?;
            println!("shared {} with {} ({} members)", id, email, updated.members.len());
        }

        CollectionAction::Delete { id } => {
            let response = api.delete_collection(*id).await?;
            // Keep the local rows (name + key envelope) so a restore
            // within the tombstone window can re-supply the ciphertext.
            let mut local = LocalStore::open(config.localdb_path())?;
            for deleted in &response.deleted {
                if let Some(cached) = local.collection(*deleted).cloned() {
                    local.upsert_collection(maple_client::localdb::LocalCollection {
                        state: maple_core::types::CollectionState::Deleted,
                        ..cached
                    });
                }
            }
            local.save()?;
            println!("deleted {} collection(s)", response.deleted.len());
        }

        CollectionAction::Restore { id } => {
            // Soft delete stripped the ciphertext; re-supply the original
            // key envelope and the re-encrypted name from the local cache.
            // Files inside are wrapped under that key, so a fresh key
            // would orphan them.
            let session = open_session(cli, config)?;
            let local = LocalStore::open(config.localdb_path())?;
            let cached = local.collection(*id);
            let request = match cached.and_then(|c| c.encrypted_collection_key.clone()) {
                Some(envelope) => {
                    let collection_key = maple_crypto::open_collection_key_as_owner(
                        &envelope,
                        session.keys().master_key(),
                    )?;
                    let encrypted_name = cached
                        .and_then(|c| c.name.as_deref())
                        .map(|name| aead::encrypt_string_field(&collection_key, name.as_bytes()))
                        .transpose()?;
                    maple_core::api::RestoreCollectionRequest {
                        encrypted_name,
                        encrypted_collection_key: Some(envelope),
                    }
                }
                None => maple_core::api::RestoreCollectionRequest::default(),
            };
            let restored = api.restore_collection(*id, &request).await?;
            println!("restored {} (v{})", restored.id, restored.version);
        }

        CollectionAction::Move { id, parent } => {
            let updated_ancestor_ids = match parent {
                Some(p) => {
                    let parent_record = api.get_collection(*p).await?;
                    let mut path = parent_record.ancestor_ids.clone();
                    path.push(*p);
                    path
                }
                None => Vec::new(),
            };
            let moved = api
                .move_collection(
                    *id,
                    &maple_core::api::MoveCollectionRequest {
                        new_parent_id: *parent,
                        updated_ancestor_ids,
                        updated_path_segments: Vec::new(),
                    },
                )
                .await?;
            println!("moved {} under {:?}", moved.id, moved.parent_id);
        }

        CollectionAction::Sync => {
            let session = open_session(cli, config)?;
            let mut local = LocalStore::open(config.localdb_path())?;
            let mut reconciler = Reconciler::new(&api, &session);

            let collections = reconciler.sync_collections(&mut local).await?;
            let files = reconciler.sync_files(&mut local).await?;
            println!(
                "collections: {} fetched, {} deleted; files: {} fetched, {} deleted",
                collections.fetched, collections.deleted, files.fetched, files.deleted
            );
            if !collections.to_upload.is_empty() || !files.to_upload.is_empty() {
                println!(
                    "{} local change(s) pending upload",
                    collections.to_upload.len() + files.to_upload.len()
                );
            }
        }
    }
    Ok(())
}

async fn run_files(
    cli: &Cli,
    config: &ClientConfig,
    keystore: &Keystore,
    action: &FileAction,
) -> Result<(), ClientError> {
    let saved = keystore.load()?;
    let api = ApiClient::new(config.clone())?.with_token(saved.access_token.clone());

    match action {
        FileAction::Add { collection, path } => {
            let session = open_session(cli, config)?;
            let mut local = LocalStore::open(config.localdb_path())?;

            let record = api.get_collection(*collection).await?;
            let collection_key = share::open_collection_key(&session, &record)?;
            let plaintext = std::fs::read(path)?;
            let now = chrono::Utc::now();
            let metadata = upload::FileMetadata {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unnamed".to_string()),
                mime_type: "application/octet-stream".to_string(),
                size: plaintext.len() as u64,
                created: now,
                modified: now,
            };

            let scheduler = UploadScheduler::default();
            let file_id = scheduler
                .upload(
                    &api,
                    &mut local,
                    *collection,
                    &collection_key,
                    metadata,
                    &plaintext,
                    path.clone(),
                )
                .await?;
            println!("uploaded {} as {}", path.display(), file_id);
        }

        FileAction::Upload => {
            let session = open_session(cli, config)?;
            let mut local = LocalStore::open(config.localdb_path())?;
            let intents: Vec<_> = local.upload_intents().to_vec();
            if intents.is_empty() {
                println!("nothing to resume");
                return Ok(());
            }

            let scheduler = UploadScheduler::default();
            for intent in intents {
                let record = api.get_collection(intent.collection_id).await?;
                let collection_key = share::open_collection_key(&session, &record)?;
                let plaintext = std::fs::read(&intent.source_path)?;
                let now = chrono::Utc::now();
                let metadata = upload::FileMetadata {
                    name: intent
                        .source_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "unnamed".to_string()),
                    mime_type: "application/octet-stream".to_string(),
                    size: plaintext.len() as u64,
                    created: now,
                    modified: now,
                };
                // The old pending record may have been garbage-collected;
                // a fresh id keeps the retry clean.
                local.pop_upload_intent(intent.file_id);
                let file_id = scheduler
                    .upload(
                        &api,
                        &mut local,
                        intent.collection_id,
                        &collection_key,
                        metadata,
                        &plaintext,
                        intent.source_path.clone(),
                    )
                    .await?;
                println!("resumed {} as {}", intent.source_path.display(), file_id);
            }
        }

        FileAction::List { collection } => {
            let local = LocalStore::open(config.localdb_path())?;
            let listing = api.list_files(*collection).await?;
            for f in &listing.files {
                let name = local
                    .file(f.id)
                    .and_then(|l| l.name.clone())
                    .unwrap_or_else(|| "(locked)".to_string());
                println!("{}  {:30}  {} bytes  v{}", f.id, name, f.encrypted_file_size, f.version);
            }
        }

        FileAction::Download { id, out } => {
            let session = open_session(cli, config)?;
            let record = api.get_file(*id).await?;
            let collection = api.get_collection(record.collection_id).await?;
            let collection_key = share::open_collection_key(&session, &collection)?;
            let file_key = maple_crypto::open_file_key(&record.encrypted_file_key, &collection_key)?;

            let urls = api.download_url(*id).await?;
            let ciphertext = api.get_presigned(&urls.download_url).await?;
            let plaintext = upload::decrypt_download(&file_key, &ciphertext)?;
            std::fs::write(out, &plaintext)?;
            println!("downloaded {} bytes to {}", plaintext.len(), out.display());
        }

        FileAction::Delete { id } => {
            let deleted = api.delete_file(*id).await?;
            let mut local = LocalStore::open(config.localdb_path())?;
            local.remove_file(*id);
            local.save()?;
            println!("deleted {} (tombstone v{})", deleted.id, deleted.tombstone_version);
        }

        FileAction::Lock { id } => {
            let mut local = LocalStore::open(config.localdb_path())?;
            let file = local
                .file_mut(*id)
                .ok_or_else(|| ClientError::LocalState(format!("file {id} is not known locally")))?;
            if let Some(path) = file.plaintext_path.take() {
                std::fs::remove_file(&path).ok();
            }
            file.locked = true;
            file.name = None;
            local.save()?;
            println!("locked {id}");
        }

        FileAction::Unlock { id } => {
            let session = open_session(cli, config)?;
            let record = api.get_file(*id).await?;
            let collection = api.get_collection(record.collection_id).await?;
            let collection_key = share::open_collection_key(&session, &collection)?;
            let file_key = maple_crypto::open_file_key(&record.encrypted_file_key, &collection_key)?;

            let metadata_json = aead::decrypt_string_field(&file_key, &record.encrypted_metadata)?;
            let metadata: upload::FileMetadata = serde_json::from_slice(&metadata_json)?;

            let urls = api.download_url(*id).await?;
            let ciphertext = api.get_presigned(&urls.download_url).await?;
            let plaintext = upload::decrypt_download(&file_key, &ciphertext)?;

            let cache_dir = config.data_dir.join("cache");
            std::fs::create_dir_all(&cache_dir)?;
            let cache_path = cache_dir.join(id.to_hex());
            std::fs::write(&cache_path, &plaintext)?;

            let mut local = LocalStore::open(config.localdb_path())?;
            local.upsert_file(maple_client::localdb::LocalFile {
                id: *id,
                collection_id: record.collection_id,
                version: record.version,
                state: record.state,
                name: Some(metadata.name),
                locked: false,
                plaintext_path: Some(cache_path),
            });
            local.save()?;
            println!("unlocked {id}");
        }
    }
    Ok(())
}
