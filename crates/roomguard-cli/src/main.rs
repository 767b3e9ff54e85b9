use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roomguard_core::MatchStrategy;
use roomguard_hw::Camera;
use roomguard_store::{IdentityStore, JsonFileStore, SqliteStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod keys;
mod overlay;
mod session;

use config::{Config, StorageBackend};
use keys::StdinKeys;
use overlay::{Display, LogDisplay, SnapshotDisplay};
use session::{EnrollOptions, EnrollOutcome, LocalHardware, MonitorOptions};

#[derive(Parser)]
#[command(name = "roomguard", about = "Face-authorized room monitoring")]
struct Cli {
    /// Camera device, overrides ROOMGUARD_CAMERA_DEVICE
    #[arg(long, global = true)]
    device: Option<String>,
    /// Identity storage backend
    #[arg(long, global = true, value_parser = parse_storage)]
    storage: Option<StorageBackend>,
    /// Descriptor comparison strategy
    #[arg(long, global = true, value_parser = parse_strategy)]
    strategy: Option<MatchStrategy>,
    /// Maximum accepted distance for the active strategy
    #[arg(long, global = true)]
    tolerance: Option<f32>,
    /// Write each annotated frame to this PNG
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture and store an authorized face
    Enroll {
        /// Name for the enrolled user (SQLite only; the JSON file holds one face)
        #[arg(short, long, default_value = "authorized")]
        name: String,
        /// Grant the new user access to this room
        #[arg(long)]
        room: Option<i64>,
    },
    /// Watch the camera and flag unauthorized faces
    Monitor {
        /// Only accept users permitted in this room, using its camera
        #[arg(long)]
        room: Option<i64>,
    },
    /// List enrolled users
    Users,
    /// Delete a user and their room permissions
    Remove {
        /// User ID to remove
        id: i64,
    },
    /// Stop accepting a user without deleting them
    Deactivate { id: i64 },
    /// Accept a previously deactivated user again
    Activate { id: i64 },
    /// List rooms
    Rooms,
    /// Register a room and its camera index
    AddRoom {
        name: String,
        /// V4L2 index, monitored as /dev/video<N>
        #[arg(long)]
        camera: i64,
    },
    /// Permit a user in a room
    Grant { user: i64, room: i64 },
    /// Print resolved configuration and enrollment state
    Status,
    /// List V4L2 capture devices
    Devices,
}

fn parse_storage(s: &str) -> Result<StorageBackend, String> {
    match s.to_ascii_lowercase().as_str() {
        "json" => Ok(StorageBackend::Json),
        "sqlite" => Ok(StorageBackend::Sqlite),
        other => Err(format!("unknown storage backend '{other}' (json, sqlite)")),
    }
}

fn parse_strategy(s: &str) -> Result<MatchStrategy, String> {
    match s.to_ascii_lowercase().as_str() {
        "embedding" => Ok(MatchStrategy::Embedding),
        "landmark" => Ok(MatchStrategy::Landmark),
        other => Err(format!("unknown strategy '{other}' (embedding, landmark)")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;
    if cli.device.is_some() {
        config.camera_device = cli.device;
    }
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(tolerance) = cli.tolerance {
        match config.strategy {
            MatchStrategy::Embedding => config.embedding_tolerance = tolerance,
            MatchStrategy::Landmark => config.landmark_threshold = tolerance,
        }
    }
    if cli.snapshot.is_some() {
        config.snapshot_path = cli.snapshot;
    }

    match cli.command {
        Commands::Enroll { name, room } => enroll(&config, name, room),
        Commands::Monitor { room } => monitor(&config, room),
        Commands::Users => {
            let store = open_sqlite(&config)?;
            let users = store.list_users()?;
            if users.is_empty() {
                println!("No users enrolled");
            }
            for u in users {
                let kind = u.kind.map_or("unreadable".to_string(), |k| format!("{k:?}").to_lowercase());
                let state = if u.is_active { "active" } else { "inactive" };
                println!("{:>4}  {:<20} {state:<8} {kind}/{}  {}", u.id, u.name, u.components, u.created_at);
            }
            Ok(())
        }
        Commands::Remove { id } => {
            open_sqlite(&config)?.remove_user(id)?;
            println!("Removed user {id}");
            Ok(())
        }
        Commands::Deactivate { id } => {
            open_sqlite(&config)?.set_active(id, false)?;
            println!("Deactivated user {id}");
            Ok(())
        }
        Commands::Activate { id } => {
            open_sqlite(&config)?.set_active(id, true)?;
            println!("Activated user {id}");
            Ok(())
        }
        Commands::Rooms => {
            for r in open_sqlite(&config)?.list_rooms()? {
                println!("{:>4}  {:<20} /dev/video{}", r.id, r.name, r.camera_id);
            }
            Ok(())
        }
        Commands::AddRoom { name, camera } => {
            let room = open_sqlite(&config)?.add_room(&name, camera)?;
            println!("Added room {} ({})", room.id, room.name);
            Ok(())
        }
        Commands::Grant { user, room } => {
            open_sqlite(&config)?.grant(user, room)?;
            println!("User {user} may enter room {room}");
            Ok(())
        }
        Commands::Status => status(&config),
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({})", d.path, d.name, d.driver);
            }
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<Box<dyn IdentityStore>> {
    Ok(match config.storage {
        StorageBackend::Json => Box::new(JsonFileStore::new(&config.json_path)),
        StorageBackend::Sqlite => Box::new(open_sqlite(config)?),
    })
}

fn open_sqlite(config: &Config) -> Result<SqliteStore> {
    if config.storage != StorageBackend::Sqlite {
        bail!("this command needs the sqlite backend (set ROOMGUARD_STORAGE=sqlite or pass --storage sqlite)");
    }
    SqliteStore::open(&config.db_path).with_context(|| format!("opening {}", config.db_path.display()))
}

fn display(config: &Config) -> Box<dyn Display> {
    match &config.snapshot_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "writing annotated frames");
            Box::new(SnapshotDisplay::new(path))
        }
        None => Box::new(LogDisplay),
    }
}

fn hardware(config: &Config, camera_device: String) -> LocalHardware {
    LocalHardware {
        camera_device,
        width: config.camera_width,
        height: config.camera_height,
        warmup_frames: config.warmup_frames,
        model_dir: config.model_dir.clone(),
        kind: config.descriptor_kind(),
    }
}

fn enroll(config: &Config, name: String, room: Option<i64>) -> Result<()> {
    let mut store = open_store(config)?;
    let mut hw = hardware(config, config.capture_device(None));
    let mut keys = StdinKeys::spawn().context("starting key reader")?;
    let mut display = display(config);

    let outcome = session::run_enroll(
        store.as_mut(),
        &mut hw,
        display.as_mut(),
        &mut keys,
        &EnrollOptions { name, room },
    )?;

    match outcome {
        EnrollOutcome::Enrolled(identity) => {
            println!("Enrolled '{}' in {}", identity.name, store.location());
        }
        EnrollOutcome::Cancelled => println!("Enrollment cancelled, nothing saved"),
    }
    Ok(())
}

fn monitor(config: &Config, room: Option<i64>) -> Result<()> {
    let store = open_store(config)?;

    let device = match room {
        Some(room_id) => {
            let Some(r) = open_sqlite(config)?.room(room_id)? else {
                bail!("unknown room {room_id}");
            };
            let device = config.capture_device(Some(r.camera_id));
            tracing::info!(room = %r.name, device = %device, "monitoring room");
            device
        }
        None => config.capture_device(None),
    };

    let matcher = config.strategy.matcher(config.landmark_layout);
    let mut hw = hardware(config, device);
    let mut keys = StdinKeys::spawn().context("starting key reader")?;
    let mut display = display(config);

    let summary = session::run_monitor(
        store.as_ref(),
        &mut hw,
        matcher.as_ref(),
        display.as_mut(),
        &mut keys,
        &MonitorOptions {
            room,
            tolerance: config.tolerance(),
        },
    )?;

    println!(
        "{} frames, {} authorized and {} unauthorized sightings, {} frame errors",
        summary.frames, summary.authorized_sightings, summary.unauthorized_sightings, summary.errors
    );
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let enrolled = match config.storage {
        StorageBackend::Json => serde_json::json!({
            "path": config.json_path,
            "enrolled": JsonFileStore::new(&config.json_path).exists(),
        }),
        StorageBackend::Sqlite => {
            let store = open_sqlite(config)?;
            let users = store.list_users()?;
            serde_json::json!({
                "path": config.db_path,
                "users": users.len(),
                "active": users.iter().filter(|u| u.is_active).count(),
                "rooms": store.list_rooms()?,
            })
        }
    };
    let report = serde_json::json!({
        "config": config,
        "tolerance": config.tolerance(),
        "store": enrolled,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
