use anyhow::Context;
use clap::{
    ArgGroup,
    Parser,
};
use grapehub::{
    app::{
        App,
        RunState,
        actix_query_api::ActixQueryApi,
        in_memory_player_storage::InMemoryPlayerStorage,
        init_tracing,
        player_storage::PlayerStorage,
        sled_storage::SledPlayerStorage,
    },
    hub::GrapeHub,
    registry::DeathGrapeSource,
};
use settings::{
    HubEnv,
    SettingsStore,
};
use std::{
    env::current_dir,
    fs,
    path::PathBuf,
    sync::Arc,
};

const DEFAULT_PORT: u16 = 8080;

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    group(
        ArgGroup::new("env")
            .args(["local", "dev", "test"])
            .required(true)
    ),
    group(
        ArgGroup::new("draws")
            .args(["death_grape", "seed"])
    )
)]
struct Args {
    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long, default_value = "false", conflicts_with = "data_dir")]
    in_memory: bool,

    #[arg(long)]
    reward_per_grape: Option<u64>,

    /// Give every new player this death grape. Local play only.
    #[arg(long)]
    death_grape: Option<u32>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long, default_value = "false")]
    tracing: bool,

    #[arg(long, requires = "tracing")]
    log_dir: Option<PathBuf>,

    #[arg(long)]
    local: bool,

    #[arg(long)]
    dev: bool,

    #[arg(long)]
    test: bool,
}

async fn handle_interupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

async fn serve<S: PlayerStorage>(hub: GrapeHub<S>, port: u16) -> anyhow::Result<()> {
    let api = ActixQueryApi::new(Some(port)).await?;
    let mut app = App::new(api, hub);

    tracing::info!("Starting grapehub service");
    loop {
        let interrupt = handle_interupt();
        match app.run(interrupt).await? {
            RunState::Continue => continue,
            RunState::Exit => {
                tracing::info!("Exiting grapehub service");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = if args.tracing {
        init_tracing(args.log_dir.as_deref())
    } else {
        None
    };
    let env = if args.local {
        HubEnv::Local
    } else if args.dev {
        HubEnv::Dev
    } else {
        HubEnv::Test
    };

    let store = SettingsStore::new(env).context("opening settings store")?;
    let mut settings = store.load_or_default().context("loading settings")?;
    if let Some(reward) = args.reward_per_grape {
        settings.rules.reward_per_grape = reward;
    }
    settings
        .rules
        .validate()
        .context("validating game rules")?;
    tracing::info!(
        "Using {} rules from {}: reward {} per grape, death grape in {:?}",
        env,
        store.path().display(),
        settings.rules.reward_per_grape,
        settings.rules.death_grape_range()
    );

    let death_grapes = match (args.death_grape, args.seed) {
        (Some(fixed), _) => {
            tracing::warn!("Every new player will die on grape {}", fixed);
            DeathGrapeSource::Fixed(fixed)
        }
        (None, Some(seed)) => DeathGrapeSource::seeded(seed),
        (None, None) => DeathGrapeSource::Random,
    };
    let port = args.port.unwrap_or(DEFAULT_PORT);

    if args.in_memory {
        tracing::info!("Using in-memory player storage; nothing survives a restart");
        let storage = Arc::new(InMemoryPlayerStorage::new());
        return serve(GrapeHub::new(storage, &settings, death_grapes), port).await;
    }

    let storage_path = match &args.data_dir {
        Some(path) => path.clone(),
        None => current_dir()
            .context("determine process working directory")?
            .join("grapehub_data")
            .join(env.dir_name()),
    };
    fs::create_dir_all(&storage_path).with_context(|| {
        format!("failed to create storage directory {}", storage_path.display())
    })?;
    tracing::info!("Using sled storage directory {}", storage_path.display());

    let storage = Arc::new(SledPlayerStorage::open(&storage_path)?);
    serve(GrapeHub::new(storage, &settings, death_grapes), port).await
}
