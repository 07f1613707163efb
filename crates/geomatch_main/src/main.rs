use clap::Parser;
use geomatch_core::config::BusBackend;
use geomatch_core::db::{
    self, SurrealBus, SurrealGeoIndex, SurrealProfileRepository, SurrealSessionStore,
};
use geomatch_core::render::CardRenderer;
use geomatch_core::{
    ChatTransport, GeoIndex, GeomatchConfig, InProcessBus, MatchDispatcher, MemoryGeoIndex,
    MemoryProfileRepository, MemorySessionStore, ProfileRepository, RequestBus, SessionStore,
    UpdateHandler,
};
use geomatch_discord::{DiscordTransport, run_discord_bot};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "geomatch")]
#[command(about = "Location-based matchmaking bot for Discord", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Directory for the daily log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

struct Backends {
    sessions: Arc<dyn SessionStore>,
    geo: Arc<dyn GeoIndex>,
    profiles: Arc<dyn ProfileRepository>,
    bus: Arc<dyn RequestBus>,
}

fn init_logging(debug: bool, log_dir: &Path) {
    let filter = if debug {
        EnvFilter::new(
            "geomatch_core=debug,geomatch_discord=debug,geomatch=debug,serenity=info,warn",
        )
    } else {
        EnvFilter::new("geomatch_core=info,geomatch_discord=info,geomatch=info,warn")
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, "geomatch.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // the guard flushes on drop, so it has to live as long as the process
    Box::leak(Box::new(guard));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_timer(LocalTime::rfc_3339())
                .compact(),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339()),
        )
        .init();
}

async fn open_backends(config: &GeomatchConfig) -> Result<Backends> {
    if config.database.is_memory() {
        info!("Using in-process stores; nothing survives a restart");
        let bus: Arc<dyn RequestBus> =
            Arc::new(InProcessBus::new(config.bus.topic.clone(), config.bus.capacity));
        return Ok(Backends {
            sessions: Arc::new(MemorySessionStore::new()),
            geo: Arc::new(MemoryGeoIndex::new()),
            profiles: Arc::new(MemoryProfileRepository::new()),
            bus,
        });
    }

    let db = db::client::connect(&config.database).await?;

    let bus: Arc<dyn RequestBus> = match config.bus.backend {
        BusBackend::InProcess => Arc::new(InProcessBus::new(
            config.bus.topic.clone(),
            config.bus.capacity,
        )),
        BusBackend::Surreal => Arc::new(SurrealBus::new(db.clone(), config.bus.topic.clone())),
    };

    Ok(Backends {
        sessions: Arc::new(SurrealSessionStore::new(db.clone())),
        geo: Arc::new(SurrealGeoIndex::new(db.clone())),
        profiles: Arc::new(SurrealProfileRepository::new(db)),
        bus,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .with_cause_chain()
                .color(true)
                .build(),
        )
    }))?;
    miette::set_panic_hook();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.log_dir).into_diagnostic()?;
    init_logging(cli.debug, &cli.log_dir);

    let config = GeomatchConfig::load(cli.config.as_deref()).await?;
    config.validate()?;
    info!(
        "Starting geomatch (prefix '{}', bus topic '{}')",
        config.discord.prefix, config.bus.topic
    );

    let backends = open_backends(&config).await?;
    let transport: Arc<dyn ChatTransport> =
        Arc::new(DiscordTransport::new(&config.discord.token));

    let dispatcher = MatchDispatcher::new(
        backends.bus.clone(),
        backends.geo.clone(),
        CardRenderer::new(backends.profiles.clone(), transport.clone()),
        config.matching.dispatch_radius_km,
    );
    tokio::spawn(async move {
        if let Err(e) = dispatcher.run().await {
            geomatch_core::log_error!("Match dispatcher stopped", e);
        }
    });

    let handler = UpdateHandler::builder(
        backends.sessions,
        backends.geo,
        backends.bus,
        backends.profiles,
        transport,
    )
    .with_prefix(config.discord.prefix.clone())
    .with_menu_style(config.menu.style)
    .with_on_demand_radius(config.matching.on_demand_radius_km)
    .build();

    run_discord_bot(&config.discord, Arc::new(handler)).await?;
    Ok(())
}
