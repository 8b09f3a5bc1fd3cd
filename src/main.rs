use anyhow::{Context, Result};
use axum::{Extension, Router};
use std::{path::Path, sync::Arc};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatdj::{
    config::Config,
    controller::Controller,
    dispatch,
    engine::{ClockPlayer, CommandPlayer, Deck, Player},
    facade::{self, QueueFacade},
    metadata::YouTubeApi,
    publish::{FileUploadHost, HasteHost, TextPublisher},
    routes::{self, ws::{HubTransport, JwtSecret}},
    state::{ChatHub, Hub, UserSet},
    store::{self, FileStore, SqliteStore, Store, SUBSCRIBERS_KEY},
    utils::jwt,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::var("CHATDJ_CONFIG").unwrap_or_else(|_| "config.json".into());
    let cfg = Config::load(Path::new(&path))?.apply_env();
    cfg.validate()?;

    // `chatdj token <nick>` prints a chat token and exits
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("token") {
        let nick = args.next().context("usage: chatdj token <nick>")?;
        println!("{}", jwt::sign(&nick, &cfg.jwt_secret)?);
        return Ok(());
    }

    let store: Arc<dyn Store> = match &cfg.database_url {
        Some(url) => Arc::new(SqliteStore::open(url).await.context("open database")?),
        None      => Arc::new(FileStore::open(&cfg.data_dir).await.context("open data dir")?),
    };
    let seed = facade::load_snapshot(store.as_ref()).await;
    let subscribers: Vec<String> =
        store::load_json(store.as_ref(), SUBSCRIBERS_KEY).await.unwrap_or_default();
    info!("loaded user list with {} entries", subscribers.len());

    let deck = Arc::new(Deck::new(seed));
    let hub: Hub = Arc::new(ChatHub::default());
    let transport = Arc::new(HubTransport::new(hub.clone(), &cfg.bot_nick));
    let (notifier, dispatcher) =
        dispatch::channel(transport, cfg.dispatch_capacity, cfg.send_interval());

    let http = reqwest::Client::new();
    let publisher = TextPublisher::new(
        Arc::new(HasteHost::new(http.clone(), &cfg.haste_url)),
        Arc::new(FileUploadHost::new(http.clone(), &cfg.fallback_url)),
        cfg.publish_deadline(),
        std::env::temp_dir(),
    );
    let metadata = Arc::new(YouTubeApi::new(http, &cfg.api_base, &cfg.api_key));

    let ctl = Arc::new(Controller::new(
        QueueFacade::new(deck.clone(), store.clone()),
        store,
        metadata,
        publisher,
        notifier,
        UserSet::new(subscribers),
        &cfg,
    ));

    let player: Arc<dyn Player> = match &cfg.player_command {
        Some(argv) => Arc::new(CommandPlayer::new(argv.clone(), cfg.rtmp.clone())?),
        None       => Arc::new(ClockPlayer),
    };
    let (events_tx, events_rx) = mpsc::channel(16);

    tokio::spawn(dispatcher.run());
    tokio::spawn(ctl.clone().run_events(events_rx));
    tokio::spawn(deck.run(player, events_tx));

    let app = Router::new()
        .merge(routes::router())
        .layer(Extension(hub))
        .layer(Extension(ctl))
        .layer(Extension(JwtSecret(cfg.jwt_secret.clone())));

    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!("listening on {}", cfg.bind);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
