use std::io::Stdout;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use music_client::action::{Tab, UiEvent};
use music_client::app::App;
use music_client::batch::DownloadMode;
use music_client::cli::{self, Args, Command, Renderer, SongPick};
use music_client::http::HttpTransport;
use music_client::sink::DirectorySink;
use music_proto::config::Config;
use music_proto::platform;
use music_proto::protocol::{QrState, LOGIN_PLATFORMS};
use music_proto::providers;
use music_proto::songs::{Playlist, Song};
use music_proto::state::PreferenceStore;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// When a command that started background work is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Follow {
    /// Until interrupted.
    Interrupt,
    /// Until the login dialog closes or its session failed.
    Login,
    /// Until no server-side download is active.
    Downloads,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("musiclib.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG overrides; connection-level noise from the HTTP stack stays off
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("musiclib log: {}", log_path.display());
    info!("musiclib starting");

    // ── Config ───────────────────────────────────────────────────────────────
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("config unreadable, using defaults: {:#}", e);
        Config::default()
    });
    if let Some(server) = &args.server {
        config.server.base_url = server.clone();
    }

    // ── Engine ───────────────────────────────────────────────────────────────
    let transport = Arc::new(HttpTransport::new(&config.server)?);
    let prefs = Arc::new(PreferenceStore::new(data_dir.join("preferences.json")));
    let sink = Arc::new(DirectorySink::new(config.paths.downloads_dir.clone()));
    let (mut app, mut events) = App::new(&config, transport, prefs, sink);
    app.set_source(args.source.as_str());
    app.init().await;

    let mut renderer = Renderer::new(std::io::stdout(), Duration::from_millis(config.ui.toast_ms));
    // Login state from startup is shown by `status` only
    while let Ok(event) = events.try_recv() {
        if !matches!(event, UiEvent::LoginChanged { .. }) {
            renderer.render(&event)?;
        }
    }

    let outcome = run_command(&mut app, args.command).await?;
    drain(&mut events, &mut renderer)?;
    if let Outcome::Follow(follow) = outcome {
        follow_background(&app, &mut events, &mut renderer, follow).await?;
    }

    app.shutdown();
    drain(&mut events, &mut renderer)?;
    info!("musiclib done");
    match outcome {
        Outcome::Failed => Ok(ExitCode::FAILURE),
        _ => Ok(ExitCode::SUCCESS),
    }
}

/// How a command ended.
enum Outcome {
    /// The action failed; its error was already shown.
    Failed,
    Done,
    /// Background work was started and should be watched.
    Follow(Follow),
}

impl From<bool> for Outcome {
    fn from(ok: bool) -> Self {
        if ok {
            Outcome::Done
        } else {
            Outcome::Failed
        }
    }
}

async fn run_command(app: &mut App, command: Command) -> anyhow::Result<Outcome> {
    let outcome = match command {
        Command::Search { keyword } => app.search(&keyword).await.is_ok().into(),
        Command::Playlists { keyword } => app.search_playlists(&keyword).await.is_ok().into(),
        Command::Recommend => app.recommended().await.is_ok().into(),
        Command::Playlist { id, name } => {
            app.open_playlist(&playlist(id, name)).await.is_ok().into()
        }
        Command::Parse { link, playlist: true } => app.parse_playlist(&link).await.is_ok().into(),
        Command::Parse { link, playlist: false } => app.parse_song(&link).await.is_ok().into(),
        Command::Lyrics(pick) => match pick_song(app, &pick).await {
            Some(song) => app.lyrics(&song).await.is_ok().into(),
            None => Outcome::Failed,
        },
        Command::Download { pick, link_only } => match pick_song(app, &pick).await {
            Some(song) if link_only => app.download_link(&song).await.is_ok().into(),
            Some(song) => match app.download(&song).await {
                Ok(()) if app.state.mode == DownloadMode::Nas => Outcome::Follow(Follow::Downloads),
                Ok(()) => Outcome::Done,
                Err(_) => Outcome::Failed,
            },
            None => Outcome::Failed,
        },
        Command::Batch { target, link, name } => {
            let loaded = if link {
                app.parse_playlist(&target).await.is_ok()
            } else {
                app.open_playlist(&playlist(target, name.clone())).await.is_ok()
            };
            if !loaded {
                return Ok(Outcome::Failed);
            }
            if let Some(name) = name {
                app.state.current_playlist_name = Some(name);
            }
            match app.download_batch(None).await {
                Ok(_) if app.state.mode == DownloadMode::Nas => Outcome::Follow(Follow::Downloads),
                Ok(_) => Outcome::Done,
                Err(_) => Outcome::Failed,
            }
        }
        Command::Tasks { watch: true } => {
            app.set_tab(Tab::Tasks);
            Outcome::Follow(Follow::Interrupt)
        }
        Command::Tasks { watch: false } => app.refresh_tasks().await.is_ok().into(),
        Command::Login { platform } => match app.open_login(&platform).await {
            Ok(()) => Outcome::Follow(Follow::Login),
            Err(_) => Outcome::Failed,
        },
        Command::Logout { platform } => app.logout(&platform).await.is_ok().into(),
        Command::Status => {
            print_status(app);
            Outcome::Done
        }
        Command::Quality { value: Some(value) } => {
            app.set_quality(&value).await?;
            Outcome::Done
        }
        Command::Quality { value: None } => {
            println!("{}", app.state.quality);
            Outcome::Done
        }
    };
    Ok(outcome)
}

fn playlist(id: String, name: Option<String>) -> Playlist {
    Playlist {
        name: name.unwrap_or_else(|| id.clone()),
        id,
        ..Default::default()
    }
}

async fn pick_song(app: &mut App, pick: &SongPick) -> Option<Song> {
    let songs = app.search(&pick.keyword).await.ok()?;
    let song = cli::pick(&songs, pick.index).cloned();
    if song.is_none() {
        eprintln!("no result at position {} ({} found)", pick.index, songs.len());
    }
    song
}

fn print_status(app: &App) {
    let mode = match app.state.mode {
        DownloadMode::Nas => "NAS (server-side)",
        DownloadMode::Browser => "local files",
    };
    println!("downloads: {}", mode);
    println!("quality:   {}", app.state.quality);
    println!("source:    {}", app.state.selected_source);
    for platform in LOGIN_PLATFORMS {
        let login = app.qr().logins().get(platform);
        let name = providers::display_name(Some(*platform));
        if login.logged_in {
            println!("{:<10} logged in as {}", name, login.nickname);
        } else {
            println!("{:<10} not logged in", name);
        }
    }
}

async fn follow_background(
    app: &App,
    events: &mut UnboundedReceiver<UiEvent>,
    renderer: &mut Renderer<Stdout>,
    follow: Follow,
) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut check = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            Some(event) = events.recv() => {
                renderer.render(&event)?;
            }
            _ = check.tick() => {
                if finished(app, follow) {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn finished(app: &App, follow: Follow) -> bool {
    match follow {
        Follow::Interrupt => false,
        Follow::Downloads => !app.monitor().is_badge_polling(),
        Follow::Login => {
            let qr = app.qr();
            if qr.open_platform().is_none() {
                return true;
            }
            // A successful session closes itself; anything else that stopped
            // polling (error, static logged-in view) is final.
            !qr.is_polling()
                && qr
                    .session()
                    .map_or(true, |s| s.state != QrState::Success)
        }
    }
}

fn drain(
    events: &mut UnboundedReceiver<UiEvent>,
    renderer: &mut Renderer<Stdout>,
) -> anyhow::Result<()> {
    while let Ok(event) = events.try_recv() {
        renderer.render(&event)?;
    }
    Ok(())
}
