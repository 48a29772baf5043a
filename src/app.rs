use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::anyhow;
use clap::Parser;
use log::LevelFilter;
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    time::{self, MissedTickBehavior},
};

use crate::{
    config::{JsonFileStore, Settings},
    memory::MemoryDocument,
    plugin::FadeStop,
    scene::Scene,
    shell::{Flow, Shell},
};

/// Roughly one display refresh.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[arg(
        short,
        long,
        help = "A TOML file describing the initial document. Without it the document starts empty."
    )]
    pub scene: Option<PathBuf>,

    #[arg(
        long,
        default_value = "data.json",
        help = "Where settings are loaded from and saved to."
    )]
    pub settings: PathBuf,

    #[arg(
        short,
        long,
        help = "Fade duration in seconds. This overrides the saved setting for this session only."
    )]
    pub fade_seconds: Option<f64>,
}

pub async fn start() -> anyhow::Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("FADE_STOP_LOG")
        .init();

    let cli = Cli::parse();

    let doc = Arc::new(MemoryDocument::new());
    if let Some(path) = &cli.scene {
        Scene::read_path(path)?.build(&doc)?;
    }

    let mut plugin = FadeStop::new(doc.clone(), Box::new(JsonFileStore::new(&cli.settings)));
    if let Some(seconds) = cli.fade_seconds {
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(anyhow!("Fade duration must be a positive number of seconds"));
        }
        let settings = plugin.settings().clone();
        plugin = plugin.with_settings(Settings {
            fade_seconds: seconds,
            ..settings
        });
    }
    plugin.load();

    let mut shell = Shell::new(doc, plugin);
    run(&mut shell).await?;

    let limit = Duration::try_from_secs_f64(shell.plugin().settings().fade_seconds)
        .map_or(DRAIN_LIMIT, |fade| fade.saturating_add(FRAME_INTERVAL))
        .min(DRAIN_LIMIT);
    if !drain(&mut shell, limit).await {
        log::info!("Completing fades still running at exit");
    }
    shell.plugin_mut().unload();
    Ok(())
}

async fn run(shell: &mut Shell) -> anyhow::Result<()> {
    let mut frames = time::interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        tokio::select! {
            _ = frames.tick() => shell.plugin_mut().tick(),
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::debug!("Input closed");
                    return Ok(());
                };
                match shell.exec(&line) {
                    Ok((Flow::Quit, _)) => return Ok(()),
                    Ok((Flow::Continue, output)) => {
                        if !output.is_empty() {
                            println!("{output}");
                        }
                    }
                    Err(err) => log::warn!("{err:#}"),
                }
            }
        }
    }
}

/// Longest exit waits on running fades; `unload` completes whatever is left.
const DRAIN_LIMIT: Duration = Duration::from_secs(3);

/// Lets fades started just before exit run to completion, for at most
/// `limit`. Returns whether every fade finished in time.
async fn drain(shell: &mut Shell, limit: Duration) -> bool {
    let finish = async {
        let mut frames = time::interval(FRAME_INTERVAL);
        loop {
            frames.tick().await;
            shell.plugin_mut().tick();
            if shell.plugin().fades_in_flight() == 0 {
                break;
            }
        }
    };
    time::timeout(limit, finish).await.is_ok()
}
