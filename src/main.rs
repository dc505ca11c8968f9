use std::time::Duration;

use castplay::config::{default_config_path, Config};
use castplay::error::ConfigError;
use castplay::protocol::BackendKind;
use castplay::sim::SimulatedPlayer;
use castplay::view_model::{PlayerViewModel, Video};
use log::{info, warn};
use tokio::sync::broadcast;

fn load_config() -> Result<Config, ConfigError> {
    let path = default_config_path()?;
    Config::load_or_create(&path)
}

fn demo_videos() -> Vec<Video> {
    vec![
        Video::new(
            1,
            "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/BigBuckBunny.mp4",
            "Big Buck Bunny",
        ),
        Video::new(
            2,
            "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ElephantsDream.mp4",
            "Elephants Dream",
        ),
        Video::new(
            3,
            "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/Sintel.mp4",
            "Sintel",
        ),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_config();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        loaded
            .as_ref()
            .map(|config| config.logging.level_filter())
            .unwrap_or(log::LevelFilter::Debug),
    );
    clog.init();

    let config = loaded.unwrap_or_else(|err| {
        warn!("{}. Using default config", err);
        Config::default()
    });

    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    runtime.block_on(async move {
        // Bus for communication between components
        let (bus_sender, _) = broadcast::channel(1024);

        let local = SimulatedPlayer::new(BackendKind::Local).with_bus(bus_sender.clone());
        let remote = SimulatedPlayer::new(BackendKind::Remote).with_bus(bus_sender.clone());
        let mut view_model =
            PlayerViewModel::new(local.clone(), remote.clone(), &config, bus_sender);

        view_model.set_videos(&demo_videos(), 0);
        view_model.pump();

        let tick = Duration::from_millis(config.playback.position_poll_interval_ms);
        for step in 0..6 {
            local.advance(tick.as_millis() as u64);
            remote.advance(tick.as_millis() as u64);
            tokio::time::sleep(tick).await;
            view_model.pump();

            match step {
                1 => remote.set_session_available(true),
                3 => view_model.coordinator_mut().seek_to_next(),
                4 => remote.set_session_available(false),
                _ => {}
            }
            view_model.pump();
            info!("Demo: step {} state={:?}", step, view_model.state());
        }

        view_model.on_release();
        info!("Demo: released, final state={:?}", view_model.state());
    });

    Ok(())
}
