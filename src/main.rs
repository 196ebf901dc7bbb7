use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use sfx_relay::cli::Cli;
use sfx_relay::error::RelayError;
use sfx_relay::event_loop::{Components, EventLoop};
use sfx_relay::indicator::{IndicatorController, SysfsGpio};
use sfx_relay::serial::{SerialLink, TtyOpener};
use sfx_relay::shutdown::{self, ShutdownFlag};
use sfx_relay::sound::{output_device_present, AudioController, NamePattern, RodioDriver, SourceResolver};
use sfx_relay::{config, event_log, log_info, log_warning, logging};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_console(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            let code = e.downcast_ref::<RelayError>().map_or(1, RelayError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let options = config::load_config(cli.config.as_deref())?;
    let options = cli.merge_into_options(options)?;
    options.validate().context("Invalid configuration")?;

    let log_path = options.log_path();
    if let Err(e) = event_log::init(&log_path, Some(&options.health_log_path())) {
        tracing::warn!("event log {} unavailable: {}", log_path.display(), e);
    }

    let shutdown = ShutdownFlag::new();
    shutdown::install_signal_handlers(&shutdown)
        .map_err(|e| RelayError::Setup(format!("cannot install signal handlers: {}", e)))?;

    let resolver = SourceResolver::new(
        options.media_roots.clone(),
        options.local_sound_dir.clone(),
        NamePattern::new(&options.primary_pattern).context("Invalid RIGHT sound pattern")?,
        NamePattern::new(&options.secondary_pattern).context("Invalid WRONG sound pattern")?,
    );

    // Capabilities are probed once; components no-op when absent
    let audio_available = output_device_present();
    if !audio_available {
        log_warning!("No audio output device found, sounds disabled");
    }
    let audio = AudioController::new(Box::new(RodioDriver::new()), options.audio_settings(), audio_available);

    let ready_indicator = open_indicator(
        "Ready",
        options.ready_pin,
        options.indicator_active_low,
        options.blink_duration,
    );
    let media_indicator = open_indicator(
        "Media",
        options.media_pin,
        options.indicator_active_low,
        options.blink_duration,
    );

    let link = SerialLink::new(Box::new(TtyOpener), options.link_settings(), shutdown.clone());

    let components = Components {
        link,
        audio,
        ready_indicator,
        media_indicator,
        resolver,
    };
    let mut relay = EventLoop::new(components, options.loop_settings(), shutdown);
    let result = relay.run();
    event_log::close();
    result.map_err(anyhow::Error::from)
}

fn open_indicator(
    name: &'static str,
    pin: Option<u32>,
    active_low: bool,
    blink: Duration,
) -> IndicatorController {
    let Some(pin) = pin else {
        return IndicatorController::absent(name);
    };

    match SysfsGpio::open(pin, active_low) {
        Ok(gpio) => {
            log_info!("{} indicator on GPIO {}", name, pin);
            IndicatorController::new(name, Some(Box::new(gpio)), blink)
        }
        Err(e) => {
            log_warning!("{} indicator unavailable: {}", name, e);
            IndicatorController::absent(name)
        }
    }
}
