//! Spike-a-Flat CLI tool
//!
//! Every invocation discovers the dimmer, runs a single command and releases
//! the device again.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::{
    crate_description, crate_name, crate_version, value_parser, Arg, ArgAction, ArgMatches,
    Command,
};
use log::debug;

use spikeaflat::hid::{HidBus, HidDimmer};
use spikeaflat::{DimmerController, DimmerOptions};

/// Raw state reported once the lamp settled on its new intensity.
const STATE_READY: u8 = 3;

/// Delay between state queries while waiting for the lamp.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default time to wait for the lamp in milliseconds.
const DEFAULT_WAIT: u64 = 10_000;

/// Requested dimmer operation.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
enum Action {
    Brightness,
    Set(i64),
    State,
    On { brightness: i64, wait: Duration },
    Off,
}

impl Action {
    fn from_cli(matches: &ArgMatches) -> Self {
        match matches.subcommand() {
            Some(("set", sub)) => Self::Set(brightness_arg(sub)),
            Some(("state", _)) => Self::State,
            Some(("on", sub)) => {
                let wait = sub.get_one::<u64>("wait").copied().unwrap_or(DEFAULT_WAIT);
                Self::On { brightness: brightness_arg(sub), wait: Duration::from_millis(wait) }
            },
            Some(("off", _)) => Self::Off,
            _ => Self::Brightness,
        }
    }
}

/// Lamp did not become ready in time.
#[derive(Debug)]
struct NotReady(u8);

impl Display for NotReady {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "calibrator not ready (last state: {})", self.0)
    }
}

impl Error for NotReady {}

fn main() {
    env_logger::init();

    let matches = cli();
    let options = options_from_cli(&matches);
    let action = Action::from_cli(&matches);

    if let Err(err) = run(options, action) {
        eprintln!("\x1b[31mError:\x1b[0m {err}");
        process::exit(1);
    }
}

/// Execute a single action on the first attached dimmer.
fn run(options: DimmerOptions, action: Action) -> Result<(), Box<dyn Error>> {
    let bus = HidBus::new()?;
    let mut controller = DimmerController::discover(&bus, options)?;
    controller.connect()?;

    let result = execute(&controller, action);

    // Release explicitly so the turn-off happens before any error is printed.
    controller.dispose();

    result
}

fn execute(controller: &DimmerController<HidDimmer>, action: Action) -> Result<(), Box<dyn Error>> {
    match action {
        Action::Brightness => println!("Brightness: {}", controller.get_brightness()?),
        Action::State => println!("State: {}", controller.get_state()?),
        Action::Set(brightness) => {
            controller.set_brightness(brightness)?;
            println!("\x1b[32mBrightness set to {}.\x1b[0m", brightness);
        },
        Action::On { brightness, wait } => {
            controller.set_brightness(brightness)?;
            wait_ready(controller, wait)?;
            println!("Brightness: {}", controller.get_brightness()?);
        },
        Action::Off => {
            controller.set_brightness(0)?;
            println!("\x1b[32mCalibrator off.\x1b[0m");
        },
    }

    Ok(())
}

/// Poll the device until it reports the ready state.
fn wait_ready(controller: &DimmerController<HidDimmer>, wait: Duration) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();

    loop {
        let state = controller.get_state()?;
        if state == STATE_READY {
            return Ok(());
        }

        debug!("Waiting for calibrator, state: {}", state);

        if start.elapsed() >= wait {
            return Err(NotReady(state).into());
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Build dimmer configuration from the global CLI flags.
fn options_from_cli(matches: &ArgMatches) -> DimmerOptions {
    let mut options =
        DimmerOptions::default().turn_off_on_disconnect(matches.get_flag("turn-off"));

    if let Some(ms) = matches.get_one::<u64>("lock-timeout") {
        options = options.lock_timeout(Duration::from_millis(*ms));
    }

    if let Some(ms) = matches.get_one::<u64>("read-timeout") {
        options = options.read_timeout(Duration::from_millis(*ms));
    }

    options
}

/// Brightness parameter of a subcommand.
#[inline]
fn brightness_arg(matches: &ArgMatches) -> i64 {
    matches.get_one::<i64>("brightness").copied().unwrap_or_default()
}

/// Get clap CLI parameters.
fn cli() -> ArgMatches {
    command().get_matches()
}

fn command() -> Command {
    let brightness = Arg::new("brightness")
        .help("Lamp intensity [possible values: 0..=1023]")
        .required(true)
        .allow_negative_numbers(true)
        .value_parser(value_parser!(i64));

    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .subcommand(Command::new("brightness").about("Print the current brightness"))
        .subcommand(Command::new("set").about("Set the brightness").arg(brightness.clone()))
        .subcommand(Command::new("state").about("Print the raw calibrator state"))
        .subcommand(
            Command::new("on")
                .about("Switch the calibrator on and wait until it is ready")
                .arg(brightness)
                .arg(
                    Arg::new("wait")
                        .help("Maximum time to wait for the calibrator in milliseconds")
                        .long("wait")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(Command::new("off").about("Switch the calibrator off"))
        .arg(
            Arg::new("turn-off")
                .help("Switch the lamp off before releasing the device")
                .long("turn-off")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("lock-timeout")
                .help("Device access timeout in milliseconds")
                .long("lock-timeout")
                .global(true)
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("read-timeout")
                .help("Device reply timeout in milliseconds")
                .long("read-timeout")
                .global(true)
                .value_parser(value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ArgMatches {
        command().get_matches_from(args)
    }

    #[test]
    fn cli_is_valid() {
        command().debug_assert();
    }

    #[test]
    fn defaults_to_brightness() {
        let matches = parse(&["spikeaflat"]);
        assert_eq!(Action::from_cli(&matches), Action::Brightness);
        assert_eq!(options_from_cli(&matches), DimmerOptions::default());
    }

    #[test]
    fn on_with_wait() {
        let matches = parse(&["spikeaflat", "on", "20", "--wait", "500"]);
        assert_eq!(Action::from_cli(&matches), Action::On {
            brightness: 20,
            wait: Duration::from_millis(500)
        });
    }

    #[test]
    fn negative_brightness_reaches_controller() {
        let matches = parse(&["spikeaflat", "set", "-5"]);
        assert_eq!(Action::from_cli(&matches), Action::Set(-5));
    }

    #[test]
    fn global_options() {
        let matches =
            parse(&["spikeaflat", "off", "--turn-off", "--lock-timeout", "100", "--read-timeout", "50"]);
        let options = options_from_cli(&matches);

        assert_eq!(Action::from_cli(&matches), Action::Off);
        assert!(options.turn_off_on_disconnect);
        assert_eq!(options.lock_timeout, Duration::from_millis(100));
        assert_eq!(options.read_timeout, Duration::from_millis(50));
    }
}
