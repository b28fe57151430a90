use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::filter::EnvFilter;

use multiclock::alarm::model::AlarmDraft;
use multiclock::alarm::scheduler::alarm_state;
use multiclock::clock::{ClockSourceKind, SelectedClock, select_clock};
use multiclock::config::{EngineConfig, load_engine_config};
use multiclock::diagnostics::run_diagnostics;
use multiclock::input::{parse_duration_token, parse_hour_minute, parse_local_datetime, resolve_local};
use multiclock::notify::{
    RecordingNotifier, SoundPlayer, TerminalBell, TracingNotifier, TracingSoundPlayer,
};
use multiclock::runner::{Pacer, SimulatedPacer, WallPacer, run_for};
use multiclock::stopwatch::{DisplayFormat, format_elapsed};
use multiclock::storage::FileStorage;
use multiclock::timer::model::TimerDraft;
use multiclock::{Collaborators, Engine};

#[derive(Parser, Debug)]
#[command(
    name = "multiclock",
    version,
    about = "Alarms, timers, a stopwatch and world clocks with persistent state"
)]
struct Cli {
    /// Directory holding one JSON file per storage slot.
    #[arg(long, global = true, default_value = ".multiclock")]
    data_dir: PathBuf,

    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pin the clock to a local date-time instead of the system clock.
    #[arg(long, global = true)]
    now: Option<String>,

    /// Ring the terminal bell for alarms and expired timers.
    #[arg(long, global = true)]
    bell: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every alarm, timer, the stopwatch and world clocks.
    Status,
    Diagnostics,
    #[command(subcommand)]
    Alarm(AlarmCommand),
    #[command(subcommand)]
    Timer(TimerCommand),
    #[command(subcommand)]
    Stopwatch(StopwatchCommand),
    #[command(subcommand)]
    Worldclock(WorldClockCommand),
    /// Keep ticking for a while, ringing alarms and expiring timers.
    Run {
        #[arg(long = "for", default_value = "1m")]
        duration: String,
    },
}

#[derive(Subcommand, Debug)]
enum AlarmCommand {
    Add {
        /// HH:MM; out-of-range parts wrap around.
        #[arg(allow_hyphen_values = true)]
        time: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        sound: Option<String>,
    },
    Edit {
        id: String,
        #[arg(allow_hyphen_values = true)]
        time: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        sound: Option<String>,
    },
    Enable { id: String },
    Disable { id: String },
    Dismiss { id: String },
    Delete { id: String },
    Reorder { ids: Vec<String> },
}

#[derive(Args, Debug)]
struct TimerSpecArgs {
    /// Countdown length such as 90s, 5m or 1h.
    #[arg(long, conflicts_with = "until", required_unless_present = "until")]
    duration: Option<String>,
    /// Count down to a local date-time.
    #[arg(long)]
    until: Option<String>,
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long)]
    sound: Option<String>,
}

#[derive(Subcommand, Debug)]
enum TimerCommand {
    Add {
        #[command(flatten)]
        spec: TimerSpecArgs,
        #[arg(long)]
        start: bool,
    },
    Edit {
        id: String,
        #[command(flatten)]
        spec: TimerSpecArgs,
    },
    Start { id: String },
    Pause { id: String },
    Reset { id: String },
    Pin { id: String },
    Unpin { id: String },
    Delete { id: String },
    Reorder { ids: Vec<String> },
}

#[derive(Subcommand, Debug)]
enum StopwatchCommand {
    Start,
    Stop,
    Reset,
    Lap,
    /// seconds, deciseconds, centiseconds or milliseconds.
    Format { format: String },
}

#[derive(Subcommand, Debug)]
enum WorldClockCommand {
    Add {
        /// IANA zone name such as Europe/Paris.
        timezone: String,
        #[arg(long, default_value = "")]
        title: String,
    },
    Delete { id: String },
    Reorder { ids: Vec<String> },
}

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_engine_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let clock_kind = match cli.now.as_deref() {
        Some(text) => ClockSourceKind::Fixed(parse_local_datetime(text)?),
        None => ClockSourceKind::System,
    };
    let selected = select_clock(clock_kind)?;
    let storage = FileStorage::open(&cli.data_dir)?;

    if let Command::Diagnostics = cli.command {
        return run_diagnostics(&selected, &storage, &cli.data_dir, &config);
    }

    let notifier = RecordingNotifier::new();
    let sound: Box<dyn SoundPlayer> = if cli.bell {
        Box::new(TerminalBell)
    } else {
        Box::new(TracingSoundPlayer)
    };
    let mut engine = Engine::load(
        config,
        selected.clock.clone(),
        Collaborators {
            storage: Box::new(storage),
            notifier: Box::new((TracingNotifier, notifier.clone())),
            sound,
        },
    );

    let result = apply(&mut engine, &selected, cli.command);
    for notification in notifier.drain() {
        let context = notification
            .context
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "notice: {} {} {context}",
            serde_json::to_string(&notification.category)?.trim_matches('"'),
            notification.event.as_str()
        );
    }
    result
}

fn apply(engine: &mut Engine, selected: &SelectedClock, command: Command) -> Result<()> {
    match command {
        Command::Status => print_status(engine, selected.label),
        Command::Diagnostics => {}
        Command::Alarm(action) => apply_alarm(engine, action)?,
        Command::Timer(action) => apply_timer(engine, action)?,
        Command::Stopwatch(action) => apply_stopwatch(engine, action)?,
        Command::Worldclock(action) => apply_world_clock(engine, action)?,
        Command::Run { duration } => {
            let duration = parse_duration_token(&duration)?;
            let mut pacer: Box<dyn Pacer> = match &selected.manual {
                Some(clock) => Box::new(SimulatedPacer::new(clock.clone())),
                None => Box::new(WallPacer),
            };
            let summary = run_for(engine, duration, pacer.as_mut());
            println!(
                "Ran for {}s: {} ticks fired",
                duration.num_seconds(),
                summary.ticks_fired
            );
            for id in &summary.alarms_rung {
                println!("Alarm ringing: {id}");
            }
            for id in &summary.timers_expired {
                println!("Timer expired: {id}");
            }
        }
    }
    Ok(())
}

fn apply_alarm(engine: &mut Engine, action: AlarmCommand) -> Result<()> {
    match action {
        AlarmCommand::Add { time, title, sound } => {
            let draft = alarm_draft(&time, title, sound)?;
            let id = engine.add_alarm(draft)?;
            let alarm = engine
                .alarm(&id)
                .ok_or_else(|| anyhow!("alarm {id} vanished after creation"))?;
            println!("Created alarm {id} at {:02}:{:02}", alarm.hour, alarm.minute);
        }
        AlarmCommand::Edit {
            id,
            time,
            title,
            sound,
        } => {
            engine.update_alarm(&id, alarm_draft(&time, title, sound)?)?;
            println!("Updated alarm {id}");
        }
        AlarmCommand::Enable { id } => {
            let state = engine.set_alarm_enabled(&id, true)?;
            println!("Alarm {id} is {}", format!("{state:?}").to_lowercase());
        }
        AlarmCommand::Disable { id } => {
            let state = engine.set_alarm_enabled(&id, false)?;
            println!("Alarm {id} is {}", format!("{state:?}").to_lowercase());
        }
        AlarmCommand::Dismiss { id } => {
            if engine.dismiss_alarm(&id)? {
                println!("Dismissed alarm {id}");
            } else {
                println!("Alarm {id} was not ringing");
            }
        }
        AlarmCommand::Delete { id } => {
            engine.delete_alarm(&id)?;
            println!("Deleted alarm {id}");
        }
        AlarmCommand::Reorder { ids } => {
            engine.reorder_alarms(&ids);
            println!("Reordered alarms");
        }
    }
    Ok(())
}

fn alarm_draft(time: &str, title: String, sound: Option<String>) -> Result<AlarmDraft> {
    let (hour, minute) = parse_hour_minute(time)?;
    let draft = AlarmDraft::new(title, hour, minute);
    Ok(match sound {
        Some(sound) => draft.with_sound(sound),
        None => draft,
    })
}

fn timer_draft(spec: TimerSpecArgs) -> Result<TimerDraft> {
    let draft = match (spec.duration, spec.until) {
        (Some(duration), _) => {
            let duration = parse_duration_token(&duration)?;
            TimerDraft::countdown(spec.title, duration.num_milliseconds())
        }
        (None, Some(until)) => {
            let target = resolve_local(parse_local_datetime(&until)?)?;
            TimerDraft::until(spec.title, target)
        }
        (None, None) => return Err(anyhow!("either --duration or --until is required")),
    };
    Ok(match spec.sound {
        Some(sound) => draft.with_sound(sound),
        None => draft,
    })
}

fn apply_timer(engine: &mut Engine, action: TimerCommand) -> Result<()> {
    match action {
        TimerCommand::Add { spec, start } => {
            let is_until = spec.until.is_some();
            let draft = timer_draft(spec)?;
            let draft = if is_until { draft } else { draft.started(start) };
            let id = engine.add_timer(draft)?;
            let state = engine.timer(&id).map(|timer| timer.state);
            println!(
                "Created timer {id} ({})",
                state.map(|s| format!("{s:?}").to_lowercase()).unwrap_or_default()
            );
        }
        TimerCommand::Edit { id, spec } => {
            engine.update_timer(&id, timer_draft(spec)?)?;
            println!("Updated timer {id}");
        }
        TimerCommand::Start { id } => {
            let state = engine.start_timer(&id)?;
            println!("Timer {id} is {}", format!("{state:?}").to_lowercase());
        }
        TimerCommand::Pause { id } => {
            let state = engine.pause_timer(&id)?;
            println!("Timer {id} is {}", format!("{state:?}").to_lowercase());
        }
        TimerCommand::Reset { id } => {
            let state = engine.reset_timer(&id)?;
            println!("Timer {id} is {}", format!("{state:?}").to_lowercase());
        }
        TimerCommand::Pin { id } => {
            engine.pin_timer(&id)?;
            println!("Pinned timer {id}");
        }
        TimerCommand::Unpin { id } => {
            if engine.unpin_timer(&id)? {
                println!("Unpinned timer {id}");
            } else {
                println!("Timer {id} was not pinned");
            }
        }
        TimerCommand::Delete { id } => {
            engine.delete_timer(&id)?;
            println!("Deleted timer {id}");
        }
        TimerCommand::Reorder { ids } => {
            engine.reorder_timers(&ids);
            println!("Reordered timers");
        }
    }
    Ok(())
}

fn apply_stopwatch(engine: &mut Engine, action: StopwatchCommand) -> Result<()> {
    match action {
        StopwatchCommand::Start => {
            if engine.start_stopwatch() {
                println!("Stopwatch started");
            } else {
                println!("Stopwatch already running");
            }
        }
        StopwatchCommand::Stop => {
            if engine.stop_stopwatch() {
                let elapsed = engine.stopwatch().elapsed_ms(engine.now_ms());
                let format = engine.stopwatch().format();
                println!("Stopwatch stopped at {}", format_elapsed(elapsed, format));
            } else {
                println!("Stopwatch is not running");
            }
        }
        StopwatchCommand::Reset => {
            engine.reset_stopwatch();
            println!("Stopwatch reset");
        }
        StopwatchCommand::Lap => {
            let lap = engine.lap()?;
            let format = engine.stopwatch().format();
            println!(
                "Lap {}: split {} total {}",
                lap.index,
                format_elapsed(lap.split_ms, format),
                format_elapsed(lap.total_ms, format)
            );
        }
        StopwatchCommand::Format { format } => {
            let parsed = DisplayFormat::parse(&format)
                .ok_or_else(|| anyhow!("unknown stopwatch format '{format}'"))?;
            engine.set_stopwatch_format(parsed);
            println!("Stopwatch format set to {}", format!("{parsed:?}").to_lowercase());
        }
    }
    Ok(())
}

fn apply_world_clock(engine: &mut Engine, action: WorldClockCommand) -> Result<()> {
    match action {
        WorldClockCommand::Add { timezone, title } => {
            let id = engine.add_world_clock(&title, &timezone)?;
            println!("Created world clock {id} ({timezone})");
        }
        WorldClockCommand::Delete { id } => {
            engine.delete_world_clock(&id)?;
            println!("Deleted world clock {id}");
        }
        WorldClockCommand::Reorder { ids } => {
            engine.reorder_world_clocks(&ids);
            println!("Reordered world clocks");
        }
    }
    Ok(())
}

fn print_status(engine: &Engine, source_label: &str) {
    let now_ms = engine.now_ms();
    let now = chrono::DateTime::from_timestamp_millis(now_ms)
        .map(|utc| utc.with_timezone(&chrono::Local));
    if let Some(now) = now {
        println!("Now: {} ({source_label})", now.format("%Y-%m-%d %H:%M:%S"));
    }

    println!("Alarms ({}):", engine.alarms().len());
    for alarm in engine.alarms() {
        let state = format!("{:?}", alarm_state(alarm)).to_lowercase();
        let marker = if alarm.is_default() { " [default]" } else { "" };
        println!(
            "  {}  {:02}:{:02}  {state}  {}{marker}",
            alarm.id, alarm.hour, alarm.minute, alarm.title
        );
    }

    println!("Timers ({}):", engine.timers().len());
    for timer in engine.timers() {
        let state = format!("{:?}", timer.state).to_lowercase();
        let pin = if timer.is_pinned { " [pinned]" } else { "" };
        println!(
            "  {}  {state}  {}  {}{pin}",
            timer.id,
            format_elapsed(timer.remaining_ms, DisplayFormat::Seconds),
            timer.title
        );
    }

    let stopwatch = engine.stopwatch();
    println!(
        "Stopwatch: {}  {}  laps={}",
        format!("{:?}", stopwatch.state()).to_lowercase(),
        format_elapsed(stopwatch.elapsed_ms(now_ms), stopwatch.format()),
        stopwatch.laps().len()
    );
    for lap in stopwatch.laps_newest_first() {
        println!(
            "  lap {}  split {}  total {}",
            lap.index,
            format_elapsed(lap.split_ms, stopwatch.format()),
            format_elapsed(lap.total_ms, stopwatch.format())
        );
    }

    let ticks = engine
        .ticks()
        .active_keys()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if !ticks.is_empty() {
        println!("Active ticks: {}", ticks.join(", "));
    }

    println!("World clocks ({}):", engine.world_clocks().len());
    for clock in engine.world_clocks() {
        let shown = match (&clock.error, clock.local_time) {
            (Some(error), _) => format!("error: {error}"),
            (None, Some(local)) => local.format("%Y-%m-%d %H:%M").to_string(),
            (None, None) => "--".to_string(),
        };
        println!("  {}  {}  {shown}  {}", clock.id, clock.timezone, clock.title);
    }
}
