use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};

use libbeamtime::config::Config;
use libbeamtime::error::RunError;
use libbeamtime::event::{Attribute, EventType};
use libbeamtime::filter::{EventQuery, Filter};
use libbeamtime::fragment::FragmentTable;
use libbeamtime::heatmap::trains_per_delay;
use libbeamtime::histogram::{tof_spectrum, vmi_image, TimeUnit};
use libbeamtime::lookup::DelayTable;
use libbeamtime::polar::{radial_sum, NearestNeighborPolar, PolarTransform};
use libbeamtime::run::{trains_per_run, TimepixRun};

fn make_template_config(path: &Path) {
    let yaml_str = match serde_yaml::to_string(&Config::default()) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Could not serialize template config: {e}");
            return;
        }
    };
    match std::fs::write(path, yaml_str) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not create template config file: {e}"),
    }
}

fn run_arg() -> Arg {
    Arg::new("run")
        .short('r')
        .long("run")
        .required(true)
        .value_parser(value_parser!(i32))
        .help("Run number")
}

fn interval_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("first")
            .long("first")
            .required(true)
            .value_parser(value_parser!(i32))
            .help("First run number (inclusive)"),
    )
    .arg(
        Arg::new("last")
            .long("last")
            .required(true)
            .value_parser(value_parser!(i32))
            .help("Last run number (inclusive)"),
    )
}

fn open_run(config: &Config, run_number: i32) -> Result<Option<TimepixRun>, RunError> {
    let run = TimepixRun::open(config, run_number)?;
    if let Some(r) = run.as_ref() {
        log::info!("Run {run_number}: {}", r.hdf_file().to_string_lossy());
    }
    Ok(run)
}

/// Trains recorded in every run of the interval, with a progress bar over the runs
fn count_trains(
    config: &Config,
    first: i32,
    last: i32,
    pb_manager: &MultiProgress,
) -> Result<Vec<(i32, usize)>, RunError> {
    let pb = pb_manager.add(ProgressBar::new((last - first + 1).max(0) as u64));
    let trains = trains_per_run(config, first, last, |_, _| pb.inc(1))?;
    pb.finish();
    Ok(trains)
}

fn trains(config: &Config, args: &ArgMatches, pb_manager: &MultiProgress) -> Result<(), RunError> {
    let first = *args.get_one::<i32>("first").unwrap_or(&0);
    let last = *args.get_one::<i32>("last").unwrap_or(&0);
    let trains = count_trains(config, first, last, pb_manager)?;
    for (run_number, n) in trains.iter() {
        log::info!("Run {run_number:>5}: {n:>8} trains");
    }
    log::info!(
        "Total: {} trains",
        trains.iter().map(|(_, n)| n).sum::<usize>()
    );
    Ok(())
}

fn delays(config: &Config, args: &ArgMatches, pb_manager: &MultiProgress) -> Result<(), RunError> {
    let first = *args.get_one::<i32>("first").unwrap_or(&0);
    let last = *args.get_one::<i32>("last").unwrap_or(&0);
    let table = DelayTable::load(&config.get_pp_delay_path()?)?;
    let runs = table.runs_in_interval(first, last)?;
    let trains = count_trains(config, first, last, pb_manager)?;

    let mut run_delays = Vec::new();
    let mut run_trains = Vec::new();
    for (run_number, delay) in runs {
        if let Some((_, n)) = trains.iter().find(|(r, _)| *r == run_number) {
            run_delays.push(delay);
            run_trains.push(*n);
        }
    }
    for (delay, n) in trains_per_delay(&run_delays, &run_trains)? {
        log::info!("Delay {delay:>10}: {n:>8} trains");
    }
    Ok(())
}

fn correlate(config: &Config, args: &ArgMatches) -> Result<(), RunError> {
    let run_number = *args.get_one::<i32>("run").unwrap_or(&0);
    let run = match open_run(config, run_number)? {
        Some(r) => r,
        None => return Ok(()),
    };
    let correlation = run.trigger_train_ids(true)?;
    log::info!(
        "Matched {} triggers starting at facility index {}, {} skipped pulse(s)",
        correlation.len(),
        correlation.start_index,
        correlation.skipped
    );
    if let (Some(first), Some(last)) = (correlation.pairs().next(), correlation.pairs().last()) {
        log::info!("First trigger {} -> train {}", first.0, first.1);
        log::info!("Last trigger {} -> train {}", last.0, last.1);
    }
    Ok(())
}

fn events(config: &Config, args: &ArgMatches) -> Result<(), RunError> {
    let run_number = *args.get_one::<i32>("run").unwrap_or(&0);
    let event_type: EventType = args
        .get_one::<String>("type")
        .map(|s| s.as_str())
        .unwrap_or("raw")
        .parse()?;
    let mut attributes = Vec::new();
    for name in args.get_many::<String>("attrs").into_iter().flatten() {
        attributes.push(name.parse::<Attribute>()?);
    }
    let mut query = EventQuery::new(event_type, &attributes);
    for filter in args.get_many::<String>("filter").into_iter().flatten() {
        query = query.with_filter(filter.parse::<Filter>()?);
    }
    if let Some(fragment) = args.get_one::<String>("fragment") {
        query = query.with_fragment(fragment);
    }
    // Usage errors are reported before any file is opened
    query.validate()?;

    let run = match open_run(config, run_number)? {
        Some(r) => r,
        None => return Ok(()),
    };
    let fragments = if query.fragment.is_some() {
        FragmentTable::load(&config.fragments)?
    } else {
        FragmentTable::default()
    };
    let data = match run.events(&query, &fragments)? {
        Some(d) => d,
        None => return Ok(()),
    };
    log::info!("Selected {} {} events", data.len(), event_type);
    for attribute in data.attributes() {
        let column = data.column(attribute)?;
        let min = column.iter().copied().fold(f64::INFINITY, f64::min);
        let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        log::info!("{attribute:>12}: min {min:e} max {max:e}");
    }
    if let Ok(tof) = data.column(&Attribute::Tof) {
        let unit = TimeUnit::Micro;
        let spectrum = tof_spectrum(tof, 100, unit);
        if let Some((i, peak)) = spectrum
            .counts
            .iter()
            .enumerate()
            .max_by_key(|(_, count)| **count)
        {
            log::info!(
                "ToF peak at {:.3} {unit} with {peak} events",
                spectrum.bin_centers()[i]
            );
        }
    }
    Ok(())
}

fn radial(config: &Config, args: &ArgMatches) -> Result<(), RunError> {
    let run_number = *args.get_one::<i32>("run").unwrap_or(&0);
    let fragment_name = args
        .get_one::<String>("fragment")
        .cloned()
        .unwrap_or_default();
    let fragments = FragmentTable::load(&config.fragments)?;
    let fragment = match fragments.get(&fragment_name) {
        Some(f) => f.clone(),
        None => return Ok(()),
    };
    let run = match open_run(config, run_number)? {
        Some(r) => r,
        None => return Ok(()),
    };
    let event_type: EventType = args
        .get_one::<String>("type")
        .map(|s| s.as_str())
        .unwrap_or("raw")
        .parse()?;
    let data = match run.events_of_fragment(event_type, &fragment_name)? {
        Some(d) => d,
        None => return Ok(()),
    };
    let image = vmi_image(data.column(&Attribute::X)?, data.column(&Attribute::Y)?)?;
    let polar = NearestNeighborPolar::default().to_polar(&image, fragment.center());
    let profile = radial_sum(&polar);
    log::info!(
        "Radial profile of {fragment_name} from {} events ({} radii)",
        data.len(),
        profile.len()
    );
    for (r, counts) in profile.iter().enumerate() {
        log::info!("r {r:>4} px: {counts}");
    }
    Ok(())
}

fn main() {
    // Create a cli
    let matches = Command::new("beamtime_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(interval_args(
            Command::new("trains").about("Number of trains recorded per run"),
        ))
        .subcommand(interval_args(
            Command::new("delays").about("Number of trains per unique pump-probe delay"),
        ))
        .subcommand(
            Command::new("correlate")
                .about("Match the trigger numbers of a run onto train IDs")
                .arg(run_arg()),
        )
        .subcommand(
            Command::new("events")
                .about("Select events of a run by filters or by fragment")
                .arg(run_arg())
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .default_value("raw")
                        .help("Event type: raw or centroided"),
                )
                .arg(
                    Arg::new("attrs")
                        .short('a')
                        .long("attrs")
                        .value_delimiter(',')
                        .default_value("tof,x,y")
                        .help("Comma separated event attributes"),
                )
                .arg(
                    Arg::new("filter")
                        .short('f')
                        .long("filter")
                        .action(ArgAction::Append)
                        .help("Filter as attribute:start:end, may be repeated"),
                )
                .arg(
                    Arg::new("fragment")
                        .long("fragment")
                        .help("Fragment name, optionally as set,name"),
                ),
        )
        .subcommand(
            Command::new("radial")
                .about("Radial profile of the VMI image of a fragment")
                .arg(run_arg())
                .arg(Arg::new("fragment").long("fragment").required(true))
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .default_value("raw")
                        .help("Event type: raw or centroided"),
                ),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A configuration path is required (-p/--path)");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("File system: {}", config.file_system);
    match config.get_data_prefix() {
        Ok(prefix) => log::info!("Data prefix: {}", prefix.to_string_lossy()),
        Err(e) => {
            log::error!("{e}");
            return;
        }
    }
    log::info!("Fragments: {}", config.fragments.to_string_lossy());

    let result = match matches.subcommand() {
        Some(("trains", args)) => trains(&config, args, &pb_manager),
        Some(("delays", args)) => delays(&config, args, &pb_manager),
        Some(("correlate", args)) => correlate(&config, args),
        Some(("events", args)) => events(&config, args),
        Some(("radial", args)) => radial(&config, args),
        _ => {
            log::error!("No subcommand given, see --help");
            return;
        }
    };

    match result {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Failed with error: {e}"),
    }
}
