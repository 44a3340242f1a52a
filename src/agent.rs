use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use anyhow::{anyhow, Result};
use clap::{ArgMatches, value_t};
use futures::stream::{Stream, StreamExt};
use log::{debug, info, warn};
use regex::Regex;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag::register;
use tokio::runtime::Runtime;
use tokio::time::sleep;
use crate::args::{millis, opt};
use crate::capture::{self, load, runtime_dir, Event, Filter, Named, PacketRecord};
use crate::engine::{self, Device, Engine};
use crate::session::{self, Controller, Setting, Source};
use crate::stats::{self, Aggregator, Snapshot};

#[derive(Copy, Clone, Debug)]
pub enum Output {
    Log,
    Json,
}

pub fn devices(args: &ArgMatches) -> Result<()> {
    let cfg    = config(args)?;
    let engine = command(args)?;
    let signal = Arc::new(Event::new());

    let rt  = Runtime::new()?;
    let ctl = Controller::new(cfg, engine, signal);

    for device in rt.block_on(ctl.devices(ctl.enumeration_timeout()))? {
        println!("{}", device);
    }

    Ok(())
}

pub fn capture(args: &ArgMatches) -> Result<()> {
    let mut cfg = config(args)?;
    let device  = value_t!(args, "device", String)?;
    let filter  = opt(args.value_of("filter"))?.unwrap_or_default();
    let output  = opt(args.value_of("output"))?.unwrap_or(Output::Log);
    let native  = args.is_present("native");
    let save    = args.value_of("save").map(PathBuf::from);

    if let Some(cadence) = millis(args.value_of("cadence"))? {
        cfg.stats.cadence = cadence;
    }

    if let Some(capacity) = opt(args.value_of("capacity"))? {
        cfg.capture.capacity = capacity;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    register(SIGTERM, shutdown.clone())?;
    register(SIGINT,  shutdown.clone())?;

    let engine = command(args)?;
    let signal = Arc::new(Named::new(runtime_dir(), &cfg.capture.signal));

    let rt  = Runtime::new()?;
    let ctl = Arc::new(Controller::new(cfg, engine, signal));

    let result = rt.block_on(run(ctl.clone(), &device, filter, output, native, save, shutdown));

    if let Err(e) = rt.block_on(ctl.close()) {
        warn!("failed to close engine: {}", e);
    }

    result
}

pub fn replay(args: &ArgMatches) -> Result<()> {
    let path   = value_t!(args, "file", String)?;
    let filter = opt::<Filter>(args.value_of("filter"))?.unwrap_or_default();
    let output = opt(args.value_of("output"))?.unwrap_or(Output::Log);

    let records = load(BufReader::new(File::open(&path)?))?;
    let agg     = Aggregator::new(Arc::new(stats::Config::default()));

    let mut matched = 0;
    for rec in records.iter().filter(|rec| filter.matches(rec)) {
        agg.record_packet(rec);
        matched += 1;
    }

    info!("{}: {} of {} records matched", path, matched, records.len());

    report(&agg.tick()?, output);

    Ok(())
}

async fn run(
    ctl:      Arc<Controller>,
    device:   &str,
    filter:   Filter,
    output:   Output,
    native:   bool,
    save:     Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let devices = ctl.devices(ctl.enumeration_timeout()).await?;
    let device  = select(&devices, device)?;

    if native {
        ctl.configure(Setting::Source(Source::Native))?;
    }

    let stats   = tokio::spawn(publish(ctl.statistics(), output));
    let packets = tokio::spawn(record(ctl.filtered_batches(filter), save));

    info!("capturing on {}", device);

    ctl.start(device.index).await?;

    while !shutdown.load(Ordering::Acquire) {
        sleep(Duration::from_millis(100)).await;
    }

    info!("shutting down");

    ctl.stop().await?;

    match packets.await? {
        Ok(n)  => info!("{} packets matched", n),
        Err(e) => warn!("packet consumer failed: {:?}", e),
    }

    stats.abort();

    Ok(())
}

fn select<'a>(devices: &'a [Device], arg: &str) -> Result<&'a Device> {
    if let Ok(index) = arg.parse::<usize>() {
        return devices.get(index).ok_or_else(|| anyhow!("no device {}", index));
    }

    let pattern = Regex::new(arg)?;
    engine::find(devices, &pattern).ok_or_else(|| anyhow!("no device matches '{}'", arg))
}

async fn publish<S: Stream<Item = Arc<Snapshot>>>(stats: S, output: Output) {
    let mut stats = Box::pin(stats);
    while let Some(snapshot) = stats.next().await {
        report(&snapshot, output);
    }
}

async fn record<S>(batches: S, save: Option<PathBuf>) -> Result<usize>
where
    S: Stream<Item = Vec<Arc<PacketRecord>>>,
{
    let mut file    = save.map(File::create).transpose()?.map(BufWriter::new);
    let mut batches = Box::pin(batches);
    let mut count   = 0;

    while let Some(batch) = batches.next().await {
        for rec in &batch {
            debug!("{}", rec);
        }

        if let Some(file) = file.as_mut() {
            capture::save(file, &batch[..])?;
        }

        count += batch.len();
    }

    Ok(count)
}

fn report(snapshot: &Snapshot, output: Output) {
    match output {
        Output::Log  => info!("{}", snapshot),
        Output::Json => match serde_json::to_string(snapshot) {
            Ok(json) => println!("{}", json),
            Err(e)   => warn!("snapshot encoding failed: {}", e),
        },
    }
}

fn config(args: &ArgMatches) -> Result<session::Config> {
    let mut cfg = session::Config::default();

    if let Some(endpoint) = args.value_of("endpoint") {
        cfg.capture.endpoint = endpoint.parse().map_err(|e: String| anyhow!(e))?;
    }

    if let Some(signal) = args.value_of("signal") {
        cfg.capture.signal = signal.to_owned();
    }

    if let Some(timeout) = millis(args.value_of("connect-timeout"))? {
        cfg.capture.connect_timeout = timeout;
    }

    if let Some(timeout) = millis(args.value_of("enumeration-timeout"))? {
        cfg.enumeration = timeout;
    }

    Ok(cfg)
}

fn command(args: &ArgMatches) -> Result<Arc<dyn Engine>> {
    let program = value_t!(args, "engine", String)?;
    let extra   = args.values_of("engine-arg").map(|vs| {
        vs.map(String::from).collect::<Vec<_>>()
    }).unwrap_or_default();
    Ok(Arc::new(engine::Command::new(program, extra)))
}

impl FromStr for Output {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log"  => Ok(Output::Log),
            "json" => Ok(Output::Json),
            _      => Err(format!("unknown output '{}'", s)),
        }
    }
}
