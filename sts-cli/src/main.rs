use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::process;
use sts_lib::analysis;
use sts_lib::constants::PIXEL_COUNT;
use sts_lib::{DeviceConfig, Line, Sts, TemperatureSensor, list_spectrometers};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Command line control of an Ocean Optics STS spectrometer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file with connection and timing settings.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Which attached spectrometer to use, overriding the config file.
    #[arg(short, long, global = true)]
    index: Option<usize>,
    /// Communication line (1 or 2).
    #[arg(short, long, global = true, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    line: u8,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List attached spectrometers.
    List,
    /// Show identity, optical bench and firmware information.
    Info,
    /// Acquire one spectrum and print it as CSV (wavelength,intensity).
    Spectrum {
        /// Integration time in microseconds.
        #[arg(short = 't', long)]
        integration_us: Option<u32>,
        /// Scans to average.
        #[arg(short, long)]
        scans: Option<u16>,
        /// Boxcar width.
        #[arg(short, long)]
        boxcar: Option<u8>,
        /// Read the raw spectrum instead of the corrected one.
        #[arg(long)]
        raw: bool,
    },
    /// Show the acquisition settings.
    Settings,
    /// Show the stored calibration coefficients.
    Coefficients,
    /// Read all temperature sensors.
    Temperature,
    /// Reset the device.
    Reset,
}

fn setup_logging(verbosity: &Verbosity<InfoLevel>) {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry().with(filter).with(console_layer).init();
}

fn load_config(cli: &Cli) -> Result<DeviceConfig> {
    let mut config = match &cli.config {
        Some(path) => DeviceConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => DeviceConfig::default(),
    };
    if let Some(index) = cli.index {
        config.device_index = index;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{:?}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let line = Line::try_from(cli.line).map_err(|_| anyhow!("line must be 1 or 2"))?;

    match cli.command {
        Cmd::List => list(&config),
        Cmd::Info => info_cmd(&open(config).await?, line).await,
        Cmd::Spectrum {
            integration_us,
            scans,
            boxcar,
            raw,
        } => spectrum(&open(config).await?, line, integration_us, scans, boxcar, raw).await,
        Cmd::Settings => settings(&open(config).await?, line).await,
        Cmd::Coefficients => coefficients(&open(config).await?, line).await,
        Cmd::Temperature => temperature(&open(config).await?, line).await,
        Cmd::Reset => {
            open(config).await?.reset(line).await;
            info!("Reset sent");
            Ok(())
        }
    }
}

async fn open(config: DeviceConfig) -> Result<Sts> {
    Sts::open(config).await.context("Failed to open spectrometer")
}

fn list(config: &DeviceConfig) -> Result<()> {
    let devices = list_spectrometers(config.vendor_id, config.product_id)?;
    if devices.is_empty() {
        println!("No spectrometers found");
    }
    for (index, device) in devices.iter().enumerate() {
        println!(
            "[{}] bus {:03} addr {:03} serial {}",
            index,
            device.bus_number(),
            device.device_address(),
            device.serial_number().unwrap_or("?")
        );
    }
    Ok(())
}

async fn info_cmd(sts: &Sts, line: Line) -> Result<()> {
    println!("Serial:            {}", sts.get_serial(line).await?);
    println!("Alias:             {}", sts.get_alias(line).await?);
    println!("Hardware revision: {}", sts.get_hardware_revision(line).await?);
    println!("Firmware revision: {:#06x}", sts.get_firmware_revision(line).await?);
    println!("Bench ID:          {}", sts.get_bench_id(line).await?);
    println!("Bench serial:      {}", sts.get_bench_serial(line).await?);
    println!("Slit width:        {} um", sts.get_slit_width(line).await?);
    println!("Fiber diameter:    {} um", sts.get_fiber_diameter(line).await?);
    println!("Grating:           {}", sts.get_grating(line).await?);
    println!("Filter:            {}", sts.get_filter(line).await?);
    println!("Coating:           {}", sts.get_coating(line).await?);

    let count = sts.get_user_string_count(line).await?;
    for index in 0..count {
        let text = sts.get_user_string(index, line).await?;
        if !text.is_empty() {
            println!("User string {}:     {}", index, text);
        }
    }
    Ok(())
}

async fn spectrum(
    sts: &Sts,
    line: Line,
    integration_us: Option<u32>,
    scans: Option<u16>,
    boxcar: Option<u8>,
    raw: bool,
) -> Result<()> {
    if let Some(us) = integration_us {
        sts.set_integration_time(us, line).await?;
    }
    if let Some(scans) = scans {
        sts.set_scans_to_avg(scans, line).await?;
    }
    if let Some(width) = boxcar {
        sts.set_boxcar(width, line).await?;
    }

    let counts = if raw {
        sts.get_raw_spectrum(line).await?
    } else {
        sts.get_corrected_spectrum(line).await?
    };
    info!("Read {} pixels", counts.len());

    let wavelengths = sts.wavelengths(counts.len(), line).await?;
    println!("wavelength_nm,intensity");
    for (wl, count) in wavelengths.iter().zip(&counts) {
        println!("{:.3},{}", wl, count);
    }
    Ok(())
}

async fn settings(sts: &Sts, line: Line) -> Result<()> {
    println!("Scans to average:   {}", sts.get_scans_to_avg(line).await?);
    println!("Boxcar width:       {}", sts.get_boxcar(line).await?);
    println!("Binning factor:     {}", sts.get_pixel_binning_factor(line).await?);
    println!("Default binning:    {}", sts.get_default_binning_factor(line).await?);
    println!("Max binning:        {}", sts.get_max_binning_factor(line).await?);
    println!("GPIO pins:          {}", sts.get_gpio_pin_count(line).await?);
    Ok(())
}

async fn coefficients(sts: &Sts, line: Line) -> Result<()> {
    let wavelengths = sts.wavelengths(PIXEL_COUNT, line).await?;
    let count = sts.get_wav_coeff_count(line).await?;
    for index in 0..count {
        println!("Wavelength[{}]:    {:e}", index, sts.get_wav_coeff(index, line).await?);
    }
    if let (Some(first), Some(last)) = (wavelengths.first(), wavelengths.last()) {
        println!("Range:            {:.2} - {:.2} nm", first, last);
    }

    for (index, coeff) in sts.nonlinearity_coefficients(line).await?.iter().enumerate() {
        println!("Nonlinearity[{}]:  {:e}", index, coeff);
    }

    let count = sts.get_stray_light_coeff_count(line).await?;
    for order in 0..count {
        println!("Stray light[{}]:   {:e}", order, sts.get_stray_light_coeff(order, line).await?);
    }

    match sts.get_irrad_calib(line).await? {
        Some(values) => println!("Irradiance:       {} values", values.len()),
        None => println!("Irradiance:       not stored"),
    }
    match sts.get_irrad_calib_area(line).await? {
        Some(area) => println!("Collection area:  {} cm^2", area),
        None => println!(
            "Collection area:  not stored ({:.6} cm^2 for a {} cm core)",
            analysis::fiber_collection_area(analysis::DEFAULT_FIBER_CORE_CM),
            analysis::DEFAULT_FIBER_CORE_CM
        ),
    }

    let hot = sts.get_hot_pixel_indices(line).await?;
    println!("Hot pixels:       {:?}", hot);
    Ok(())
}

async fn temperature(sts: &Sts, line: Line) -> Result<()> {
    let temps = sts.read_all_temperatures(line).await?;
    for (sensor, temp) in [
        TemperatureSensor::DetectorBoard,
        TemperatureSensor::Reserved,
        TemperatureSensor::Microcontroller,
    ]
    .iter()
    .zip(temps)
    {
        println!("{:<16} {:.2} °C", sensor.to_string(), temp);
    }
    Ok(())
}
