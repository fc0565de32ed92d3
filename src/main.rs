use clap::Parser;
use std::time::Duration;
use tank_monitor::{
    config, signal, ConnectionState, Metric, MonitorConfig, MonitorEvent, Reconciler,
    SensorReading, SourceConfig, Status, Trend,
};

/// Terminal readout for the milk-tank sensor dashboard
#[derive(Parser)]
#[command(name = "tank-monitor", version, about)]
struct Cli {
    /// WebSocket endpoint of the sensor device
    #[arg(long, env = "TANK_MONITOR_URL", default_value = config::DEFAULT_ENDPOINT)]
    url: String,

    /// Generate synthetic readings instead of connecting to a device
    #[arg(long)]
    mock: bool,

    /// Cadence of the synthetic generator in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_SYNTHETIC_INTERVAL_MS)]
    interval_ms: u64,

    /// Number of readings to keep for charting
    #[arg(long, default_value_t = config::DEFAULT_HISTORY_CAPACITY)]
    history: usize,

    /// Print readouts as JSON lines
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(serde::Serialize)]
struct Readout<'a> {
    connection: ConnectionState,
    reading: &'a SensorReading,
    temperature_trend: Trend,
    temperature_status: Status,
    level_trend: Trend,
    level_status: Status,
}

fn print_readout(reconciler: &Reconciler, json: bool) {
    let snapshot = reconciler.history_snapshot();
    let connection = reconciler.connection_state();

    if snapshot.is_empty() {
        if !json {
            println!("({}, waiting for data)", connection);
        }
        return;
    }

    let latest = reconciler.latest();
    let temperature_trend = signal::trend_for(&snapshot, Metric::Temperature);
    let temperature_status = signal::status_for(&snapshot, Metric::Temperature);
    let level_trend = signal::trend_for(&snapshot, Metric::MilkLevel);
    let level_status = signal::status_for(&snapshot, Metric::MilkLevel);

    if json {
        let readout = Readout {
            connection,
            reading: &latest,
            temperature_trend,
            temperature_status,
            level_trend,
            level_status,
        };
        match serde_json::to_string(&readout) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("Failed to serialize readout: {}", e),
        }
        return;
    }

    let clock = chrono::DateTime::from_timestamp_millis(latest.timestamp_ms)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let mut line = format!(
        "{}  temp {:5.1} {} {} [{}]  level {:5.1} % {} [{}]",
        clock,
        latest.temperature,
        Metric::Temperature.unit(),
        temperature_trend,
        temperature_status,
        latest.milk_level,
        level_trend,
        level_status,
    );
    if let Some(pressure) = latest.pressure {
        line.push_str(&format!("  pressure {:7.1} hPa", pressure));
    }
    if let Some(buzzer) = latest.buzzer {
        line.push_str(&format!("  buzzer {}", if buzzer { "ON" } else { "off" }));
    }
    if connection == ConnectionState::Disconnected {
        line.push_str("  (disconnected, last-known values)");
    }
    println!("{}", line);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let source = if cli.mock {
        SourceConfig::Synthetic {
            interval_ms: cli.interval_ms,
        }
    } else {
        SourceConfig::WebSocket {
            url: cli.url.clone(),
        }
    };

    let monitor_config = MonitorConfig {
        source,
        history_capacity: cli.history,
        ..Default::default()
    };

    let mut reconciler = Reconciler::new(monitor_config)?;

    reconciler.set_event_callback(|event| match event {
        MonitorEvent::ConnectionChanged { state, reason, .. } => match reason {
            Some(reason) => log::warn!("Connection {}: {}", state, reason),
            None => log::info!("Connection {}", state),
        },
        MonitorEvent::DecodeError { message, .. } => {
            log::debug!("Dropped malformed payload: {}", message)
        }
        MonitorEvent::ReadingReceived { .. } => {}
    });

    reconciler.start().await?;
    eprintln!(
        "Session {} started ({}), ctrl-c to stop",
        reconciler.session_id(),
        reconciler.connection_state()
    );

    let mut tick = tokio::time::interval(Duration::from_millis(cli.interval_ms.max(250)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tick.tick() => print_readout(&reconciler, cli.json),
        }
    }

    reconciler.stop().await?;
    let stats = reconciler.stats();
    eprintln!(
        "Session ended: {} readings received, {} malformed payloads dropped",
        stats.readings_received, stats.decode_failures
    );

    Ok(())
}
