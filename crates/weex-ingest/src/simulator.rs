//! Simulated weather station for testing

use crate::{DriverFactory, DriverOptions, IngestError, IngestResult, StationDriver};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;
use tokio::time::{sleep, Duration};
use weex_core::{LoopPacket, Timestamp, UnitSystem};

/// How the simulator advances time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorMode {
    /// Wall clock, sleeping between packets
    Realtime,
    /// Virtual clock from a fixed start, as fast as packets are read
    Generator,
}

impl FromStr for SimulatorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "realtime" => Ok(SimulatorMode::Realtime),
            "generator" => Ok(SimulatorMode::Generator),
            other => Err(format!("unknown simulator mode {other:?}")),
        }
    }
}

impl fmt::Display for SimulatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SimulatorMode::Realtime => "realtime",
            SimulatorMode::Generator => "generator",
        })
    }
}

/// A smoothly varying observation: `average + amplitude * sin(phase)`
#[derive(Debug, Clone, Copy)]
struct Wave {
    average: f64,
    amplitude: f64,
    period_secs: f64,
    phase_secs: f64,
}

impl Wave {
    const fn new(average: f64, amplitude: f64, period_secs: f64, phase_secs: f64) -> Self {
        Self {
            average,
            amplitude,
            period_secs,
            phase_secs,
        }
    }

    fn at(&self, ts: Timestamp) -> f64 {
        let angle = TAU * (ts as f64 - self.phase_secs) / self.period_secs;
        self.average + self.amplitude * angle.sin()
    }
}

const HOUR: f64 = 3600.0;
const DAY: f64 = 86_400.0;

// US customary units
const OUT_TEMP: Wave = Wave::new(50.0, 28.0, DAY, 9.0 * HOUR);
const IN_TEMP: Wave = Wave::new(68.0, 2.0, DAY, 12.0 * HOUR);
const OUT_HUMIDITY: Wave = Wave::new(70.0, 25.0, DAY, 21.0 * HOUR);
const BAROMETER: Wave = Wave::new(30.1, 0.4, 2.0 * DAY, 0.0);
const WIND_SPEED: Wave = Wave::new(6.0, 6.0, 6.0 * HOUR, 0.0);
const WIND_DIR: Wave = Wave::new(180.0, 180.0, 8.0 * HOUR, 0.0);
/// Rain falls while this wave is above `RAIN_ONSET`
const STORM: Wave = Wave::new(0.0, 1.0, 12.0 * HOUR, 0.0);
const RAIN_ONSET: f64 = 0.8;
/// Inches per hour at the height of a storm
const RAIN_RATE: f64 = 0.5;

/// Simulator driver that generates synthetic weather data.
///
/// Rain is reported the way most consoles do it: as a cumulative counter
/// that only grows.
pub struct SimulatorDriver {
    loop_interval: u64,
    mode: SimulatorMode,
    active: bool,
    clock: Timestamp,
    rain_counter: f64,
}

impl SimulatorDriver {
    /// Create a real-time simulator emitting a packet every `loop_interval`
    /// seconds
    pub fn new(loop_interval: u64) -> Self {
        Self {
            loop_interval,
            mode: SimulatorMode::Realtime,
            active: false,
            clock: 0,
            rain_counter: 0.0,
        }
    }

    /// Create a simulator on a virtual clock starting at `start`
    pub fn generator(loop_interval: u64, start: Timestamp) -> Self {
        Self {
            loop_interval,
            mode: SimulatorMode::Generator,
            active: false,
            clock: start,
            rain_counter: 0.0,
        }
    }

    pub fn mode(&self) -> SimulatorMode {
        self.mode
    }

    fn generate_packet(&mut self, now: Timestamp) -> LoopPacket {
        let elapsed = if self.clock > 0 && now > self.clock {
            (now - self.clock) as f64
        } else {
            0.0
        };
        let storm = STORM.at(now);
        if storm > RAIN_ONSET {
            let intensity = (storm - RAIN_ONSET) / (1.0 - RAIN_ONSET);
            self.rain_counter += RAIN_RATE * intensity * elapsed / HOUR;
        }
        self.clock = now;

        let speed = WIND_SPEED.at(now).max(0.0);
        LoopPacket::new(now, UnitSystem::Us)
            .with("outTemp", OUT_TEMP.at(now))
            .with("inTemp", IN_TEMP.at(now))
            .with("outHumidity", OUT_HUMIDITY.at(now).clamp(0.0, 100.0))
            .with("barometer", BAROMETER.at(now))
            .with("windSpeed", speed)
            .with("windDir", (speed > 0.0).then(|| WIND_DIR.at(now).rem_euclid(360.0)))
            .with("rain", self.rain_counter)
    }

    fn next_timestamp(&self) -> Timestamp {
        match self.mode {
            SimulatorMode::Realtime => chrono::Utc::now().timestamp(),
            SimulatorMode::Generator => self.clock + self.loop_interval as Timestamp,
        }
    }
}

/// Builds simulators from `mode` (`realtime` or `generator`) and, for
/// generator mode, `start` (epoch seconds, now when absent)
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatorFactory;

impl SimulatorFactory {
    const SETTINGS: &'static [&'static str] = &["mode", "start"];
}

impl DriverFactory for SimulatorFactory {
    fn create(&self, options: &DriverOptions) -> IngestResult<Box<dyn StationDriver>> {
        self.validate(options)?;
        let mode = options.parse::<SimulatorMode>("mode")?.unwrap_or(SimulatorMode::Realtime);
        Ok(match mode {
            SimulatorMode::Realtime => Box::new(SimulatorDriver::new(options.loop_interval)),
            SimulatorMode::Generator => {
                let start = options
                    .parse::<Timestamp>("start")?
                    .unwrap_or_else(|| chrono::Utc::now().timestamp());
                Box::new(SimulatorDriver::generator(options.loop_interval, start))
            }
        })
    }

    fn validate(&self, options: &DriverOptions) -> IngestResult<()> {
        options.expect_only("simulator", Self::SETTINGS)?;
        if options.loop_interval == 0 {
            return Err(IngestError::Config("simulator needs a loop interval of at least 1s".to_string()));
        }
        options.parse::<SimulatorMode>("mode")?;
        options.parse::<Timestamp>("start")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StationDriver for SimulatorDriver {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn start(&mut self) -> IngestResult<()> {
        if self.active {
            return Err(IngestError::DriverError(
                "Driver already started".to_string(),
            ));
        }
        self.active = true;
        tracing::info!(
            "Simulator driver started in {:?} mode with {}s loop interval",
            self.mode,
            self.loop_interval
        );
        Ok(())
    }

    async fn stop(&mut self) -> IngestResult<()> {
        if !self.active {
            return Err(IngestError::DriverError(
                "Driver not started".to_string(),
            ));
        }
        self.active = false;
        tracing::info!("Simulator driver stopped");
        Ok(())
    }

    async fn get_packet(&mut self) -> IngestResult<LoopPacket> {
        if !self.active {
            return Err(IngestError::DriverError("Driver not active".to_string()));
        }

        if self.mode == SimulatorMode::Realtime {
            sleep(Duration::from_secs(self.loop_interval)).await;
        }

        let now = self.next_timestamp();
        Ok(self.generate_packet(now))
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
