//! Archive interval aggregation logic

use crate::{ArchiveError, ArchiveResult, PacketBuffer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use weex_core::{
    Accumulator, AccumulatorConfig, ArchiveRecord, Extractor, Interval, LoopPacket, Timestamp,
    UnitModel, UnitSystem, ValueTuple, VectorSum,
};
use weex_db::DbClient;

/// Folds the packets of one interval into an archive record.
///
/// Holds the last reading of every cumulative counter so that an interval's
/// total includes the increment since the previous interval's final packet.
pub struct Consolidator {
    model: Arc<UnitModel>,
    unit_system: UnitSystem,
    interval_secs: i64,
    config: AccumulatorConfig,
    counters: HashMap<String, (f64, Timestamp)>,
}

impl Consolidator {
    pub fn new(
        model: Arc<UnitModel>,
        unit_system: UnitSystem,
        interval_secs: i64,
        config: AccumulatorConfig,
    ) -> ArchiveResult<Self> {
        if interval_secs <= 0 || interval_secs % 60 != 0 {
            return Err(ArchiveError::InvalidInterval(format!(
                "{interval_secs} seconds is not a whole number of minutes"
            )));
        }
        Ok(Self {
            model,
            unit_system,
            interval_secs,
            config,
            counters: HashMap::new(),
        })
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    pub fn interval_secs(&self) -> i64 {
        self.interval_secs
    }

    /// Build the record for the interval ending at `end_time`
    pub fn consolidate(&mut self, end_time: Timestamp, packets: &[LoopPacket]) -> ArchiveResult<ArchiveRecord> {
        let mut accumulators: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut wind = VectorSum::new();

        for packet in packets {
            let converted = self.to_database_units(packet)?;

            for (obs_type, value) in &converted {
                accumulators
                    .entry(obs_type.clone())
                    .or_insert_with(|| self.start_accumulator(obs_type))
                    .add_sample(packet.date_time, *value);
            }

            let speed = converted.get("windSpeed").copied().flatten();
            let direction = converted.get("windDir").copied().flatten();
            wind.add(packet.date_time, speed, direction);
        }

        let minutes = Interval::try_from(self.interval_secs / 60)
            .map_err(|_| ArchiveError::InvalidInterval(format!("{} seconds", self.interval_secs)))?;
        let mut record = ArchiveRecord::new(end_time, self.unit_system, minutes);

        for (obs_type, acc) in accumulators {
            if acc.extractor() == Extractor::Delta {
                if let Some(last) = acc.last() {
                    self.counters.insert(obs_type.clone(), last);
                }
            }
            record.values.insert(obs_type, acc.finalize().raw());
        }

        if wind.count() > 0 {
            record.values.insert("windDir".to_string(), wind.direction());
        }
        if !record.values.contains_key("windGust") {
            if let Some((peak, direction, _)) = wind.peak() {
                record.values.insert("windGust".to_string(), Some(peak));
                record.values.insert("windGustDir".to_string(), direction);
            }
        }

        Ok(record)
    }

    fn start_accumulator(&self, obs_type: &str) -> Accumulator {
        let (unit, group) = self.model.std_unit(self.unit_system, obs_type);
        let mut acc = self.config.accumulator(obs_type, unit, group);
        if acc.extractor() == Extractor::Delta {
            if let Some((value, ts)) = self.counters.get(obs_type) {
                acc.set_baseline(*ts, *value);
            }
        }
        acc
    }

    /// Packet values expressed in the database unit system
    fn to_database_units(&self, packet: &LoopPacket) -> ArchiveResult<BTreeMap<String, Option<f64>>> {
        if packet.us_units == self.unit_system {
            return Ok(packet.observations.clone());
        }

        let mut converted = BTreeMap::new();
        for (obs_type, value) in &packet.observations {
            let value = match (value, self.model.group_of(obs_type)) {
                (Some(v), Some(_)) => {
                    let vt: ValueTuple = self.model.value_tuple(obs_type, *v, packet.us_units);
                    self.model.convert_std(&vt, self.unit_system)?.raw()
                }
                (value, _) => *value,
            };
            converted.insert(obs_type.clone(), value);
        }
        Ok(converted)
    }
}

/// Aggregator for converting packets to archive records
pub struct IntervalAggregator {
    buffer: PacketBuffer,
    consolidator: Consolidator,
    db_client: DbClient,
}

impl IntervalAggregator {
    /// Create a new aggregator writing to `db_client` every `interval_secs`
    pub fn new(
        interval_secs: i64,
        model: Arc<UnitModel>,
        config: AccumulatorConfig,
        db_client: DbClient,
    ) -> ArchiveResult<Self> {
        Ok(Self {
            buffer: PacketBuffer::new(interval_secs)?,
            consolidator: Consolidator::new(model, db_client.unit_system(), interval_secs, config)?,
            db_client,
        })
    }

    /// Add a LOOP packet; returns the archive record written if the packet
    /// completed an interval
    #[instrument(skip(self, packet), fields(date_time = packet.date_time))]
    pub async fn add_packet(&mut self, packet: LoopPacket) -> ArchiveResult<Option<ArchiveRecord>> {
        match self.buffer.add(packet)? {
            Some((end_time, packets)) => self.flush_interval(end_time, packets).await,
            None => Ok(None),
        }
    }

    async fn flush_interval(
        &mut self,
        end_time: Timestamp,
        packets: Vec<LoopPacket>,
    ) -> ArchiveResult<Option<ArchiveRecord>> {
        if packets.is_empty() {
            debug!("No packets to flush for interval ending at {}", end_time);
            return Ok(None);
        }

        info!(
            "Flushing {} packets for interval ending at {}",
            packets.len(),
            end_time
        );

        let record = self.consolidator.consolidate(end_time, &packets)?;
        match self.db_client.add_record(&record).await {
            Ok(()) => {}
            Err(weex_db::DbError::DuplicateRecord(ts)) => {
                warn!("Archive already holds a record at {}, interval dropped", ts);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        info!("Archive record written for timestamp {}", end_time);
        Ok(Some(record))
    }

    /// Force flush current buffer (for shutdown)
    pub async fn force_flush(&mut self) -> ArchiveResult<Option<ArchiveRecord>> {
        match self.buffer.take() {
            Some((end_time, packets)) => self.flush_interval(end_time, packets).await,
            None => Ok(None),
        }
    }

    /// Get current interval setting in seconds
    pub fn interval(&self) -> i64 {
        self.consolidator.interval_secs()
    }

    /// Get current unit system
    pub fn unit_system(&self) -> UnitSystem {
        self.consolidator.unit_system()
    }

    /// Packets waiting for their interval to close
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
