//! Packet buffering for interval management

use crate::{ArchiveError, ArchiveResult};
use std::collections::VecDeque;
use weex_core::{LoopPacket, Timestamp};

/// Buffer for collecting packets within an interval.
///
/// Intervals end on multiples of the interval length and include their end
/// time, so a packet stamped exactly on a boundary closes that interval.
pub struct PacketBuffer {
    interval: i64,
    packets: VecDeque<LoopPacket>,
    current_interval_end: Option<Timestamp>,
    max_packets: usize,
}

impl PacketBuffer {
    /// Create a new packet buffer with specified interval (seconds)
    pub fn new(interval: i64) -> ArchiveResult<Self> {
        if interval <= 0 {
            return Err(ArchiveError::InvalidInterval(format!("{interval} seconds")));
        }
        // Worst case a packet every half second
        let max_packets = usize::try_from(interval * 2).unwrap_or(usize::MAX).max(100);

        Ok(Self {
            interval,
            packets: VecDeque::new(),
            current_interval_end: None,
            max_packets,
        })
    }

    /// Add a packet to the buffer.
    ///
    /// When the packet lies past the current interval, the current interval
    /// is returned as `(end_time, packets)` and the packet starts the next
    /// one.
    pub fn add(&mut self, packet: LoopPacket) -> ArchiveResult<Option<(Timestamp, Vec<LoopPacket>)>> {
        let packet_time = packet.date_time;

        let completed = match self.current_interval_end {
            Some(end) if packet_time > end => self.take(),
            _ => None,
        };

        if self.packets.len() >= self.max_packets {
            return Err(ArchiveError::BufferOverflow);
        }
        if self.current_interval_end.is_none() {
            self.current_interval_end = Some(self.calculate_interval_end(packet_time));
        }
        self.packets.push_back(packet);

        Ok(completed)
    }

    /// Remove the current interval's packets, if any
    pub fn take(&mut self) -> Option<(Timestamp, Vec<LoopPacket>)> {
        let end = self.current_interval_end.take()?;
        let packets: Vec<_> = self.packets.drain(..).collect();
        Some((end, packets))
    }

    /// Calculate interval end time for a given timestamp
    fn calculate_interval_end(&self, timestamp: Timestamp) -> Timestamp {
        (timestamp + self.interval - 1).div_euclid(self.interval) * self.interval
    }

    /// Get current packet count
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Get current interval end time
    pub fn interval_end(&self) -> Option<Timestamp> {
        self.current_interval_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weex_core::UnitSystem;

    fn make_packet(timestamp: i64) -> LoopPacket {
        LoopPacket::new(timestamp, UnitSystem::Us).with("outTemp", 25.0)
    }

    #[test]
    fn test_buffer_single_interval() {
        let mut buffer = PacketBuffer::new(300).unwrap();

        assert!(buffer.add(make_packet(100)).unwrap().is_none());
        assert!(buffer.add(make_packet(200)).unwrap().is_none());
        // Boundary packet still belongs to the interval it ends
        assert!(buffer.add(make_packet(300)).unwrap().is_none());

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.interval_end(), Some(300));
    }

    #[test]
    fn test_buffer_interval_boundary() {
        let mut buffer = PacketBuffer::new(300).unwrap();

        buffer.add(make_packet(100)).unwrap();
        buffer.add(make_packet(250)).unwrap();

        let (end, packets) = buffer.add(make_packet(400)).unwrap().unwrap();
        assert_eq!(end, 300);
        assert_eq!(packets.len(), 2);

        // The crossing packet opened the next interval
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.interval_end(), Some(600));
    }

    #[test]
    fn test_buffer_skips_empty_intervals() {
        let mut buffer = PacketBuffer::new(300).unwrap();
        buffer.add(make_packet(100)).unwrap();

        let (end, _) = buffer.add(make_packet(1000)).unwrap().unwrap();
        assert_eq!(end, 300);
        assert_eq!(buffer.interval_end(), Some(1200));
    }

    #[test]
    fn test_buffer_take() {
        let mut buffer = PacketBuffer::new(300).unwrap();

        buffer.add(make_packet(100)).unwrap();
        buffer.add(make_packet(200)).unwrap();

        let (end, packets) = buffer.take().unwrap();
        assert_eq!(end, 300);
        assert_eq!(packets.len(), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.interval_end(), None);
        assert!(buffer.take().is_none());
    }

    #[test]
    fn test_calculate_interval_end() {
        let buffer = PacketBuffer::new(300).unwrap();

        assert_eq!(buffer.calculate_interval_end(1), 300);
        assert_eq!(buffer.calculate_interval_end(100), 300);
        assert_eq!(buffer.calculate_interval_end(300), 300);
        assert_eq!(buffer.calculate_interval_end(301), 600);
        assert_eq!(buffer.calculate_interval_end(600), 600);
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(matches!(
            PacketBuffer::new(0),
            Err(ArchiveError::InvalidInterval(_))
        ));
    }
}
