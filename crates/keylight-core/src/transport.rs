use keylight_ports::playback::TempoPoint;
use keylight_ports::types::{Micros, Tick};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

#[derive(Clone, Debug)]
pub struct TempoMap {
    ppq: u16,
    segments: Vec<TempoSegment>,
}

#[derive(Clone, Copy, Debug)]
struct TempoSegment {
    start_tick: Tick,
    start_us: Micros,
    us_per_quarter: u32,
}

impl TempoMap {
    pub fn new(ppq: u16, mut points: Vec<TempoPoint>) -> Self {
        let ppq = ppq.max(1);
        points.retain(|p| p.us_per_quarter > 0);
        points.sort_by_key(|p| p.tick);
        if points.first().map_or(true, |p| p.tick != 0) {
            points.insert(
                0,
                TempoPoint {
                    tick: 0,
                    us_per_quarter: 500_000,
                },
            );
        }

        let mut segments: Vec<TempoSegment> = Vec::with_capacity(points.len());
        for point in points {
            let start_us = match segments.last() {
                Some(prev) => {
                    prev.start_us + ticks_to_us(point.tick - prev.start_tick, prev.us_per_quarter, ppq)
                }
                None => 0,
            };
            segments.push(TempoSegment {
                start_tick: point.tick,
                start_us,
                us_per_quarter: point.us_per_quarter,
            });
        }

        Self { ppq, segments }
    }

    pub fn tick_to_micros(&self, tick: Tick) -> Micros {
        let seg = self.segment_where(|seg| seg.start_tick <= tick);
        seg.start_us + ticks_to_us(tick - seg.start_tick, seg.us_per_quarter, self.ppq)
    }

    pub fn micros_to_tick(&self, micros: Micros) -> Tick {
        let seg = self.segment_where(|seg| seg.start_us <= micros);
        seg.start_tick + us_to_ticks(micros - seg.start_us, seg.us_per_quarter, self.ppq)
    }

    // segments are sorted, so the last one satisfying `reached` is the active one
    fn segment_where(&self, reached: impl Fn(&TempoSegment) -> bool) -> TempoSegment {
        let mut current = self.segments[0];
        for seg in &self.segments {
            if !reached(seg) {
                break;
            }
            current = *seg;
        }
        current
    }
}

/// Wall-clock song position, advanced explicitly by the owner.
#[derive(Clone, Debug)]
pub struct Transport {
    state: TransportState,
    tempo_map: TempoMap,
    tempo_multiplier: f32,
    position_us: Micros,
}

impl Transport {
    pub fn new(ppq: u16, tempo_points: Vec<TempoPoint>) -> Self {
        Self {
            state: TransportState::Stopped,
            tempo_map: TempoMap::new(ppq, tempo_points),
            tempo_multiplier: 1.0,
            position_us: 0,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.position_us = 0;
    }

    pub fn set_tempo_multiplier(&mut self, multiplier: f32) {
        self.tempo_multiplier = multiplier.max(0.1);
    }

    /// Moves the song position forward by `elapsed_us` of real time.
    pub fn advance_by(&mut self, elapsed_us: Micros) {
        if self.state != TransportState::Playing || elapsed_us <= 0 {
            return;
        }
        let scaled = (elapsed_us as f64 * self.tempo_multiplier as f64).round() as Micros;
        self.position_us = self.position_us.saturating_add(scaled);
    }

    pub fn now_tick(&self) -> Tick {
        self.tempo_map.micros_to_tick(self.position_us)
    }
}

fn ticks_to_us(ticks: Tick, us_per_quarter: u32, ppq: u16) -> Micros {
    ((ticks as i128 * us_per_quarter as i128) / ppq as i128) as Micros
}

fn us_to_ticks(us: Micros, us_per_quarter: u32, ppq: u16) -> Tick {
    ((us as i128 * ppq as i128) / us_per_quarter as i128) as Tick
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_with_tempo_changes() {
        // 120 bpm for one quarter, then 60 bpm
        let map = TempoMap::new(
            480,
            vec![
                TempoPoint {
                    tick: 0,
                    us_per_quarter: 500_000,
                },
                TempoPoint {
                    tick: 480,
                    us_per_quarter: 1_000_000,
                },
            ],
        );

        assert_eq!(map.tick_to_micros(480), 500_000);
        assert_eq!(map.tick_to_micros(960), 1_500_000);
        assert_eq!(map.micros_to_tick(1_500_000), 960);
        assert_eq!(map.micros_to_tick(250_000), 240);
    }

    #[test]
    fn only_advances_while_playing() {
        let mut transport = Transport::new(480, Vec::new());
        transport.advance_by(500_000);
        assert_eq!(transport.now_tick(), 0);

        transport.play();
        transport.advance_by(500_000);
        assert_eq!(transport.now_tick(), 480);

        transport.pause();
        transport.advance_by(500_000);
        assert_eq!(transport.now_tick(), 480);
    }

    #[test]
    fn tempo_multiplier_scales_elapsed_time() {
        let mut transport = Transport::new(480, Vec::new());
        transport.set_tempo_multiplier(2.0);
        transport.play();
        transport.advance_by(250_000);
        assert_eq!(transport.now_tick(), 480);
    }
}
