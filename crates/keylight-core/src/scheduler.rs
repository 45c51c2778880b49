use keylight_ports::playback::{
    ActiveNote, PlaybackFrame, PlaybackScore, SessionGeneration, TrackSelection,
};
use keylight_ports::types::{NoteKey, Tick, Velocity01};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Edge {
    // releases sort first so a key repeated on the same tick re-triggers
    Off,
    On,
}

#[derive(Clone, Copy, Debug)]
struct TimelineEvent {
    tick: Tick,
    track_index: usize,
    edge: Edge,
    key: NoteKey,
    velocity: Velocity01,
}

/// Turns a score into per-track frames as the song position moves forward.
pub struct Scheduler {
    generation: SessionGeneration,
    selection: TrackSelection,
    timeline: Vec<TimelineEvent>,
    cursor: usize,
    active: Vec<BTreeMap<NoteKey, ActiveNote>>,
    completed: bool,
}

impl Scheduler {
    pub fn new(
        score: &PlaybackScore,
        selection: TrackSelection,
        generation: SessionGeneration,
    ) -> Self {
        let mut timeline = Vec::new();
        for (track_index, track) in score.tracks.iter().enumerate() {
            for note in &track.notes {
                timeline.push(TimelineEvent {
                    tick: note.tick,
                    track_index,
                    edge: Edge::On,
                    key: note.key,
                    velocity: note.velocity,
                });
                timeline.push(TimelineEvent {
                    tick: note.tick + note.duration_ticks.max(1),
                    track_index,
                    edge: Edge::Off,
                    key: note.key,
                    velocity: note.velocity,
                });
            }
        }
        timeline.sort_by(|a, b| {
            a.tick
                .cmp(&b.tick)
                .then_with(|| a.track_index.cmp(&b.track_index))
                .then_with(|| a.edge.cmp(&b.edge))
                .then_with(|| a.key.cmp(&b.key))
        });

        Self {
            generation,
            selection,
            timeline,
            cursor: 0,
            active: vec![BTreeMap::new(); score.tracks.len()],
            completed: false,
        }
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Emits one frame per (tick, track) for everything due up to `now_tick`, then a
    /// completion frame for the selected track once the timeline is exhausted.
    pub fn schedule(&mut self, now_tick: Tick) -> Vec<PlaybackFrame> {
        let mut frames = Vec::new();
        if self.completed {
            return frames;
        }

        let mut group: Option<(Tick, usize)> = None;
        while let Some(event) = self.timeline.get(self.cursor).copied() {
            if event.tick > now_tick {
                break;
            }
            self.cursor += 1;

            if group != Some((event.tick, event.track_index)) {
                self.close_group(group, &mut frames);
                group = Some((event.tick, event.track_index));
                frames.push(PlaybackFrame {
                    generation: self.generation,
                    track_index: event.track_index,
                    tick: event.tick,
                    active_notes: Vec::new(),
                    started: Vec::new(),
                    stopped: Vec::new(),
                    is_complete: false,
                });
            }

            let active = &mut self.active[event.track_index];
            let Some(frame) = frames.last_mut() else {
                continue;
            };
            match event.edge {
                Edge::On => {
                    let note = ActiveNote {
                        key: event.key,
                        velocity: event.velocity,
                    };
                    active.insert(event.key, note);
                    frame.started.push(note);
                }
                Edge::Off => {
                    if active.remove(&event.key).is_some() {
                        frame.stopped.push(event.key);
                    }
                }
            }
        }
        self.close_group(group, &mut frames);

        if self.cursor >= self.timeline.len() {
            self.completed = true;
            frames.push(PlaybackFrame {
                generation: self.generation,
                track_index: self.selection.selected_track_index,
                tick: now_tick,
                active_notes: Vec::new(),
                started: Vec::new(),
                stopped: Vec::new(),
                is_complete: true,
            });
        }

        frames
    }

    fn close_group(&self, group: Option<(Tick, usize)>, frames: &mut [PlaybackFrame]) {
        let (Some((_, track_index)), Some(frame)) = (group, frames.last_mut()) else {
            return;
        };
        frame.active_notes = self.active[track_index].values().copied().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylight_ports::playback::{PlaybackTrack, ScheduledNote};

    fn note(tick: Tick, duration_ticks: Tick, key: u8) -> ScheduledNote {
        ScheduledNote {
            tick,
            duration_ticks,
            key: NoteKey(key),
            velocity: Velocity01::FULL,
        }
    }

    fn keys(notes: &[ActiveNote]) -> Vec<u8> {
        notes.iter().map(|n| n.key.get()).collect()
    }

    fn score() -> PlaybackScore {
        PlaybackScore {
            ppq: 480,
            tempo_map: Vec::new(),
            tracks: vec![
                PlaybackTrack {
                    notes: vec![note(0, 480, 60), note(0, 960, 64), note(480, 480, 60)],
                },
                PlaybackTrack {
                    notes: vec![note(240, 240, 36)],
                },
            ],
        }
    }

    #[test]
    fn groups_changes_per_tick_and_track() {
        let selection = TrackSelection {
            selected_track_index: 0,
        };
        let mut scheduler = Scheduler::new(&score(), selection, SessionGeneration(3));

        let frames = scheduler.schedule(0);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].generation, SessionGeneration(3));
        assert_eq!(keys(&frames[0].active_notes), vec![60, 64]);

        let frames = scheduler.schedule(480);
        let summary: Vec<_> = frames
            .iter()
            .map(|f| (f.tick, f.track_index, keys(&f.active_notes)))
            .collect();
        assert_eq!(
            summary,
            vec![(240, 1, vec![36]), (480, 0, vec![60, 64]), (480, 1, vec![])]
        );
        // key 60 ends and restarts on the same tick
        assert_eq!(frames[1].stopped, vec![NoteKey(60)]);
        assert_eq!(keys(&frames[1].started), vec![60]);
    }

    #[test]
    fn completes_once_after_last_release() {
        let selection = TrackSelection {
            selected_track_index: 1,
        };
        let mut scheduler = Scheduler::new(&score(), selection, SessionGeneration(1));

        let frames = scheduler.schedule(10_000);
        let last = frames.last().expect("completion frame");
        assert!(last.is_complete);
        assert_eq!(last.track_index, 1);
        assert!(scheduler.is_completed());
        assert!(scheduler.schedule(20_000).is_empty());
    }
}
