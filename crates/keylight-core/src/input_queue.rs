use keylight_ports::midi::{MidiLikeEvent, PlayerEvent};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;

pub const INPUT_QUEUE_CAPACITY: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSource {
    Pointer,
    Device,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    pub source: InputSource,
    pub event: MidiLikeEvent,
}

impl InputEvent {
    pub fn pointer(event: MidiLikeEvent) -> Self {
        Self {
            source: InputSource::Pointer,
            event,
        }
    }

    pub fn is_from_device(&self) -> bool {
        self.source == InputSource::Device
    }
}

impl From<PlayerEvent> for InputEvent {
    fn from(event: PlayerEvent) -> Self {
        Self {
            source: InputSource::Device,
            event: event.event,
        }
    }
}

/// Write side of the input queue, shareable with device callback threads.
#[derive(Clone)]
pub struct InputSender {
    producer: Arc<Mutex<Producer<InputEvent>>>,
}

impl InputSender {
    /// Waits for any other producer to finish its push. Returns false only when the
    /// queue is full.
    pub fn send(&self, event: InputEvent) -> bool {
        self.producer.lock().push(event).is_ok()
    }
}

/// Serializes input from every producer into one ordered stream for the core.
pub struct InputQueue {
    sender: InputSender,
    consumer: Consumer<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::with_capacity(INPUT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self {
            sender: InputSender {
                producer: Arc::new(Mutex::new(producer)),
            },
            consumer,
        }
    }

    pub fn sender(&self) -> InputSender {
        self.sender.clone()
    }

    pub fn drain(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::with_capacity(self.consumer.slots());
        while let Ok(event) = self.consumer.pop() {
            events.push(event);
        }
        events
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(note: u8) -> InputEvent {
        InputEvent {
            source: InputSource::Device,
            event: MidiLikeEvent::NoteOn { note, velocity: 90 },
        }
    }

    #[test]
    fn drains_in_arrival_order_across_senders() {
        let mut queue = InputQueue::with_capacity(8);
        let a = queue.sender();
        let b = queue.sender();

        assert!(a.send(note_on(60)));
        assert!(b.send(note_on(62)));
        assert!(a.send(InputEvent::pointer(MidiLikeEvent::NoteOn {
            note: 64,
            velocity: 127,
        })));

        let notes: Vec<_> = queue
            .drain()
            .into_iter()
            .map(|e| match e.event {
                MidiLikeEvent::NoteOn { note, .. } => note,
                _ => 0,
            })
            .collect();
        assert_eq!(notes, vec![60, 62, 64]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn reports_overflow() {
        let queue = InputQueue::with_capacity(1);
        let sender = queue.sender();
        assert!(sender.send(note_on(60)));
        assert!(!sender.send(note_on(61)));
    }

    #[test]
    fn device_release_waits_out_a_pointer_push() {
        let mut queue = InputQueue::with_capacity(8);
        let pointer = queue.sender();
        let device = queue.sender();

        let held = pointer.producer.lock();
        let callback = std::thread::spawn(move || {
            device.send(InputEvent {
                source: InputSource::Device,
                event: MidiLikeEvent::NoteOff { note: 60 },
            })
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(held);

        assert!(callback.join().expect("callback thread"));
        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].is_from_device());
        assert_eq!(drained[0].event, MidiLikeEvent::NoteOff { note: 60 });
    }
}
