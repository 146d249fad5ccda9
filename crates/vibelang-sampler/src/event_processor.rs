//! Ordered dispatch of events and parameter automation.
//!
//! Hosts deliver note/CC events and automation points separately, each
//! parameter queue holding its own change points. [`OrderedEventProcessor`]
//! merges them into one stream in ascending frame order, walking the block in
//! sub-blocks. When an event and an automation point share a frame, the event
//! is dispatched first.

use crate::events::HostEvent;

/// Upper bound on automation points gathered per block.
pub const MAX_AUTOMATION_POINTS: usize = 1024;

/// Anything with a frame offset in the current block.
pub trait TimedEvent {
    fn delay(&self) -> i32;
}

impl TimedEvent for HostEvent {
    fn delay(&self) -> i32 {
        HostEvent::delay(self)
    }
}

/// Automation for one parameter during one block.
pub trait ParameterQueue {
    fn parameter_id(&self) -> u32;
    fn point_count(&self) -> usize;
    /// Frame offset and normalized value of point `index`.
    fn point(&self, index: usize) -> Option<(u32, f32)>;
}

/// Receives the merged stream.
pub trait OrderedReceiver<E> {
    fn receive_event(&mut self, event: &E);
    fn receive_parameter(&mut self, id: u32, value: f32, offset: u32);
}

/// Simple owned parameter queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointQueue {
    pub id: u32,
    pub points: Vec<(u32, f32)>,
}

impl PointQueue {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            points: Vec::new(),
        }
    }

    pub fn with_point(mut self, offset: u32, value: f32) -> Self {
        self.points.push((offset, value));
        self
    }
}

impl ParameterQueue for PointQueue {
    fn parameter_id(&self) -> u32 {
        self.id
    }

    fn point_count(&self) -> usize {
        self.points.len()
    }

    fn point(&self, index: usize) -> Option<(u32, f32)> {
        self.points.get(index).copied()
    }
}

#[derive(Debug, Clone, Copy)]
struct Point {
    offset: u32,
    /// Gathering order, keeps the sort stable without allocating
    order: u32,
    id: u32,
    value: f32,
}

#[derive(Debug)]
pub struct OrderedEventProcessor {
    sub_block_size: usize,
    param_count: u32,
    points: Vec<Point>,
}

impl OrderedEventProcessor {
    /// `param_count` is the number of parameters the engine knows; queues
    /// beyond it are ignored.
    pub fn new(sub_block_size: usize, param_count: u32) -> Self {
        Self {
            sub_block_size: sub_block_size.max(1),
            param_count,
            points: Vec::with_capacity(MAX_AUTOMATION_POINTS),
        }
    }

    pub fn sub_block_size(&self) -> usize {
        self.sub_block_size
    }

    pub fn param_count(&self) -> u32 {
        self.param_count
    }

    /// Dispatch `events` (ascending by delay) and the points of `queues`
    /// for a block of `frames` frames.
    pub fn process<E, Q, R>(&mut self, frames: usize, events: &[E], queues: &[Q], receiver: &mut R)
    where
        E: TimedEvent,
        Q: ParameterQueue,
        R: OrderedReceiver<E>,
    {
        self.gather(queues);

        let mut next_event = 0;
        let mut next_point = 0;
        let mut start = 0;
        while start < frames {
            let end = (start + self.sub_block_size).min(frames);
            while let Some(point) = self.points.get(next_point).copied() {
                if point.offset as usize >= end {
                    break;
                }
                next_event = dispatch_events_until(events, next_event, point.offset as i64, receiver);
                receiver.receive_parameter(point.id, point.value, point.offset);
                next_point += 1;
            }
            start = end;
        }

        // Points past the block end, then whatever events remain
        for point in &self.points[next_point..] {
            next_event = dispatch_events_until(events, next_event, point.offset as i64, receiver);
            receiver.receive_parameter(point.id, point.value, point.offset);
        }
        dispatch_events_until(events, next_event, i64::MAX, receiver);
    }

    fn gather<Q: ParameterQueue>(&mut self, queues: &[Q]) {
        self.points.clear();
        let usable = queues.len().min(self.param_count as usize);
        if usable < queues.len() {
            log::trace!("Ignoring {} parameter queues", queues.len() - usable);
        }

        'queues: for queue in &queues[..usable] {
            let id = queue.parameter_id();
            for index in 0..queue.point_count() {
                let Some((offset, value)) = queue.point(index) else {
                    continue;
                };
                if self.points.len() == self.points.capacity() {
                    log::trace!("Automation point limit reached");
                    break 'queues;
                }
                let order = self.points.len() as u32;
                self.points.push(Point {
                    offset,
                    order,
                    id,
                    value,
                });
            }
        }
        self.points.sort_unstable_by_key(|p| (p.offset, p.order));
    }
}

/// Dispatch events with a delay up to and including `offset`. Returns the
/// index of the first event not dispatched.
fn dispatch_events_until<E, R>(events: &[E], mut next: usize, offset: i64, receiver: &mut R) -> usize
where
    E: TimedEvent,
    R: OrderedReceiver<E>,
{
    while let Some(event) = events.get(next) {
        if event.delay() as i64 > offset {
            break;
        }
        receiver.receive_event(event);
        next += 1;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tick(i32);

    impl TimedEvent for Tick {
        fn delay(&self) -> i32 {
            self.0
        }
    }

    #[derive(Debug, PartialEq)]
    enum Dispatched {
        Event(i32),
        Param(u32, u32),
    }

    #[derive(Default)]
    struct Recorder(Vec<Dispatched>);

    impl OrderedReceiver<Tick> for Recorder {
        fn receive_event(&mut self, event: &Tick) {
            self.0.push(Dispatched::Event(event.0));
        }

        fn receive_parameter(&mut self, id: u32, _value: f32, offset: u32) {
            self.0.push(Dispatched::Param(id, offset));
        }
    }

    fn run(frames: usize, sub_block: usize, events: &[Tick], queues: &[PointQueue]) -> Vec<Dispatched> {
        let mut processor = OrderedEventProcessor::new(sub_block, 8);
        let mut recorder = Recorder::default();
        processor.process(frames, events, queues, &mut recorder);
        recorder.0
    }

    #[test]
    fn test_events_win_ties() {
        let queues = [
            PointQueue::new(0).with_point(10, 0.1),
            PointQueue::new(1).with_point(10, 0.2).with_point(30, 0.3),
        ];
        let events = [Tick(5), Tick(10), Tick(20)];

        use Dispatched::*;
        assert_eq!(
            run(64, 16, &events, &queues),
            vec![Event(5), Event(10), Param(0, 10), Param(1, 10), Event(20), Param(1, 30)]
        );
    }

    #[test]
    fn test_unsorted_queue_points() {
        let queues = [PointQueue::new(3).with_point(40, 0.0).with_point(2, 1.0)];
        let events = [Tick(0), Tick(50)];

        use Dispatched::*;
        assert_eq!(
            run(64, 128, &events, &queues),
            vec![Event(0), Param(3, 2), Param(3, 40), Event(50)]
        );
    }

    #[test]
    fn test_trailing_events_are_flushed() {
        let queues = [PointQueue::new(0).with_point(70, 0.5)];
        let events = [Tick(1), Tick(90), Tick(200)];

        use Dispatched::*;
        assert_eq!(
            run(64, 16, &events, &queues),
            vec![Event(1), Param(0, 70), Event(90), Event(200)]
        );
        assert_eq!(run(0, 16, &events, &[]), vec![Event(1), Event(90), Event(200)]);
    }

    #[test]
    fn test_extra_queues_are_ignored() {
        let mut processor = OrderedEventProcessor::new(16, 1);
        let queues = [
            PointQueue::new(0).with_point(0, 1.0),
            PointQueue::new(1).with_point(0, 1.0),
        ];
        let mut recorder = Recorder::default();
        processor.process(32, &[] as &[Tick], &queues, &mut recorder);
        assert_eq!(recorder.0, vec![Dispatched::Param(0, 0)]);
    }

    #[test]
    fn test_host_events_are_timed() {
        let event = HostEvent::Cc {
            delay: 7,
            cc: 1,
            value: 0.5,
        };
        assert_eq!(TimedEvent::delay(&event), 7);
    }
}
