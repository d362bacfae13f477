//! End-to-end scheduling behaviour: engine, processor, executors and
//! services wired together the way a server boots them.

use parking_lot::Mutex;
use server_engine::processor::{completion_channel, CompletionHandle};
use server_engine::{
    Clock, Engine, EngineTask, FixedServiceExecutor, FixedThreadExecutor, ManualClock,
    MessageMark, MessageRouter, Millis, OffsetClock, Service, ServiceContext, ServiceHost,
    ServiceId, ServiceMessage, TaskExecutor, TaskOutcome, TaskProcessor, TimeTicker,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Runs each task synchronously inside `submit`; the outcome is picked up
/// by the next harvest like any other completion.
struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn can_submit(&self) -> bool {
        true
    }

    fn submit(&mut self, task: Arc<EngineTask>) -> CompletionHandle {
        let (signal, handle) = completion_channel(task.id());
        signal.complete(task.execute());
        handle
    }

    fn handle_completion(&mut self, _outcome: &TaskOutcome) {}
}

/// Counts ticks and optionally fails on the listed tick numbers (1-based).
#[derive(Default)]
struct Counting {
    ticks: u32,
    ticked_at: Vec<Millis>,
    fail_on: Vec<u32>,
}

impl Service for Counting {
    fn tick_logic(&mut self, _ctx: &ServiceContext, now: Millis) -> anyhow::Result<()> {
        self.ticks += 1;
        self.ticked_at.push(now);
        if self.fail_on.contains(&self.ticks) {
            anyhow::bail!("scripted failure on tick {}", self.ticks);
        }
        Ok(())
    }
}

fn inline_setup(start: Millis) -> (Arc<ManualClock>, TaskProcessor, ServiceHost) {
    let clock = Arc::new(ManualClock::new(start));
    let processor = TaskProcessor::new(Box::new(InlineExecutor), clock.clone());
    let host = ServiceHost::new(processor.registrar(), clock.clone());
    (clock, processor, host)
}

#[test]
fn test_frame_rate_100_over_250ms_runs_twice() {
    let (clock, processor, host) = inline_setup(0);
    let runner = host
        .spawn_service(
            ServiceId(1),
            "counting",
            Counting::default(),
            Arc::new(MessageRouter::<Counting>::new()),
            Some(100),
        )
        .unwrap();

    let mut engine = Engine::new(clock.clone()).with_ticker(TimeTicker::starting_at(100, 0));
    engine.add_driver(processor);

    for now in (0..=250).step_by(10) {
        clock.set(now);
        engine.step(now);
    }

    assert_eq!(engine.ticks(), 3);
    runner.with_state(|state| {
        assert_eq!(state.ticks, 2);
        assert_eq!(state.ticked_at, vec![100, 200]);
    });
}

const GREETING: i32 = 7;

#[derive(Default)]
struct Greeter {
    target: Option<ServiceId>,
}

impl Service for Greeter {
    fn tick_logic(&mut self, ctx: &ServiceContext, _now: Millis) -> anyhow::Result<()> {
        if let Some(target) = self.target.take() {
            ctx.send_to(target, ServiceMessage::new(GREETING, "hello"))?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Listener {
    received: Vec<(MessageMark, Option<ServiceId>, Option<ServiceId>, String)>,
}

impl Service for Listener {
    fn tick_logic(&mut self, _ctx: &ServiceContext, _now: Millis) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn test_message_from_a_is_dispatched_once_on_b() {
    let (clock, mut processor, host) = inline_setup(0);

    let mut router = MessageRouter::<Listener>::new();
    router
        .on(GREETING, |listener, _, message| {
            let source = message.source();
            let target = message.target();
            let mark = message.mark();
            let text = message
                .into_payload::<&'static str>()
                .map_err(|_| anyhow::anyhow!("unexpected payload"))?;
            listener.received.push((mark, source, target, text.to_string()));
            Ok(())
        })
        .unwrap();

    host.spawn_service(
        ServiceId(10),
        "a",
        Greeter {
            target: Some(ServiceId(20)),
        },
        Arc::new(MessageRouter::<Greeter>::new()),
        Some(100),
    )
    .unwrap();
    let b = host
        .spawn_service(ServiceId(20), "b", Listener::default(), Arc::new(router), Some(100))
        .unwrap();

    for now in (0..=500).step_by(100) {
        clock.set(now);
        processor.tick(100);
    }

    b.with_state(|listener| {
        assert_eq!(
            listener.received,
            vec![(
                MessageMark(GREETING),
                Some(ServiceId(10)),
                Some(ServiceId(20)),
                "hello".to_string()
            )]
        );
    });
    assert_eq!(b.endpoint().pending_messages(), 0);
}

#[test]
fn test_failed_tick_frees_slot_and_service_runs_again() {
    let (clock, mut processor, host) = inline_setup(0);
    let runner = host
        .spawn_service(
            ServiceId(5),
            "flaky",
            Counting {
                fail_on: vec![1],
                ..Counting::default()
            },
            Arc::new(MessageRouter::<Counting>::new()),
            Some(50),
        )
        .unwrap();

    clock.set(50);
    processor.tick(50);
    assert_eq!(processor.in_flight(), 1);

    // Harvested here, but not due again until 100.
    clock.set(60);
    processor.tick(10);
    let stats = processor.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(processor.in_flight(), 0);

    clock.set(100);
    processor.tick(40);
    clock.set(110);
    processor.tick(10);

    let stats = processor.stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
    runner.with_state(|state| assert_eq!(state.ticked_at, vec![50, 100]));
}

#[test]
fn test_registration_during_run_is_picked_up_next_tick() {
    let (clock, mut processor, host) = inline_setup(0);
    clock.set(100);
    processor.tick(100);
    assert_eq!(processor.task_count(), 0);

    host.spawn_service(
        ServiceId(1),
        "late",
        Counting::default(),
        Arc::new(MessageRouter::<Counting>::new()),
        Some(10),
    )
    .unwrap();
    assert_eq!(processor.task_count(), 0);

    processor.tick(0);
    assert_eq!(processor.task_count(), 1);
}

#[test]
fn test_backward_time_jump_does_not_stall_services() {
    let start = 10_000_000;
    let (clock, processor, host) = inline_setup(start);
    let runner = host
        .spawn_service(
            ServiceId(1),
            "counting",
            Counting::default(),
            Arc::new(MessageRouter::<Counting>::new()),
            Some(100),
        )
        .unwrap();

    let mut engine = Engine::new(clock.clone()).with_ticker(TimeTicker::starting_at(50, start));
    engine.add_driver(processor);

    assert!(engine.step(start));
    clock.set(start + 100);
    assert!(engine.step(start + 100));

    // An hour back, as a GM `shift -3600000` would do.
    let rewound = start - 3_600_000;
    clock.set(rewound);
    assert!(engine.idle_wait(rewound) <= Duration::from_millis(50));
    assert!(engine.step(rewound));

    for now in (rewound + 50..=rewound + 200).step_by(50) {
        clock.set(now);
        assert!(engine.step(now));
    }

    runner.with_state(|state| {
        assert_eq!(state.ticked_at, vec![start + 100, rewound + 100, rewound + 200]);
    });
}

/// Tracks how many ticks of a group are running at the same moment.
#[derive(Default)]
struct Overlap {
    active: AtomicUsize,
    peak: AtomicUsize,
    runs: AtomicUsize,
}

impl Overlap {
    fn enter(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

struct Busy {
    overlap: Arc<Overlap>,
}

impl Service for Busy {
    fn tick_logic(&mut self, _ctx: &ServiceContext, _now: Millis) -> anyhow::Result<()> {
        self.overlap.enter();
        thread::sleep(Duration::from_millis(5));
        self.overlap.leave();
        Ok(())
    }
}

fn spawn_busy(host: &ServiceHost, id: u64, overlap: &Arc<Overlap>) {
    host.spawn_service(
        ServiceId(id),
        format!("busy-{id}"),
        Busy {
            overlap: Arc::clone(overlap),
        },
        Arc::new(MessageRouter::<Busy>::new()),
        Some(10),
    )
    .unwrap();
}

#[test]
fn test_fixed_thread_executor_caps_outstanding_tasks() {
    let clock = Arc::new(ManualClock::new(0));
    let executor = FixedThreadExecutor::new(2).unwrap();
    let mut processor = TaskProcessor::new(Box::new(executor), clock.clone());
    let host = ServiceHost::new(processor.registrar(), clock.clone());

    let overlap = Arc::new(Overlap::default());
    for id in 0..6 {
        spawn_busy(&host, id, &overlap);
    }

    for _ in 0..100 {
        clock.advance(10);
        processor.tick(10);
        assert!(processor.in_flight() <= 2);
        thread::sleep(Duration::from_millis(2));
    }
    server_engine::TickDriver::shutdown(&mut processor);

    assert!(overlap.runs.load(Ordering::SeqCst) > 6);
    assert!(overlap.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(processor.in_flight(), 0);
}

#[test]
fn test_fixed_service_executor_serialises_congruent_services() {
    let clock = Arc::new(ManualClock::new(0));
    let executor = FixedServiceExecutor::new(2).unwrap();
    let mut processor = TaskProcessor::new(Box::new(executor), clock.clone());
    let host = ServiceHost::new(processor.registrar(), clock.clone());

    // 1, 3 and 5 share shard 1; 2 and 4 share shard 0.
    let odd = Arc::new(Overlap::default());
    let even = Arc::new(Overlap::default());
    for id in [1, 3, 5] {
        spawn_busy(&host, id, &odd);
    }
    for id in [2, 4] {
        spawn_busy(&host, id, &even);
    }

    for _ in 0..60 {
        clock.advance(10);
        processor.tick(10);
        thread::sleep(Duration::from_millis(2));
    }
    server_engine::TickDriver::shutdown(&mut processor);

    assert_eq!(odd.peak.load(Ordering::SeqCst), 1);
    assert_eq!(even.peak.load(Ordering::SeqCst), 1);
    assert!(odd.runs.load(Ordering::SeqCst) >= 3);
    assert!(even.runs.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_engine_thread_drives_services_until_stopped() {
    let clock = Arc::new(OffsetClock::default());
    let executor = FixedThreadExecutor::new(2).unwrap();
    let processor = TaskProcessor::new(Box::new(executor), clock.clone());
    let host = ServiceHost::new(processor.registrar(), clock.clone());
    let runner = host
        .spawn_service(
            ServiceId(1),
            "counting",
            Counting::default(),
            Arc::new(MessageRouter::<Counting>::new()),
            Some(10),
        )
        .unwrap();

    let mut engine = Engine::new(clock.clone())
        .with_ticker(TimeTicker::starting_at(5, clock.now_millis()));
    engine.add_driver(processor);
    let handle = engine.start().unwrap();

    thread::sleep(Duration::from_millis(300));
    let report = handle.stop().unwrap();

    assert!(report.ticks > 5);
    let ticks = runner.with_state(|state| state.ticks);
    assert!(ticks >= 2, "service ticked {ticks} times");
    assert!(u64::from(ticks) <= report.ticks);
}
