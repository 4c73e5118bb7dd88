//! Paired-node synchronization demo.
//!
//! Pairs two in-process nodes over an in-memory transport and runs the
//! coordination + pattern loop for a fixed simulated duration, logging the
//! handshake, beacon cadence, and actuator transitions on both sides.
//! Not part of the library's public surface — a manual-inspection aid,
//! the way the teacher's `examples/*-sx128x.rs` binaries exercise its MAC
//! against real radio hardware.

use std::sync::{Arc, Mutex};

use structopt::StructOpt;

use pairsync_core::actuator::mock::MockActuator;
use pairsync_core::actuator::{Actuator, ActuatorState, Direction};
use pairsync_core::clock::mock::MockClock;
use pairsync_core::clock::Clock;
use pairsync_core::commit;
use pairsync_core::config::Config;
use pairsync_core::error::CoordError;
use pairsync_core::pattern::{PatternEpoch, PatternScheduler};
use pairsync_core::role::{elect, Role};
use pairsync_core::router::Router;
use pairsync_core::sync::{compute_handshake, SyncEngine};
use pairsync_core::transport::mock::{MockLink, MockTransport};
use pairsync_core::transport::Transport;
use pairsync_core::wire::{Beacon, Message, TimeRequest, TimeResponse};

#[derive(Debug, StructOpt)]
struct Options {
    #[structopt(long, default_value = "2000")]
    /// Pattern period in milliseconds
    period_ms: u32,

    #[structopt(long, default_value = "25")]
    /// Duty cycle percentage
    duty_percent: u8,

    #[structopt(long, default_value = "20s")]
    /// Simulated session duration
    duration: humantime::Duration,

    #[structopt(long, default_value = "info")]
    /// Log level
    log_level: simplelog::LevelFilter,
}

struct PrintingActuator {
    name: &'static str,
    inner: MockActuator,
}

impl Actuator for PrintingActuator {
    fn command(&mut self, state: ActuatorState, direction: Direction, intensity_pct: u8) {
        log::info!(
            "{} actuator -> {:?} dir={:?} intensity={}%",
            self.name,
            state,
            direction,
            intensity_pct
        );
        self.inner.command(state, direction, intensity_pct);
    }
}

fn main() -> anyhow::Result<()> {
    let opts = Options::from_args();
    let _ = simplelog::SimpleLogger::init(opts.log_level, simplelog::Config::default());

    let cfg = Config::default();
    let a_id = [0, 0, 0, 0, 0, 1];
    let b_id = [0, 0, 0, 0, 0, 2];
    let a_battery = 80;
    let b_battery = 60;

    let a_role = elect(a_battery, b_battery, a_id, b_id);
    let b_role = elect(b_battery, a_battery, b_id, a_id);
    log::info!("node A elected {:?}, node B elected {:?}", a_role, b_role);
    let (leader_role, follower_role) = match a_role {
        Role::Leader => ("A", "B"),
        _ => ("B", "A"),
    };
    log::info!("leader={} follower={}", leader_role, follower_role);

    let now = Arc::new(Mutex::new(0i64));
    let leader_inbox = MockLink::new();
    let follower_inbox = MockLink::new();
    let mut leader_transport = MockTransport {
        peer: follower_inbox.clone(),
        latency_us: 10_000,
        now_us: now.clone(),
    };
    let mut follower_transport = MockTransport {
        peer: leader_inbox.clone(),
        latency_us: 10_000,
        now_us: now.clone(),
    };

    let leader_clock = MockClock::new(0);
    let follower_clock = MockClock::new(0);
    let mut leader_router = Router::new();
    let mut follower_router = Router::new();
    let mut follower_sync = SyncEngine::new(&cfg);

    // Leader activates its pattern before the handshake response goes out,
    // so the response carries a real epoch/period for the Follower to
    // mirror immediately (§4.2 Phase 1) instead of waiting for a beacon.
    let epoch = PatternEpoch {
        epoch_us: leader_clock.now_us() + 1_000_000,
        period_ms: opts.period_ms,
        duty_percent: opts.duty_percent,
        mode_id: 0,
    };
    let mut leader_sched = PatternScheduler::new();
    leader_sched.install_epoch(epoch);
    let mut leader_act = PrintingActuator {
        name: "leader",
        inner: MockActuator::default(),
    };

    // Handshake.
    let t1 = follower_clock.now_us();
    let mut buf = [0u8; pairsync_core::wire::MAX_MESSAGE_LEN];
    let n = Message::TimeRequest(TimeRequest { t1_us: t1 as u64 }).encode(0, &mut buf);
    follower_transport.send(&buf[..n]).map_err(CoordError::from)?;

    *now.lock().unwrap() += 10_000;
    leader_clock.advance_us(10_000);
    let t2 = leader_clock.now_us();
    let delivered = leader_inbox.poll(*now.lock().unwrap());
    let (bytes, _) = &delivered[0];
    let t1_wire = match leader_router.ingest(bytes, true).map_err(CoordError::from)?.unwrap() {
        Message::TimeRequest(m) => m.t1_us,
        _ => unreachable!(),
    };

    leader_clock.advance_us(20);
    let t3 = leader_clock.now_us();
    let n = Message::TimeResponse(TimeResponse {
        t1_us: t1_wire,
        t2_us: t2 as u64,
        t3_us: t3 as u64,
        epoch_us: epoch.epoch_us as u64,
        period_ms: epoch.period_ms,
    })
    .encode(0, &mut buf);
    leader_transport.send(&buf[..n]).map_err(CoordError::from)?;

    *now.lock().unwrap() += 10_000;
    follower_clock.advance_us(10_020);
    let t4 = follower_clock.now_us();
    let delivered = follower_inbox.poll(*now.lock().unwrap());
    let (bytes, _) = &delivered[0];
    let resp = match follower_router.ingest(bytes, true).map_err(CoordError::from)?.unwrap() {
        Message::TimeResponse(r) => r,
        _ => unreachable!(),
    };
    let handshake = compute_handshake(t1, &resp, t4, &cfg).map_err(CoordError::from)?;
    log::info!(
        "handshake complete: offset_us={} rtt_us={}",
        handshake.offset_us,
        handshake.rtt_us
    );
    follower_sync.on_handshake_accepted(handshake);

    // Leader's first beacon fills in duty/mode, which the handshake
    // response has no room for (§6 wire format).
    let n = Message::Beacon(Beacon::new_with_crc(
        leader_clock.now_us() as u64,
        epoch.epoch_us as u64,
        epoch.period_ms,
        epoch.duty_percent,
        epoch.mode_id,
        0,
    ))
    .encode(0, &mut buf);
    leader_transport.send(&buf[..n]).map_err(CoordError::from)?;
    *now.lock().unwrap() += 10_000;
    let delivered = follower_inbox.poll(*now.lock().unwrap());
    let (bytes, rx_us) = &delivered[0];
    let beacon = match follower_router.ingest(bytes, true).map_err(CoordError::from)?.unwrap() {
        Message::Beacon(b) => b,
        _ => unreachable!(),
    };
    follower_sync.on_beacon(&beacon, *rx_us, &cfg);

    let mut follower_sched = PatternScheduler::new();
    follower_sched.install_epoch(
        follower_sync
            .mirrored_epoch()
            .expect("handshake mirrored an epoch before the first beacon arrived"),
    );
    let mut follower_act = PrintingActuator {
        name: "follower",
        inner: MockActuator::default(),
    };

    let duration_us: i64 = opts.duration.as_secs() as i64 * 1_000_000;
    let tick_us = (cfg.tick_interval_ms as i64) * 1_000;
    let mut t = 0i64;
    let mut proposed = false;

    while t < duration_us {
        leader_sched.tick(t, Role::Leader, &mut leader_act);
        let follower_sync_time = follower_sync.follower_sync_time(t);
        follower_sched.tick(follower_sync_time, Role::Follower, &mut follower_act);

        // Midway through the run, propose a mode change to demonstrate the
        // two-phase commit.
        if !proposed && t >= duration_us / 2 {
            proposed = true;
            let current_epoch = leader_sched.epoch.unwrap();
            let proposal = commit::propose(t, &current_epoch, 1, opts.period_ms / 2, opts.duty_percent as u32, &cfg)
                .map_err(CoordError::from)?;
            commit::validate(&proposal, t, &current_epoch, &cfg).map_err(CoordError::from)?;
            log::info!("mode change proposed: effective at t={}us", proposal.leader_effective_us);
            leader_sched.arm(commit::to_leader_armed(&proposal));
            follower_sched.arm(commit::to_follower_armed(&proposal));
        }

        t += tick_us;
    }

    log::info!("simulation complete after {} us", t);
    Ok(())
}
