//! Backend assembly and the `run` / `self-check` commands.

use std::io::{BufRead, Write};
use std::time::Duration;

use eyre::WrapErr;
use lockstep_core::{
    Command, ControllerParameters, CoordinatorBuilder, CycleSample, Handshake, SampleSink,
    Session, SessionCfg, SessionEnd, SessionHandle,
};
use lockstep_hardware::{SimFaults, SimPlant, SimulatedTicker};
use lockstep_traits::clock::MonotonicClock;
use lockstep_traits::{Axis, BusPeer, MotorSink, TickSource};
use serde_json::json;

use crate::cli::RtArgs;
use crate::rt::setup_rt_once;

/// How often the main thread looks for rejected commands while the session runs.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct RunOpts {
    pub ticks: Option<u64>,
    pub sim: bool,
    pub start: bool,
    pub stdin: bool,
    pub json: bool,
    pub rt: RtArgs,
}

/// Prints one line per tick on stdout.
pub struct StdoutDisplay {
    json: bool,
}

impl StdoutDisplay {
    pub const fn new(json: bool) -> Self {
        Self { json }
    }
}

pub fn sample_json(s: &CycleSample) -> serde_json::Value {
    let axis = |a: Axis| {
        json!({
            "target": s.target(a),
            "actual": s.actual(a),
            "output": s.output(a).to_string(),
            "rpm": s.speed(a).to_string(),
        })
    };
    json!({
        "tick": s.counter(),
        "cycle_s": s.cycle_time().to_string(),
        "token": s.token_hex(),
        "a": axis(Axis::A),
        "b": axis(Axis::B),
    })
}

impl SampleSink for StdoutDisplay {
    fn publish(&mut self, sample: &CycleSample) {
        let mut out = std::io::stdout().lock();
        // a closed stdout must not stall the loop
        let _ = if self.json {
            writeln!(out, "{}", sample_json(sample))
        } else {
            writeln!(out, "{sample}")
        };
    }
}

/// Fault injection for the simulated peer, from `LOCKSTEP_SIM_DESYNC_EVERY`
/// and `LOCKSTEP_SIM_TIMEOUT_EVERY`.
fn sim_faults() -> SimFaults {
    let every = |key: &str| {
        std::env::var(key)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
    };
    SimFaults {
        desync_every: every("LOCKSTEP_SIM_DESYNC_EVERY"),
        timeout_every: every("LOCKSTEP_SIM_TIMEOUT_EVERY"),
    }
}

fn sim_plant(cfg: &lockstep_config::Config) -> SimPlant {
    SimPlant::new(cfg.sim.pulses_per_tick)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_peer(cfg: &lockstep_config::Config) -> eyre::Result<lockstep_hardware::I2cPeer> {
    lockstep_hardware::I2cPeer::new(
        cfg.bus.i2c_bus,
        cfg.bus.peer_address,
        Duration::from_millis(cfg.bus.timeout_ms),
    )
    .wrap_err_with(|| format!("open i2c peer at {:#04x}", cfg.bus.peer_address))
}

pub fn run(cfg: &lockstep_config::Config, opts: RunOpts) -> eyre::Result<()> {
    setup_rt_once(&opts.rt);

    let params = ControllerParameters::try_from(&cfg.control)?;
    let session_cfg = SessionCfg {
        max_ticks: opts.ticks,
        ..SessionCfg::from(&cfg.timeouts)
    };

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    if !opts.sim {
        let peer = open_peer(cfg)?;
        let sink = lockstep_hardware::MotorHat::new(
            cfg.bus.i2c_bus,
            cfg.motor_driver.address,
            cfg.motor_driver.pwm_hz,
        )
        .wrap_err_with(|| format!("open motor driver at {:#04x}", cfg.motor_driver.address))?;
        let ticker = lockstep_hardware::TickPin::new(cfg.pins.tick_in)
            .wrap_err_with(|| format!("open tick pin BCM{}", cfg.pins.tick_in))?;
        tracing::info!(backend = "hardware", "starting control loop");
        return drive(peer, sink, ticker, params, session_cfg, opts);
    }

    if !opts.sim {
        tracing::info!("built without hardware support; using the simulated backend");
    }
    let plant = sim_plant(cfg);
    let faults = sim_faults();
    let ticker = SimulatedTicker::new(
        MonotonicClock::new(),
        Duration::from_millis(cfg.sim.tick_ms),
    );
    tracing::info!(backend = "sim", tick_ms = cfg.sim.tick_ms, ?faults, "starting control loop");
    drive(
        plant.peer().with_faults(faults),
        plant.sink(),
        ticker,
        params,
        session_cfg,
        opts,
    )
}

fn drive<P, S, T>(
    peer: P,
    sink: S,
    ticker: T,
    params: ControllerParameters,
    session_cfg: SessionCfg,
    opts: RunOpts,
) -> eyre::Result<()>
where
    P: BusPeer + Send + 'static,
    S: MotorSink + Send + 'static,
    T: TickSource + Send + 'static,
{
    let mut coordinator = CoordinatorBuilder::new()
        .with_peer(peer)
        .with_sink(sink)
        .with_params(params)
        .with_display(Box::new(StdoutDisplay::new(opts.json)))
        .build()?;
    if opts.start {
        coordinator.apply(Command::Start)?;
    }

    let session = Session::spawn(coordinator, ticker, session_cfg);
    let on_signal = session.handle();
    ctrlc::set_handler(move || {
        let _ = on_signal.send(Command::Shutdown);
    })
    .wrap_err("install Ctrl-C handler")?;
    if opts.stdin {
        spawn_command_reader(session.handle());
    }

    while !session.is_finished() {
        std::thread::sleep(POLL_INTERVAL);
        for e in session.take_rejected() {
            tracing::warn!(error = %e, "command rejected");
        }
    }
    let ticks = session.ticks();
    let end = session.wait()?;
    tracing::info!(?end, ticks, "control loop ended");
    if opts.json {
        println!("{}", json!({ "end": end_name(end), "ticks": ticks }));
    }
    Ok(())
}

pub const fn end_name(end: SessionEnd) -> &'static str {
    match end {
        SessionEnd::Shutdown => "Shutdown",
        SessionEnd::TickLimit => "TickLimit",
        SessionEnd::Disconnected => "Disconnected",
    }
}

/// Forward parsed stdin lines to the session until EOF.
fn spawn_command_reader(handle: SessionHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(cmd) => {
                    if handle.send(cmd).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, input = %line.trim(), "unrecognized command"),
            }
        }
    });
}

/// One INITIAL exchange; succeeds when the peer answers token 1 with SUCCESS.
pub fn self_check(cfg: &lockstep_config::Config, sim: bool, json: bool) -> eyre::Result<()> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    if !sim {
        let mut peer = open_peer(cfg)?;
        return check_peer(&mut peer, "hardware", json);
    }
    let _ = sim;
    let mut peer = sim_plant(cfg).peer().with_faults(sim_faults());
    check_peer(&mut peer, "sim", json)
}

fn check_peer<P: BusPeer>(peer: &mut P, backend: &str, json: bool) -> eyre::Result<()> {
    let mut hs = Handshake::new();
    hs.arm();
    let response = hs.exchange(peer).wrap_err("self-check exchange")?;
    tracing::info!(backend, token = response.token, "self-check passed");
    if json {
        println!(
            "{}",
            json!({
                "self_check": "ok",
                "backend": backend,
                "pulses_a": response.pulses_a,
                "pulses_b": response.pulses_b,
            })
        );
    } else {
        println!(
            "self-check ok ({backend}): token {:X}, pulses A={} B={}",
            response.token, response.pulses_a, response.pulses_b
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::Decimal;

    #[test]
    fn sample_json_keeps_decimal_text() {
        let s = CycleSample::new(
            3,
            Decimal::new(10_000, 6),
            0x1F,
            [10, -10],
            [9, -11],
            [Decimal::new(500, 3), Decimal::new(-5, 1)],
            [Decimal::new(5_525, 2), Decimal::ZERO],
        );
        let v = sample_json(&s);
        assert_eq!(v["tick"], 3);
        assert_eq!(v["cycle_s"], "0.010");
        assert_eq!(v["token"], "1F");
        assert_eq!(v["a"]["output"], "0.500");
        assert_eq!(v["b"]["output"], "-0.500");
        assert_eq!(v["a"]["rpm"], "55.25");
        assert_eq!(v["b"]["actual"], -11);
    }

    #[test]
    fn check_peer_accepts_the_simulator() {
        let mut peer = SimPlant::new(1).peer();
        check_peer(&mut peer, "sim", true).unwrap();
    }

    #[test]
    fn check_peer_reports_desync() {
        let mut peer = SimPlant::new(1).peer().with_faults(SimFaults {
            desync_every: Some(1),
            timeout_every: None,
        });
        let err = check_peer(&mut peer, "sim", false).unwrap_err();
        assert!(format!("{err:#}").contains("desync"));
    }
}
