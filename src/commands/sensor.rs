//! `sensor`: simulated sensors writing zone colours into the loaded
//! document.
//!
//! One periodic pump worker runs per zone. The command itself only watches
//! the clock: it wakes every `timeout_poll` (or earlier when the deadline,
//! a process flag or Ctrl-C fires), then stops and joins the workers.

use tokio::time::Instant;

use super::{SampleCommand, StopReason, parse_timeout, wait_for_stop};
use crate::cli::{HandlerFuture, Invocation};
use crate::context::SampleContext;
use crate::error::SampleError;
use crate::live::PumpWorker;
use crate::scene::{self, DISPLAY_COLOR, SensorReading};

pub(super) fn commands() -> Vec<SampleCommand> {
    vec![
        SampleCommand::new("sensor", sensor)
            .args("<timeout> <zone> [zone...]")
            .about("Run simulated sensors for the given zones\nA timeout of -1 runs until Ctrl-C"),
    ]
}

fn parse_zones(args: &[String]) -> Result<Vec<u32>, SampleError> {
    if args.is_empty() {
        return Err(SampleError::InvalidArgument("missing zone".to_string()));
    }
    args.iter()
        .map(|text| {
            text.parse::<u32>()
                .map_err(|_| SampleError::InvalidArgument(format!("zone \"{text}\" is not a number")))
        })
        .collect()
}

fn sensor<'a>(inv: Invocation<'a, SampleContext>) -> HandlerFuture<'a> {
    Box::pin(async move {
        let timeout = parse_timeout(inv.require(1, "timeout")?)?;
        let zones = parse_zones(inv.rest().get(1..).unwrap_or_default())?;
        let ctx = inv.ctx;

        let mut paths = Vec::with_capacity(zones.len());
        for &zone in &zones {
            paths.push(scene::zone_path(zone)?);
        }
        if let Some(missing) = ctx
            .pump()
            .read(|doc| paths.iter().find(|p| doc.prim(p).is_none()).cloned())
            .await?
        {
            return Err(SampleError::PrimNotFound(missing.to_string()));
        }

        let period = ctx.config().sensor_period;
        let workers: Vec<PumpWorker> = zones
            .iter()
            .zip(paths)
            .map(|(zone, path)| {
                let mut reading = SensorReading::default();
                ctx.pump()
                    .spawn_periodic(format!("sensor-{zone}"), period, move |doc| {
                        reading.advance();
                        doc.mutate(&path, DISPLAY_COLOR, reading.color())
                    })
            })
            .collect();

        let console = ctx.console();
        match timeout {
            Some(timeout) => console.line(format!(
                "Running {} sensors for {} seconds",
                workers.len(),
                timeout.as_secs()
            )),
            None => console.line(format!("Running {} sensors until Ctrl-C", workers.len())),
        }

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let reason = wait_for_stop(ctx, deadline, || workers.iter().all(PumpWorker::is_finished)).await;
        tracing::info!(?reason, "sensors stopping");

        for (zone, worker) in zones.iter().zip(workers) {
            let cycles = worker.shutdown().await;
            console.line(format!("Sensor zone {zone}: {cycles} updates"));
        }

        match reason {
            StopReason::ConnectionLost => Err(SampleError::Connection(
                "connection lost while sensors were running".to_string(),
            )),
            _ => Ok(()),
        }
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryServer;
    use crate::commands::testing::Harness;
    use std::time::Duration;

    #[test]
    fn zones_must_be_numbers() {
        let args = |items: &[&str]| items.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(parse_zones(&args(&["0", "3"])).ok(), Some(vec![0, 3]));
        assert!(parse_zones(&args(&[])).is_err());
        assert!(parse_zones(&args(&["north"])).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sensors_update_colours_until_the_timeout() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        h.ok("create sensors.live 2").await;
        let before = h.ok("get /World/box_1 primvars:displayColor").await;

        let out = h.ok("sensor 1 0 1").await;
        assert!(out.starts_with("Running 2 sensors for 1 seconds\n"));
        assert!(out.contains("Sensor zone 0: "));
        assert!(!out.contains("Sensor zone 1: 0 updates"));

        let after = h.ok("get /World/box_1 primvars:displayColor").await;
        assert_ne!(before, after);
        h.ctx.shutdown().await;
    }

    #[tokio::test]
    async fn raised_session_flag_stops_an_unbounded_run() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        h.ok("create sensors.live 1").await;
        h.ctx.session_ending().set();
        let out = tokio::time::timeout(Duration::from_secs(2), h.ok("sensor -1 0")).await;
        let Ok(out) = out else {
            panic!("sensor loop ignored the session flag");
        };
        assert!(out.contains("until Ctrl-C"));
        h.ctx.shutdown().await;
    }

    #[tokio::test]
    async fn ctrl_c_stops_the_sensors() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        h.ok("create sensors.live 1").await;
        let latch = h.ctx.interrupted().clone();
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            latch.set();
        });
        let out = tokio::time::timeout(Duration::from_secs(2), h.ok("sensor -1 0")).await;
        let Ok(out) = out else {
            panic!("sensor loop ignored Ctrl-C");
        };
        assert!(out.contains("Sensor zone 0: "));
        assert!(trigger.await.is_ok());
        h.ctx.shutdown().await;
    }

    #[tokio::test]
    async fn sensors_need_existing_zones() {
        let server = MemoryServer::new("localhost");
        let h = Harness::new(&server, "alice");
        assert!(h.fails("sensor 1 0").await.starts_with("no document loaded"));
        h.ok("create sensors.live 1").await;
        assert!(h.fails("sensor 1 4").await.starts_with("prim not found: /World/box_4"));
        assert!(h.fails("sensor 1").await.ends_with("Usage: sensor <timeout> <zone> [zone...]\n"));
    }
}
