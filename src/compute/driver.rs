//! Driver - Global time-step control and the cycle loop.

use super::{DtLimit, EnergyCheck, Hydro, HydroError, TimeStep};
use crate::schema::DriverConfig;

/// Summary of one completed cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// Number of completed cycles.
    pub cycle: u64,
    /// Simulation time at the end of the cycle.
    pub time: f64,
    /// Step taken and what limited it.
    pub dt: TimeStep,
    /// Global hydro recommendation for the next cycle.
    pub recommendation: TimeStep,
}

/// Runs a solver from time zero until the stop time or stop cycle.
pub struct Driver {
    config: DriverConfig,
    hydro: Hydro,
    time: f64,
    cycle: u64,
    dt_last: f64,
    /// Global hydro recommendation from the previous cycle.
    dt_hydro: Option<TimeStep>,
}

impl Driver {
    pub fn new(config: DriverConfig, hydro: Hydro) -> Self {
        Self {
            config,
            hydro,
            time: 0.0,
            cycle: 0,
            dt_last: 0.0,
            dt_hydro: None,
        }
    }

    /// Step for the next cycle: `dtmax`, then `dtinit` on the first cycle or
    /// `dtfac * dt_last` afterwards, then the hydro recommendation, then the
    /// stop time. Each limit replaces the current one only if strictly smaller.
    pub fn next_time_step(&self) -> TimeStep {
        let subdomain = self.hydro.subdomain_id();
        let mut dt = TimeStep::new(self.config.dtmax, DtLimit::Maximum, subdomain);

        if self.cycle == 0 {
            if self.config.dtinit < dt.dt {
                dt = TimeStep::new(self.config.dtinit, DtLimit::Initial, subdomain);
            }
        } else {
            let recover = self.config.dtfac * self.dt_last;
            if recover < dt.dt {
                dt = TimeStep::new(recover, DtLimit::Growth, subdomain);
            }
            if let Some(hydro) = self.dt_hydro {
                if hydro.dt < dt.dt {
                    dt = hydro;
                }
            }
        }

        let remaining = self.config.tstop - self.time;
        if remaining < dt.dt {
            dt = TimeStep::new(remaining, DtLimit::StopTime, subdomain);
        }
        dt
    }

    /// Run one cycle.
    pub fn step(&mut self) -> Result<CycleReport, HydroError> {
        let dt = self.next_time_step();
        let local = self.hydro.do_cycle(dt.dt)?;
        let recommendation = self.hydro.reduce_time_step(local)?;

        self.dt_last = dt.dt;
        self.dt_hydro = Some(recommendation);
        self.time = if dt.limit == DtLimit::StopTime {
            self.config.tstop
        } else {
            self.time + dt.dt
        };
        self.cycle += 1;

        let inverted = self.hydro.mesh()?.inverted_sides();
        if inverted > 0 {
            log::warn!(
                "cycle {}: {} sides of subdomain {} have non-positive volume",
                self.cycle,
                inverted,
                self.hydro.subdomain_id()
            );
        }

        let report = CycleReport {
            cycle: self.cycle,
            time: self.time,
            dt,
            recommendation,
        };
        if self.hydro.subdomain_id() == 0
            && (self.cycle == 1 || (self.config.dtreport > 0 && self.cycle % self.config.dtreport == 0))
        {
            log::info!(
                "End cycle {:6}, time = {:11.5e}, dt = {:11.5e}, {}",
                report.cycle,
                report.time,
                report.dt.dt,
                report.dt.message()
            );
        }
        Ok(report)
    }

    pub fn is_done(&self) -> bool {
        self.cycle >= self.config.cstop || self.time >= self.config.tstop
    }

    /// Cycle until done, then run the energy check.
    pub fn run(&mut self) -> Result<EnergyCheck, HydroError> {
        let start = self.hydro.energy_check()?;
        while !self.is_done() {
            self.step()?;
        }
        let end = self.hydro.energy_check()?;
        if self.hydro.subdomain_id() == 0 {
            log::info!(
                "Run complete: {} cycles, time = {:.6e}, energy drift = {:.3e}",
                self.cycle,
                self.time,
                end.relative_drift(&start)
            );
        }
        Ok(end)
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[inline]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn hydro(&self) -> &Hydro {
        &self.hydro
    }
}
