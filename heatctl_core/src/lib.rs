#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Heater control engine (hardware-agnostic).
//!
//! All hardware interactions go through `heatctl_traits::Heater` and
//! `heatctl_traits::StatusProvider`; time comes from `heatctl_traits::Clock`.
//!
//! ## Architecture
//!
//! - **PID block**: filtered derivative, clamped conditional integrator (`pid`)
//! - **Feedforward**: steady-state, fan and extrusion terms (`feedforward`)
//! - **Staged control**: MaxPower / Coast / Regulate state machine (`staged`)
//! - **Relay autotune**: bang-bang experiment and peak bookkeeping (`autotune`)
//! - **Identification**: FOWDT fit and PID tuning rules (`fowdt`, `tuning`)
//! - **Binding**: one active controller per heater, fault-to-zero ticks (`binding`)
//! - **Calibration**: swap in the tuner, wait, restore, fit (`calibration`)
//!
//! Every temperature sample produces exactly one power command. Errors inside
//! a tick never escape `HeaterBinding::tick`; the heater is driven to zero
//! and the fault is reported in the returned `TickOutcome`.

pub mod atomic;
pub mod autotune;
pub mod binding;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod feedforward;
pub mod fowdt;
pub mod hw_error;
pub mod mocks;
pub mod pid;
pub mod registry;
pub mod runner;
pub mod staged;
pub mod tuning;
pub mod util;

pub use autotune::{RelayAutotune, RelayFit, RelaySettings, SwitchingParams};
pub use binding::{HeaterBinding, TickOutcome};
pub use builder::{bind_heater, build_controller};
pub use calibration::{CalibrationOutcome, CalibrationRequest, calibrate};
pub use config::{AutotuneCfg, FeedforwardCfg, PidCfg, PidGains, StagedCfg};
pub use controller::{ControlTick, Controller};
pub use error::{AbortReason, BuildError, CalibrationFailure, ControlError, Result};
pub use feedforward::{DisturbanceSample, Disturbances, FeedforwardModel};
pub use fowdt::FowdtModel;
pub use pid::{PidBlock, PidController, PidOutput};
pub use registry::HeaterRegistry;
pub use runner::{PacedScheduler, RunSummary, Scheduler};
pub use staged::{ControlState, StagedController};
