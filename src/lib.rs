//! RuSen is a SENKIN-style driver for zero-dimensional chemical reactor
//! simulations. A line-oriented keyword input file selects one of nine
//! reactor/boundary-condition models; the time-stepping driver advances a
//! reactor-integration engine to the end time, interpolates reports at the
//! requested cadence, detects ignition, and persists a time-series. Multiple
//! cases in one file can be run in parallel to build an ignition-delay sweep.

pub mod batch;
pub mod driver;
pub mod engine;
pub mod ideal_gas;
pub mod keywords;
pub mod mixture;
pub mod model;
pub mod printer;
pub mod profiles;
pub mod save;
