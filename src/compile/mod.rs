pub(crate) mod orchestrator;
pub(crate) mod runner;
pub(crate) mod unit;
