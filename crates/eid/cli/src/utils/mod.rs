//! Utility functions for the eid CLI

pub(crate) mod display;
pub(crate) mod reader;
