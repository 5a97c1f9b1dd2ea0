//! Reconstructs the beam track of each digitiser event from the wire chamber
//! timing, and accumulates the pulse features of every channel against it.
pub mod channels;
pub mod event;
pub mod features;
pub mod parameters;
pub mod pipeline;
pub mod simulation;
pub mod sink;
pub mod statistics;
pub mod track;
