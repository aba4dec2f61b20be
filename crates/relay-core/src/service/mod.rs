//! Application services composed over the repository traits.

pub mod workflow;
