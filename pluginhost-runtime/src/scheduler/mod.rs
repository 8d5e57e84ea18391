//! # Job Scheduling (§4.7, §6)
//!
//! A plugin handler can be run two ways outside the direct CLI/REST/WS
//! request path: submitted as a one-off background job, or attached to a
//! recurring schedule (cron expression or interval literal). Both paths
//! share the same permission gate (`jobs.submit`/`jobs.schedule`), the same
//! quota tracker, the same timeout/interval validation against the
//! plugin's declared limits, and the same degradation gate before a job is
//! allowed onto the queue.
//!
//! `broker` ties the pieces together and is the thing the rest of the
//! runtime talks to; `job`, `quota`, `cron`, and `degradation` are its
//! building blocks.

pub mod broker;
pub mod cron;
pub mod degradation;
pub mod job;
pub mod quota;
