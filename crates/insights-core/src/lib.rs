//! insights-core: synthetic assessment data and its network analytics.
//!
//! Seeded generation of longitudinal rubric scores and Socratic metrics,
//! miss detection, co-miss and bipartite networks, centrality, correlation
//! networks and cohort statistics, tied together by [`pipeline::Pipeline`].

pub mod centrality;
pub mod config;
pub mod correlation;
pub mod error;
pub mod generator;
pub mod graph;
pub mod misses;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod selection;
pub mod statistics;
pub mod taxonomy;
