#![recursion_limit = "256"]

pub mod api_client;
pub mod beam_search;
pub mod chat;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod dataset_builder;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod training;
pub mod vocabulary;
