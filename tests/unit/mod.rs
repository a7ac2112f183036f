//! Unit tests for the collector building blocks

mod normalize;
mod retention;
mod runtime;
