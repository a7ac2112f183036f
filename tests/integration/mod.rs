//! Integration tests against mocked exchanges and real SQLite files

mod pipeline;
mod remote_client;
