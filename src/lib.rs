//! Library to backup a [PostgreSQL][pg] database running in a container.
//!
//! A run dumps the database with `pg_dump`, uploads the dump to a
//! [Supabase Storage][storage] bucket and prunes old local dumps.
//! The stages are wired together in [`pipeline::run`].
//!
//! [pg]: https://www.postgresql.org/
//! [storage]: https://supabase.com/docs/guides/storage

#![forbid(unsafe_code)]

pub mod backends;
pub mod cli;
pub mod command;
pub mod config;
pub mod pipeline;
pub mod storage;
pub mod util;
