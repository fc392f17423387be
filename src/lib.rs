//! pupdeploy - deploy Puppet environments from a Puppetfile.
//!
//! Given a Puppetfile naming third-party modules, pupdeploy resolves each
//! declaration, fetches the content, unpacks it into the environment, and
//! walks the transitive dependencies declared in each installed module's
//! `metadata.json`. Modules come from three kinds of sources:
//!
//! - the **Puppet Forge** (release archives via the v3 API),
//! - **git repositories** (cloned at a declared ref),
//! - **GitHub release tarballs** (via the tags API).
//!
//! # Architecture
//!
//! The work happens in a concurrent fetch pipeline (see [`pipeline`]):
//! a parser drains a queue of module files and emits declarations, a
//! deduplicator drops repeated installation targets, a pool of download
//! workers materializes content through a content-addressed archive cache,
//! and a result aggregator logs outcomes and feeds freshly discovered
//! `metadata.json` files back into the queue. A pending-work barrier spans
//! the stages; the pipeline stops when it reaches zero.
//!
//! Fetched archives land in a cache keyed by a fingerprint of the module
//! name, with one version-tagged blob per release, so re-deploying a pinned
//! environment never touches the network.
//!
//! # Modules
//!
//! - [`cli`] - clap-based command surface (`install`, `deploy`)
//! - [`config`] - `deploy.toml` parsing for the `deploy` subcommand
//! - [`pipeline`] - the five-stage fetch pipeline and its work barrier
//! - [`module`] - the three module variants and their download logic
//! - [`puppetfile`] - the Puppetfile statement parser
//! - [`metadata`] - transitive dependency discovery from `metadata.json`
//! - [`cache`] - the on-disk archive cache
//! - [`archive`] - tar.gz extraction
//! - [`git`] - thin wrapper around the system git binary
//! - [`core`] - shared error types

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod git;
pub mod metadata;
pub mod module;
pub mod pipeline;
pub mod puppetfile;
