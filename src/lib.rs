//! Mailvault: routes email into personal information vaults.
//!
//! A message is normalized ([`email`]), scored against domain prototypes by
//! embedding similarity ([`classifier`]), and driven through a
//! classify/extract/validate/finalize workflow against a reasoning engine
//! ([`agent`]) that yields a confidence-scored, schema-shaped record
//! ([`vault`]). [`domain_parser`] pulls every schema-tagged record out of a
//! message for a classifier domain. Storage is left to the caller.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod email;
pub mod embedding;
pub mod extract;
pub mod providers;

pub mod agent;
pub mod classifier;
pub mod domain_parser;
pub mod vault;
