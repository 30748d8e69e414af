//! End-to-end tests that run `mk` against fixture build files.

#![cfg(unix)]

mod build_tests;
mod common;
mod vars_tests;
