//! `im-cli`: the `imsim` command-line front end.

pub mod cli;
