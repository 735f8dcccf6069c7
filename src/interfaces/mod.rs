//! Input and output formats of the batch CLI.

pub mod csv;
