//! Test suites for the vendor-command service.

pub(crate) mod support;
