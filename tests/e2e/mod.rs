#![allow(dead_code)]

use std::sync::OnceLock;

use serializer_e2e::SuiteContext;

mod amqp_tests;
mod boundary_tests;
mod http_tests;

pub const FIXED_TIMESTAMP: &str = "Mon Jan 1 00:00:00 2024";

static SUITE: OnceLock<SuiteContext> = OnceLock::new();

/// Suite shared by every case in this binary. Cases serialize on its lock,
/// so tests may run on parallel threads.
pub fn suite() -> &'static SuiteContext {
    SUITE.get_or_init(|| SuiteContext::from_env().expect("suite initialization"))
}
