//! Shared fixtures and helpers for retention BDD scenarios.

use chrono::{DateTime, TimeZone, Utc};
use rstest::fixture;
use snapshooter::test_support::FakeGateway;
use snapshooter::{PassReport, PolicySettings, RunMode};

/// Instant every scenario runs at.
pub fn scenario_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("fixed scenario time should be valid"))
}

#[derive(Clone, Debug)]
pub struct RetentionContext {
    pub gateway: FakeGateway,
    pub settings: PolicySettings,
    pub mode: RunMode,
    pub current_disk: Option<String>,
    pub outcome: Option<Result<PassReport, String>>,
}

impl RetentionContext {
    pub fn current_disk(&self) -> String {
        self.current_disk
            .clone()
            .unwrap_or_else(|| panic!("test setup requires a disk"))
    }

    pub fn report(&self) -> Result<&PassReport, String> {
        match self.outcome.as_ref() {
            Some(Ok(report)) => Ok(report),
            Some(Err(message)) => Err(format!("pass failed: {message}")),
            None => Err(String::from("missing outcome")),
        }
    }
}

#[fixture]
pub fn retention_context() -> RetentionContext {
    let gateway = FakeGateway::default();
    gateway.set_now(scenario_now());
    RetentionContext {
        gateway,
        settings: PolicySettings::default(),
        mode: RunMode::default(),
        current_disk: None,
        outcome: None,
    }
}
