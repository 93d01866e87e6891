use crate::types::HealthRes;

/// Simple health service shared by every API surface.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    /// Static health check; no instance required.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Clinic notifications are alive".into(),
        }
    }
}
