//! Prometheus metrics for the proof workflow, served at `/metrics`.
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub proofs_started: IntCounter,
    pub challenges_issued: IntCounter,
    pub challenges_confirmed: IntCounter,
    pub challenges_expired: IntCounter,
    pub anchors_committed: IntCounter,
    pub proofs_revoked: IntCounter,
    /// Failed operations labelled by error code
    pub errors: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let proofs_started = counter("pom_proofs_started_total", "Proof records created")?;
        let challenges_issued = counter("pom_challenges_issued_total", "Challenges issued or reissued")?;
        let challenges_confirmed =
            counter("pom_challenges_confirmed_total", "Challenges confirmed on a profile")?;
        let challenges_expired = counter("pom_challenges_expired_total", "Challenges found past deadline")?;
        let anchors_committed = counter("pom_anchors_committed_total", "Proofs anchored on the ledger")?;
        let proofs_revoked = counter("pom_proofs_revoked_total", "Anchored proofs revoked")?;

        let errors = IntCounterVec::new(
            Opts::new("pom_errors_total", "Failed operations by error code"),
            &["operation", "code"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            proofs_started,
            challenges_issued,
            challenges_confirmed,
            challenges_expired,
            anchors_committed,
            proofs_revoked,
            errors,
        })
    }

    pub fn record_error(&self, operation: &str, code: &str) {
        self.errors.with_label_values(&[operation, code]).inc();
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.proofs_started.inc();
        metrics.record_error("proof.confirm", "challenge_expired");

        let text = metrics.encode().unwrap();
        assert!(text.contains("pom_proofs_started_total 1"));
        assert!(text.contains("code=\"challenge_expired\""));
    }
}
