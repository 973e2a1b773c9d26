//! The perturber contract: an opaque, potentially slow, stateful routine
//! that turns a clean batch into an adversarial one given the worker's
//! current model + model-state + attack. Treated as a black box. Only
//! the surface the worker drives is modeled here.

/// Hot-swappable, stateful perturbation routine. `&mut self` because the
/// worker serializes every call behind a single lock (one perturbation
/// at a time per worker) rather than relying on internal synchronization.
pub trait Perturber: Send {
    /// One-shot device advertisement, called once at worker startup.
    fn set_device(&mut self, tag: &str) -> anyhow::Result<()>;

    fn update_model(&mut self, blob: &[u8]) -> anyhow::Result<()>;

    fn update_model_state(&mut self, blob: &[u8]) -> anyhow::Result<()>;

    fn update_attack(&mut self, blob: &[u8]) -> anyhow::Result<()>;

    /// Pure function of (model, model-state, attack, input). May be
    /// slow; the worker does not impose a timeout.
    fn perturb(&mut self, clean: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Reference implementation used by tests and demo runs: returns the
/// clean payload unperturbed. Lets the full pull/push loop be exercised
/// without a numerically-heavy perturbation routine.
#[derive(Debug, Default)]
pub struct NullPerturber {
    pub device: Option<String>,
    pub model_updates: u64,
    pub model_state_updates: u64,
    pub attack_updates: u64,
}

impl Perturber for NullPerturber {
    fn set_device(&mut self, tag: &str) -> anyhow::Result<()> {
        self.device = Some(tag.to_string());
        Ok(())
    }

    fn update_model(&mut self, _blob: &[u8]) -> anyhow::Result<()> {
        self.model_updates += 1;
        Ok(())
    }

    fn update_model_state(&mut self, _blob: &[u8]) -> anyhow::Result<()> {
        self.model_state_updates += 1;
        Ok(())
    }

    fn update_attack(&mut self, _blob: &[u8]) -> anyhow::Result<()> {
        self.attack_updates += 1;
        Ok(())
    }

    fn perturb(&mut self, clean: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(clean.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_perturber_echoes_input_and_counts_updates() {
        let mut perturber = NullPerturber::default();
        perturber.set_device("cpu").unwrap();
        perturber.update_model(b"m").unwrap();
        perturber.update_model_state(b"s").unwrap();
        perturber.update_attack(b"a").unwrap();

        assert_eq!(perturber.device.as_deref(), Some("cpu"));
        assert_eq!(perturber.model_updates, 1);
        assert_eq!(perturber.model_state_updates, 1);
        assert_eq!(perturber.attack_updates, 1);

        let out = perturber.perturb(b"clean-bytes").unwrap();
        assert_eq!(out, b"clean-bytes");
    }
}
