//! WeightedSampler node: for each declared attribute, sample a value from a
//! weighted discrete distribution, deterministic given the record's `id`
//! (spec §4.3 "WeightedSampler node").
//!
//! Grounded in spec §4.3: "Sampling is deterministic given the record's `id`
//! as seed material ... each record has its own RNG stream." Uses the
//! teacher's existing `fastrand` dependency (already reached for by
//! `client::backoff`'s jitter) instead of introducing a new RNG crate.

use std::hash::{Hash, Hasher};

use crate::error::{PipelineError, Result};
use crate::graph::WeightedSamplerNodeConfig;
use crate::state::State;

/// Execute one WeightedSampler node: seed a fresh RNG from the record's
/// `id` field plus the node's own identity (so two sampler nodes in the
/// same graph don't draw correlated sequences), then sample each declared
/// attribute independently, in a stable (sorted) attribute order.
pub fn execute(cfg: &WeightedSamplerNodeConfig, state: &mut State) -> Result<()> {
    let record_id = state
        .get_str("id")
        .ok_or_else(|| PipelineError::RecordFatal {
            node: "weighted_sampler".to_string(),
            message: "record has no 'id' field to seed sampling from".to_string(),
        })?
        .to_string();

    let mut attributes: Vec<&String> = cfg.attributes.keys().collect();
    attributes.sort();

    for attr in attributes {
        let weights = &cfg.attributes[attr];
        let seed = seed_for(&record_id, attr);
        let rng = fastrand::Rng::with_seed(seed);
        let value = sample_weighted(&rng, weights);
        state.set(attr.clone(), value);
    }
    Ok(())
}

fn seed_for(record_id: &str, attribute: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    record_id.hash(&mut hasher);
    attribute.hash(&mut hasher);
    hasher.finish()
}

fn sample_weighted(rng: &fastrand::Rng, weights: &[(serde_json::Value, f64)]) -> serde_json::Value {
    let total: f64 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= 0.0 {
        return weights[0].0.clone();
    }
    let mut target = rng.f64() * total;
    for (value, weight) in weights {
        target -= weight.max(0.0);
        if target <= 0.0 {
            return value.clone();
        }
    }
    weights.last().expect("non-empty, validated at graph construction").0.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn state_with_id(id: &str) -> State {
        let mut state = State::default();
        state.set("id", json!(id));
        state
    }

    #[test]
    fn test_same_id_same_attributes_yields_same_sample() {
        let mut attributes = HashMap::new();
        attributes.insert(
            "difficulty".to_string(),
            vec![(json!("easy"), 1.0), (json!("hard"), 1.0)],
        );
        let cfg = WeightedSamplerNodeConfig { attributes };

        let mut s1 = state_with_id("record-42");
        execute(&cfg, &mut s1).unwrap();
        let mut s2 = state_with_id("record-42");
        execute(&cfg, &mut s2).unwrap();

        assert_eq!(s1.get("difficulty"), s2.get("difficulty"));
    }

    #[test]
    fn test_different_ids_can_diverge() {
        let mut attributes = HashMap::new();
        attributes.insert(
            "coin".to_string(),
            vec![(json!("heads"), 1.0), (json!("tails"), 1.0)],
        );
        let cfg = WeightedSamplerNodeConfig { attributes };

        let results: Vec<_> = (0..20)
            .map(|i| {
                let mut state = state_with_id(&format!("record-{i}"));
                execute(&cfg, &mut state).unwrap();
                state.get("coin").unwrap().clone()
            })
            .collect();
        assert!(results.iter().any(|v| v == &json!("heads")));
        assert!(results.iter().any(|v| v == &json!("tails")));
    }

    #[test]
    fn test_zero_weight_never_sampled() {
        let mut attributes = HashMap::new();
        attributes.insert(
            "pick".to_string(),
            vec![(json!("never"), 0.0), (json!("always"), 1.0)],
        );
        let cfg = WeightedSamplerNodeConfig { attributes };
        for i in 0..20 {
            let mut state = state_with_id(&format!("r{i}"));
            execute(&cfg, &mut state).unwrap();
            assert_eq!(state.get("pick"), Some(&json!("always")));
        }
    }

    #[test]
    fn test_missing_id_is_record_fatal() {
        let cfg = WeightedSamplerNodeConfig {
            attributes: HashMap::from([("x".to_string(), vec![(json!(1), 1.0)])]),
        };
        let mut state = State::default();
        let err = execute(&cfg, &mut state).unwrap_err();
        assert!(matches!(err, PipelineError::RecordFatal { .. }));
    }
}
