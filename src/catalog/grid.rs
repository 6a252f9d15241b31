//! Hyperparameter grid expansion

use crate::params::{ParamMap, ParamValue};

/// Full Cartesian product of the given value sets. Names keep their input
/// order and the last name varies fastest.
pub(crate) fn cartesian_product(space: &[(String, Vec<ParamValue>)]) -> Vec<ParamMap> {
    let mut combos = vec![ParamMap::new()];

    for (name, values) in space {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }

    combos
}

/// A combination matches a rule when it agrees with every pair of the rule.
/// Empty rules match nothing.
pub(crate) fn matches_rule(combo: &ParamMap, rule: &ParamMap) -> bool {
    !rule.is_empty() && rule.iter().all(|(k, v)| combo.get(k) == Some(v))
}

pub(crate) fn is_valid(combo: &ParamMap, rules: &[ParamMap]) -> bool {
    !rules.iter().any(|rule| matches_rule(combo, rule))
}
