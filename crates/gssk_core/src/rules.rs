//! Flow rules: pure functions from endpoint values to an instantaneous flow rate.
//!
//! Rules are resolved once at load time into [`FlowRule`], which carries its
//! validated parameters (and a dense control-node index where needed), so the
//! derivative evaluator never looks anything up by name.

use crate::document::ParamValue;
use crate::error::{EdgeRole, ValidationError};
use crate::traits::{lit, Scalar};
use std::collections::BTreeMap;

/// Control values at or below this are treated as "no capacity" by `limit`.
const LIMIT_CONTROL_EPSILON: f64 = 1e-9;

/// The closed set of rule names understood by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Constant,
    Linear,
    Interaction,
    Limit,
    Threshold,
}

impl RuleKind {
    pub const ALL: [RuleKind; 5] = [
        RuleKind::Constant,
        RuleKind::Linear,
        RuleKind::Interaction,
        RuleKind::Limit,
        RuleKind::Threshold,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuleKind::Constant => "constant",
            RuleKind::Linear => "linear",
            RuleKind::Interaction => "interaction",
            RuleKind::Limit => "limit",
            RuleKind::Threshold => "threshold",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Exact parameter keys an edge using this rule must carry.
    pub fn parameter_keys(self) -> &'static [&'static str] {
        match self {
            RuleKind::Constant | RuleKind::Linear => &["k"],
            RuleKind::Interaction | RuleKind::Limit => &["k", "control_node"],
            RuleKind::Threshold => &["k", "threshold"],
        }
    }
}

/// A rule with its parameters bound. `control` is a node index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowRule {
    /// `k`, regardless of endpoint values.
    Constant { k: f64 },
    /// `k * origin`, zero once the origin is drained.
    Linear { k: f64 },
    /// `k * origin * control`.
    Interaction { k: f64, control: usize },
    /// Saturating transfer `k * origin / (1 + origin / control)`.
    Limit { k: f64, control: usize },
    /// `k` while `origin > threshold`, else zero.
    Threshold { k: f64, threshold: f64 },
}

impl FlowRule {
    /// Validates `params` against `kind` and binds them.
    ///
    /// `resolve` maps a node id to its dense index.
    pub fn from_params(
        edge: &str,
        kind: RuleKind,
        params: &BTreeMap<String, ParamValue>,
        resolve: impl Fn(&str) -> Option<usize>,
    ) -> Result<Self, ValidationError> {
        let keys = kind.parameter_keys();
        if let Some(extra) = params.keys().find(|key| !keys.contains(&key.as_str())) {
            return Err(ValidationError::UnexpectedParameter {
                edge: edge.to_string(),
                rule: kind.name(),
                param: extra.clone(),
            });
        }

        let param = |name: &'static str| {
            params
                .get(name)
                .ok_or_else(|| ValidationError::MissingParameter {
                    edge: edge.to_string(),
                    rule: kind.name(),
                    param: name,
                })
        };
        let number = |name: &'static str| -> Result<f64, ValidationError> {
            match param(name)? {
                ParamValue::Number(value) if value.is_finite() => Ok(*value),
                ParamValue::Number(_) => Err(ValidationError::InvalidParameter {
                    edge: edge.to_string(),
                    param: name.to_string(),
                    reason: "must be finite",
                }),
                ParamValue::Text(_) => Err(ValidationError::InvalidParameter {
                    edge: edge.to_string(),
                    param: name.to_string(),
                    reason: "must be a number",
                }),
            }
        };
        let node = |name: &'static str| -> Result<usize, ValidationError> {
            match param(name)? {
                ParamValue::Text(id) => {
                    resolve(id.as_str()).ok_or_else(|| ValidationError::UnknownNode {
                        edge: edge.to_string(),
                        role: EdgeRole::Control,
                        node: id.clone(),
                    })
                }
                ParamValue::Number(_) => Err(ValidationError::InvalidParameter {
                    edge: edge.to_string(),
                    param: name.to_string(),
                    reason: "must be a node id",
                }),
            }
        };

        let rule = match kind {
            RuleKind::Constant => FlowRule::Constant { k: number("k")? },
            RuleKind::Linear => FlowRule::Linear { k: number("k")? },
            RuleKind::Interaction => FlowRule::Interaction {
                k: number("k")?,
                control: node("control_node")?,
            },
            RuleKind::Limit => FlowRule::Limit {
                k: number("k")?,
                control: node("control_node")?,
            },
            RuleKind::Threshold => FlowRule::Threshold {
                k: number("k")?,
                threshold: number("threshold")?,
            },
        };
        Ok(rule)
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            FlowRule::Constant { .. } => RuleKind::Constant,
            FlowRule::Linear { .. } => RuleKind::Linear,
            FlowRule::Interaction { .. } => RuleKind::Interaction,
            FlowRule::Limit { .. } => RuleKind::Limit,
            FlowRule::Threshold { .. } => RuleKind::Threshold,
        }
    }

    /// The rate coefficient `k` shared by every rule.
    pub fn rate(&self) -> f64 {
        match *self {
            FlowRule::Constant { k }
            | FlowRule::Linear { k }
            | FlowRule::Interaction { k, .. }
            | FlowRule::Limit { k, .. }
            | FlowRule::Threshold { k, .. } => k,
        }
    }

    /// Same rule with `k` replaced.
    pub fn with_rate(self, rate: f64) -> Self {
        match self {
            FlowRule::Constant { .. } => FlowRule::Constant { k: rate },
            FlowRule::Linear { .. } => FlowRule::Linear { k: rate },
            FlowRule::Interaction { control, .. } => FlowRule::Interaction { k: rate, control },
            FlowRule::Limit { control, .. } => FlowRule::Limit { k: rate, control },
            FlowRule::Threshold { threshold, .. } => FlowRule::Threshold { k: rate, threshold },
        }
    }

    /// Index of the node whose value feeds `control`, if the rule has one.
    pub fn control(&self) -> Option<usize> {
        match *self {
            FlowRule::Interaction { control, .. } | FlowRule::Limit { control, .. } => {
                Some(control)
            }
            _ => None,
        }
    }

    /// Instantaneous flow from origin to target.
    ///
    /// `control` must be supplied for rules that have a control node; a
    /// missing control value yields zero flow.
    pub fn flow<T: Scalar>(&self, origin: T, _target: T, control: Option<T>) -> T {
        match *self {
            FlowRule::Constant { k } => lit(k),
            FlowRule::Linear { k } => {
                if origin <= T::zero() {
                    T::zero()
                } else {
                    lit::<T>(k) * origin
                }
            }
            FlowRule::Interaction { k, .. } => match control {
                Some(c) => lit::<T>(k) * origin * c,
                None => T::zero(),
            },
            FlowRule::Limit { k, .. } => match control {
                Some(c) if c > lit(LIMIT_CONTROL_EPSILON) => {
                    lit::<T>(k) * origin / (T::one() + origin / c)
                }
                _ => T::zero(),
            },
            FlowRule::Threshold { k, threshold } => {
                if origin > lit(threshold) {
                    lit(k)
                } else {
                    T::zero()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FlowRule, RuleKind};
    use crate::document::ParamValue;
    use crate::error::{EdgeRole, ValidationError};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn params(entries: &[(&str, ParamValue)]) -> BTreeMap<String, ParamValue> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn resolve(id: &str) -> Option<usize> {
        match id {
            "a" => Some(0),
            "b" => Some(1),
            _ => None,
        }
    }

    #[test]
    fn rule_names_round_trip() {
        for kind in RuleKind::ALL {
            assert_eq!(RuleKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(RuleKind::from_name("quadratic"), None);
    }

    #[test]
    fn binds_interaction_control_node() {
        let rule = FlowRule::from_params(
            "e1",
            RuleKind::Interaction,
            &params(&[
                ("k", ParamValue::Number(0.01)),
                ("control_node", ParamValue::Text("b".into())),
            ]),
            resolve,
        )
        .expect("valid interaction");
        assert_eq!(rule, FlowRule::Interaction { k: 0.01, control: 1 });
        assert_eq!(rule.control(), Some(1));
    }

    #[test]
    fn rejects_missing_and_extra_parameters() {
        let missing = FlowRule::from_params(
            "e1",
            RuleKind::Threshold,
            &params(&[("k", ParamValue::Number(1.0))]),
            resolve,
        );
        assert_eq!(
            missing,
            Err(ValidationError::MissingParameter {
                edge: "e1".into(),
                rule: "threshold",
                param: "threshold",
            })
        );

        let extra = FlowRule::from_params(
            "e2",
            RuleKind::Linear,
            &params(&[
                ("k", ParamValue::Number(1.0)),
                ("control_node", ParamValue::Text("a".into())),
            ]),
            resolve,
        );
        assert!(matches!(
            extra,
            Err(ValidationError::UnexpectedParameter { ref param, .. }) if param == "control_node"
        ));
    }

    #[test]
    fn rejects_unresolved_control_node() {
        let err = FlowRule::from_params(
            "e1",
            RuleKind::Limit,
            &params(&[
                ("k", ParamValue::Number(1.0)),
                ("control_node", ParamValue::Text("ghost".into())),
            ]),
            resolve,
        )
        .expect_err("control node does not exist");
        assert_eq!(
            err,
            ValidationError::UnknownNode {
                edge: "e1".into(),
                role: EdgeRole::Control,
                node: "ghost".into(),
            }
        );
    }

    #[test]
    fn rejects_wrongly_typed_parameters() {
        let err = FlowRule::from_params(
            "e1",
            RuleKind::Constant,
            &params(&[("k", ParamValue::Text("fast".into()))]),
            resolve,
        )
        .expect_err("k must be numeric");
        assert!(matches!(err, ValidationError::InvalidParameter { .. }));

        let err = FlowRule::from_params(
            "e1",
            RuleKind::Constant,
            &params(&[("k", ParamValue::Number(f64::NAN))]),
            resolve,
        )
        .expect_err("k must be finite");
        assert!(err.to_string().contains("must be finite"));
    }

    #[test]
    fn linear_is_zero_for_drained_origin() {
        let rule = FlowRule::Linear { k: 0.3 };
        assert_eq!(rule.flow(0.0, 5.0, None), 0.0);
        assert_eq!(rule.flow(-4.0, 5.0, None), 0.0);
    }

    #[test]
    fn limit_saturates_and_guards_small_control() {
        let rule = FlowRule::Limit { k: 2.0, control: 0 };
        let flow: f64 = rule.flow(10.0, 0.0, Some(10.0));
        assert!((flow - 10.0).abs() < 1e-12);
        assert_eq!(rule.flow(10.0, 0.0, Some(0.0)), 0.0);
        assert_eq!(rule.flow(10.0, 0.0, Some(1e-12)), 0.0);
    }

    #[test]
    fn threshold_switches_on_origin_level() {
        let rule = FlowRule::Threshold { k: 4.0, threshold: 1.5 };
        assert_eq!(rule.flow(1.5, 0.0, None), 0.0);
        assert_eq!(rule.flow(1.6, 0.0, None), 4.0);
    }

    #[test]
    fn with_rate_keeps_bound_parameters() {
        let rule = FlowRule::Threshold { k: 4.0, threshold: 1.5 }.with_rate(7.0);
        assert_eq!(rule, FlowRule::Threshold { k: 7.0, threshold: 1.5 });
        assert_eq!(rule.rate(), 7.0);
    }

    proptest! {
        #[test]
        fn constant_ignores_endpoints(k in -100.0f64..100.0, o in -1e3f64..1e3, t in -1e3f64..1e3) {
            let rule = FlowRule::Constant { k };
            prop_assert_eq!(rule.flow(o, t, None), rule.flow(0.0, 0.0, None));
        }

        #[test]
        fn linear_scales_with_origin(k in 0.0f64..10.0, x in 0.0f64..1e3, t in -1e3f64..1e3) {
            let rule = FlowRule::Linear { k };
            let single = rule.flow(x, t, None);
            let double = rule.flow(2.0 * x, t, None);
            prop_assert!((double - 2.0 * single).abs() <= 1e-9 * (1.0 + single.abs()));
        }

        #[test]
        fn interaction_is_bilinear(k in 0.0f64..1.0, o in 0.0f64..1e3, c in 0.0f64..1e3) {
            let rule = FlowRule::Interaction { k, control: 0 };
            let base = rule.flow(o, 0.0, Some(c));
            let origin_doubled = rule.flow(2.0 * o, 0.0, Some(c));
            let control_doubled = rule.flow(o, 0.0, Some(2.0 * c));
            let tol = 1e-9 * (1.0 + base.abs());
            prop_assert!((origin_doubled - 2.0 * base).abs() <= tol);
            prop_assert!((control_doubled - 2.0 * base).abs() <= tol);
        }
    }
}
