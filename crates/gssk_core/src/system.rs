//! Derivative evaluation: the vector field of a flow network.

use crate::model::NetworkModel;
use crate::traits::{DynamicalSystem, Scalar};

/// Borrowing view of a [`NetworkModel`] as a `DynamicalSystem`.
///
/// Every edge contributes `-flow` to its origin and `+flow` to its target,
/// except that sources are never charged and sinks never credited. A
/// self-loop has no counterpart and only drains its node.
/// Evaluation is pure, so it can be called with any number of trial states.
#[derive(Debug, Clone, Copy)]
pub struct FlowSystem<'a> {
    model: &'a NetworkModel,
}

impl<'a> FlowSystem<'a> {
    pub fn new(model: &'a NetworkModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &'a NetworkModel {
        self.model
    }

    /// Instantaneous flow carried by every edge at `state`, in edge order.
    pub fn edge_flows(&self, state: &[f64]) -> Vec<f64> {
        self.model
            .edges()
            .iter()
            .map(|edge| {
                let control = edge.rule.control().map(|index| state[index]);
                edge.rule.flow(state[edge.origin], state[edge.target], control)
            })
            .collect()
    }

    /// Allocating form of [`DynamicalSystem::apply`].
    pub fn derivative(&self, state: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.model.node_count()];
        DynamicalSystem::<f64>::apply(self, 0.0, state, &mut out);
        out
    }
}

impl<T: Scalar> DynamicalSystem<T> for FlowSystem<'_> {
    fn dimension(&self) -> usize {
        self.model.node_count()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        out.fill(T::zero());
        let nodes = self.model.nodes();

        for edge in self.model.edges() {
            let control = edge.rule.control().map(|index| x[index]);
            let flow = edge.rule.flow(x[edge.origin], x[edge.target], control);

            if nodes[edge.origin].kind.is_charged() {
                out[edge.origin] = out[edge.origin] - flow;
            }
            if edge.target != edge.origin && nodes[edge.target].kind.is_credited() {
                out[edge.target] = out[edge.target] + flow;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FlowSystem;
    use crate::document::ModelDocument;
    use crate::model::NetworkModel;
    use crate::traits::DynamicalSystem;

    fn model(json: &str) -> NetworkModel {
        let doc = ModelDocument::from_json(json).expect("test document parses");
        NetworkModel::from_document(&doc).expect("test document validates")
    }

    #[test]
    fn reservoirs_are_neither_charged_nor_credited() {
        let model = model(
            r#"{"nodes": [
                {"id": "src", "type": "source", "value": 10.0},
                {"id": "a", "type": "storage", "value": 4.0},
                {"id": "out", "type": "sink", "value": 0.0}
            ], "edges": [
                {"origin": "src", "target": "a", "rule": "constant", "params": {"k": 2.0}},
                {"origin": "a", "target": "out", "rule": "linear", "params": {"k": 0.5}}
            ], "config": {"t_start": 0, "t_end": 1, "dt": 0.1}}"#,
        );
        let system = FlowSystem::new(&model);
        let deriv = system.derivative(&model.initial_state());
        assert_eq!(deriv, vec![0.0, 0.0, 0.0]);
        assert_eq!(system.edge_flows(&model.initial_state()), vec![2.0, 2.0]);
    }

    #[test]
    fn reservoir_endpoints_can_still_be_targeted() {
        let model = model(
            r#"{"nodes": [
                {"id": "a", "type": "storage", "value": 4.0},
                {"id": "src", "type": "source", "value": 1.0},
                {"id": "out", "type": "sink", "value": 6.0},
                {"id": "held", "type": "constant", "value": 3.0}
            ], "edges": [
                {"origin": "a", "target": "src", "rule": "constant", "params": {"k": 1.0}},
                {"origin": "out", "target": "a", "rule": "constant", "params": {"k": 0.5}},
                {"origin": "held", "target": "a", "rule": "constant", "params": {"k": 0.25}},
                {"origin": "a", "target": "held", "rule": "constant", "params": {"k": 0.125}}
            ], "config": {"t_start": 0, "t_end": 1, "dt": 0.1}}"#,
        );
        let deriv = FlowSystem::new(&model).derivative(&model.initial_state());
        assert_eq!(deriv, vec![-1.0 + 0.5 + 0.25 - 0.125, 1.0, -0.5, 0.0]);
    }

    #[test]
    fn parallel_edges_add_and_control_may_differ_from_target() {
        let model = model(
            r#"{"nodes": [
                {"id": "retail", "type": "storage", "value": 5.0},
                {"id": "cons", "type": "storage", "value": 2.0},
                {"id": "demand", "type": "constant", "value": 3.0}
            ], "edges": [
                {"origin": "retail", "target": "cons", "rule": "interaction",
                 "params": {"k": 0.1, "control_node": "demand"}},
                {"origin": "retail", "target": "cons", "rule": "interaction",
                 "params": {"k": 0.1, "control_node": "cons"}}
            ], "config": {"t_start": 0, "t_end": 1, "dt": 0.1}}"#,
        );
        let deriv = FlowSystem::new(&model).derivative(&model.initial_state());
        let expected = 0.1 * 5.0 * 3.0 + 0.1 * 5.0 * 2.0;
        assert!((deriv[0] + expected).abs() < 1e-12);
        assert!((deriv[1] - expected).abs() < 1e-12);
        assert_eq!(deriv[2], 0.0);
    }

    #[test]
    fn self_loop_only_drains() {
        let model = model(
            r#"{"nodes": [{"id": "a", "type": "storage", "value": 10.0}],
                "edges": [{"origin": "a", "target": "a", "rule": "linear", "params": {"k": 0.1}}],
                "config": {"t_start": 0, "t_end": 1, "dt": 0.1}}"#,
        );
        let deriv = FlowSystem::new(&model).derivative(&[10.0]);
        assert_eq!(deriv, vec![-1.0]);
    }

    #[test]
    fn evaluation_does_not_touch_input_and_is_repeatable() {
        let model = model(
            r#"{"nodes": [
                {"id": "a", "type": "storage", "value": 8.0},
                {"id": "b", "type": "storage", "value": 1.0}
            ], "edges": [
                {"origin": "a", "target": "b", "rule": "linear", "params": {"k": 0.25}}
            ], "config": {"t_start": 0, "t_end": 1, "dt": 0.1}}"#,
        );
        let system = FlowSystem::new(&model);
        let state = [8.0, 1.0];
        let mut first = [0.0; 2];
        let mut second = [7.0; 2];
        DynamicalSystem::<f64>::apply(&system, 0.0, &state, &mut first);
        DynamicalSystem::<f64>::apply(&system, 3.0, &state, &mut second);
        assert_eq!(first, [-2.0, 2.0]);
        assert_eq!(first, second);
        assert_eq!(state, [8.0, 1.0]);
    }
}
